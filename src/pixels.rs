use std::num::NonZeroU32;

use image::RgbaImage;
use palette::Srgb;

use crate::color::Color;
use crate::error::{PixelateError, Result};

// ------------------------------------------------------------
// Raw pixel access
// ------------------------------------------------------------

/// Read-only view over a row-major RGBA8 buffer (`width * height * 4` bytes).
///
/// Alpha is carried in the buffer but ignored by every reader: the
/// pixelation works on RGB only.
#[derive(Clone, Copy, Debug)]
pub struct PixelBuffer<'a> {
    raw: &'a [u8],
    width: u32,
    height: u32,
}

impl<'a> PixelBuffer<'a> {
    pub fn new(raw: &'a [u8], width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if raw.len() != expected {
            return Err(PixelateError::BufferSize { expected, actual: raw.len() });
        }
        Ok(Self { raw, width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGB at `(x, y)`. Panics if the coordinate lies outside the image.
    #[inline(always)]
    pub fn rgb(&self, x: u32, y: u32) -> Color {
        assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
        let idx = ((y as usize * self.width as usize) + x as usize) * 4;
        Srgb::new(self.raw[idx], self.raw[idx + 1], self.raw[idx + 2])
    }

    /// Mean of each channel over `block`, rounded to nearest with ties going
    /// up (the behavior of `Math.round` on non-negative values). Integer
    /// arithmetic only, so the result is exact for any block size.
    pub fn average(&self, block: Block) -> Color {
        let mut sums = [0u64; 3];
        for y in block.y..block.y + block.height {
            for x in block.x..block.x + block.width {
                let c = self.rgb(x, y);
                sums[0] += c.red as u64;
                sums[1] += c.green as u64;
                sums[2] += c.blue as u64;
            }
        }
        let count = block.area();
        debug_assert!(count > 0, "average of an empty block");
        let round = |sum: u64| ((2 * sum + count) / (2 * count)) as u8;
        Srgb::new(round(sums[0]), round(sums[1]), round(sums[2]))
    }
}

impl<'a> From<&'a RgbaImage> for PixelBuffer<'a> {
    fn from(img: &'a RgbaImage) -> Self {
        Self { raw: img.as_raw(), width: img.width(), height: img.height() }
    }
}

/// Take a host-decoded RGBA8 buffer as an image. The length must be exactly
/// `width * height * 4`.
pub fn image_from_raw(raw: Vec<u8>, width: u32, height: u32) -> Result<RgbaImage> {
    let expected = PixelBuffer::new(&raw, width, height)?.raw.len();
    RgbaImage::from_raw(width, height, raw).ok_or(PixelateError::BufferSize { expected, actual: expected })
}

// ------------------------------------------------------------
// Block grid
// ------------------------------------------------------------

/// One pixelation cell. Edge cells are clamped to the image, never padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Block {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Walk the block grid row by row, left to right.
pub fn blocks(width: u32, height: u32, block_size: NonZeroU32) -> impl Iterator<Item = Block> {
    let size = block_size.get();
    (0..height).step_by(size as usize).flat_map(move |y| {
        (0..width).step_by(size as usize).map(move |x| Block {
            x,
            y,
            width: size.min(width - x),
            height: size.min(height - y),
        })
    })
}

/// `(ceil(width / size), ceil(height / size))`.
pub fn grid_dimensions(width: u32, height: u32, block_size: NonZeroU32) -> (u32, u32) {
    (width.div_ceil(block_size.get()), height.div_ceil(block_size.get()))
}

/// Total number of blocks the grid walk yields.
pub fn block_count(width: u32, height: u32, block_size: NonZeroU32) -> u64 {
    let (columns, rows) = grid_dimensions(width, height, block_size);
    columns as u64 * rows as u64
}

/// Average color of every block, in grid walk order.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockGrid {
    block_size: NonZeroU32,
    width: u32,
    height: u32,
    colors: Vec<Color>,
}

impl BlockGrid {
    pub fn compute(pixels: &PixelBuffer<'_>, block_size: NonZeroU32) -> Self {
        let colors = blocks(pixels.width(), pixels.height(), block_size)
            .map(|block| pixels.average(block))
            .collect();
        Self { block_size, width: pixels.width(), height: pixels.height(), colors }
    }

    pub fn block_size(&self) -> NonZeroU32 {
        self.block_size
    }

    /// Pixel dimensions of the image the grid was computed from.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Each block paired with its average color.
    pub fn iter(&self) -> impl Iterator<Item = (Block, Color)> + '_ {
        blocks(self.width, self.height, self.block_size).zip(self.colors.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
