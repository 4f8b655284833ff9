use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::color::{Color, canonical_name};
use crate::error::{PixelateError, Result};
use crate::palette::Palette;
use crate::pixels::{Block, BlockGrid};

/// A canvas-like drawing target.
pub trait Surface {
    fn dimensions(&self) -> (u32, u32);
    /// Paint every pixel of `block` opaque `color`.
    fn fill_block(&mut self, block: Block, color: Color);
    /// Make every pixel of `block` fully transparent.
    fn clear_block(&mut self, block: Block);
}

impl Surface for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn fill_block(&mut self, block: Block, color: Color) {
        paint(self, block, Rgba([color.red, color.green, color.blue, 255]));
    }

    fn clear_block(&mut self, block: Block) {
        paint(self, block, Rgba([0, 0, 0, 0]));
    }
}

fn paint(img: &mut RgbaImage, block: Block, px: Rgba<u8>) {
    for y in block.y..block.y + block.height {
        for x in block.x..block.x + block.width {
            img.put_pixel(x, y, px);
        }
    }
}

/// Which palette decides a block's color.
#[derive(Clone, Copy, Debug)]
pub enum Assignment<'a> {
    /// Each block keeps its own average; the full palette supplies `hidden`.
    Full(&'a Palette),
    /// Each block takes the nearest entry of a reduced palette.
    Nearest(&'a Palette),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub painted: usize,
    pub cleared: usize,
}

/// Repaint `surface` block by block from `grid`.
///
/// Every pixel is written by exactly one block: filled with the assigned
/// color, or cleared when that color is hidden.
pub fn render<S: Surface>(surface: &mut S, grid: &BlockGrid, assignment: Assignment<'_>) -> Result<RenderStats> {
    let (w, h) = grid.dimensions();
    let (sw, sh) = surface.dimensions();
    if (sw, sh) != (w, h) {
        return Err(PixelateError::BufferSize {
            expected: w as usize * h as usize * 4,
            actual: sw as usize * sh as usize * 4,
        });
    }

    let mut stats = RenderStats::default();
    for (block, average) in grid.iter() {
        let (color, hidden) = match assignment {
            Assignment::Full(palette) => {
                let hidden = palette.get(&canonical_name(average)).is_some_and(|e| e.hidden);
                (average, hidden)
            }
            Assignment::Nearest(reduced) => {
                let (_, entry) = reduced.nearest(average)?;
                (entry.color, entry.hidden)
            }
        };

        if hidden {
            surface.clear_block(block);
            stats.cleared += 1;
        } else {
            surface.fill_block(block, color);
            stats.painted += 1;
        }
    }

    debug!(painted = stats.painted, cleared = stats.cleared, "rendered surface");
    Ok(stats)
}
