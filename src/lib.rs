//! Block pixelation with an editable, countable palette.
//!
//! An image is cut into square blocks, each block is replaced by its average
//! color, and the distinct averages are gathered into a [`Palette`] with
//! per-color block counts. The palette can be reduced to a target number of
//! colors, and any color can be hidden, which clears its blocks from the
//! rendering instead of painting them.
//!
//! ```
//! use image::{Rgba, RgbaImage};
//! use pixel_palette::{ImageSession, PixelateOptions};
//! use std::num::NonZeroU32;
//!
//! let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
//! let options = PixelateOptions { block_size: NonZeroU32::new(2).unwrap(), target_color_count: None };
//! let session = ImageSession::new(img, options).unwrap();
//!
//! let red = session.palette().get("255_0_0").unwrap();
//! assert_eq!(red.count, 4);
//! ```

pub mod color;
pub mod error;
pub mod palette;
pub mod pixels;
pub mod render;
pub mod session;
pub mod wasm;

pub use crate::color::{Color, canonical_name, css, parse_name};
pub use crate::error::{PixelateError, Result};
pub use crate::palette::{COLORS_PER_PAGE, Palette, PaletteEntry};
pub use crate::pixels::{Block, BlockGrid, PixelBuffer, image_from_raw};
pub use crate::render::{Assignment, RenderStats, Surface, render};
pub use crate::session::{
    DEFAULT_BLOCK_SIZE, Decoder, ImageCrateDecoder, ImageSession, LoadOutcome, LoadTicket, Orchestrator,
    PixelateOptions, State, parse_block_size, parse_target_color_count,
};
pub use crate::wasm::PixelSession;

/// Decode `input`, pixelate it, hide the colors named in `hidden`, and
/// return the rendering as PNG bytes together with the displayed palette.
///
/// Names that are not canonical color names, or not present in the palette,
/// are skipped with a warning.
#[cfg(not(target_arch = "wasm32"))]
pub fn pixelate_bytes(input: &[u8], options: PixelateOptions, hidden: &[String]) -> Result<(Vec<u8>, Palette)> {
    let mut orchestrator = Orchestrator::new(options);
    orchestrator.load_image(input, &ImageCrateDecoder)?;

    for name in hidden {
        if parse_name(name).is_none() {
            tracing::warn!(name = %name, "not a color name, expected R_G_B");
            continue;
        }
        let shown = orchestrator
            .session()
            .and_then(|s| s.palette().get(name))
            .map(|e| !e.hidden);
        match shown {
            Some(true) => {
                orchestrator.toggle_visibility(name)?;
            }
            Some(false) => {}
            None => tracing::warn!(name = %name, "color to hide is not in the palette"),
        }
    }

    let session = orchestrator
        .session()
        .ok_or_else(|| PixelateError::Decode("no image loaded".to_string()))?;

    let mut buf = Vec::new();
    {
        let mut cursor = std::io::Cursor::new(&mut buf);
        session.surface().write_to(&mut cursor, image::ImageFormat::Png)?;
    }

    Ok((buf, session.displayed_palette().clone()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::num::NonZeroU32;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_of(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn pixelate_bytes_round_trips_png() {
        let img = RgbaImage::from_fn(6, 4, |x, _| if x < 3 { Rgba([0, 128, 0, 255]) } else { Rgba([0, 0, 0, 255]) });
        let options = PixelateOptions { block_size: NonZeroU32::new(3).unwrap(), target_color_count: None };
        let (png, palette) = pixelate_bytes(&png_of(&img), options, &["0_0_0".to_string(), "1_1_1".to_string(), "red".to_string()]).unwrap();

        assert_eq!(palette.len(), 2);
        assert!(palette.get("0_0_0").unwrap().hidden);
        assert!(!palette.get("0_128_0").unwrap().hidden);

        let out = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(out.dimensions(), (6, 4));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 128, 0, 255]));
        assert_eq!(out.get_pixel(5, 3), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn pixelate_bytes_rejects_garbage() {
        let res = pixelate_bytes(b"not an image", PixelateOptions::default(), &[]);
        assert!(matches!(res, Err(PixelateError::Decode(_))));
    }
}
