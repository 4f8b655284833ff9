//! Session state and the load / rebuild state machine.
//!
//! An [`Orchestrator`] owns at most one [`ImageSession`]. Decoding is the only
//! step that may happen out of band: a host calls [`Orchestrator::begin_load`],
//! decodes wherever it likes, then hands the result to
//! [`Orchestrator::complete_load`] with the ticket it was given. Completions
//! carrying anything but the most recently issued ticket are dropped, so the
//! last load request always wins.
//!
//! Everything here is single-threaded. Hosts that share an orchestrator
//! between threads must put it behind one `Mutex`.

use std::num::NonZeroU32;
use std::sync::LazyLock;

use image::RgbaImage;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{PixelateError, Result};
use crate::palette::Palette;
use crate::pixels::{BlockGrid, PixelBuffer};
use crate::render::{Assignment, RenderStats, render};

pub const DEFAULT_BLOCK_SIZE: NonZeroU32 = NonZeroU32::new(10).unwrap();

// ------------------------------------------------------------
// Options and textual parameter parsing
// ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelateOptions {
    pub block_size: NonZeroU32,
    /// Reduce to at most this many colors when the full palette is at least
    /// this large. `None` renders with the full palette.
    pub target_color_count: Option<NonZeroU32>,
}

impl Default for PixelateOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, target_color_count: None }
    }
}

/// Signed integers, or unsigned decimals. Anything else is not a number as
/// far as the parameter fields are concerned.
static NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:-?\d+|\d+\.\d+)$").expect("numeric pattern compiles"));

/// Parse a positive count typed by the user.
///
/// Integers and decimals are accepted and coerced by truncating the
/// fraction, then dropping the sign (`"-4"` -> 4, `"7.9"` -> 7). The literal
/// `"0"`, and anything that coerces to zero, is rejected.
pub fn parse_positive(text: &str, what: &str) -> Result<NonZeroU32> {
    let invalid = || PixelateError::InvalidParameter(format!("{what} must be a positive number, got {text:?}"));

    if text == "0" || !NUMERIC.is_match(text) {
        return Err(invalid());
    }
    let integral = text.split('.').next().unwrap_or(text);
    let value: i64 = integral.parse().map_err(|_| invalid())?;
    let value = u32::try_from(value.unsigned_abs()).map_err(|_| invalid())?;
    NonZeroU32::new(value).ok_or_else(invalid)
}

pub fn parse_block_size(text: &str) -> Result<NonZeroU32> {
    parse_positive(text, "block size")
}

/// Like [`parse_block_size`], except that an empty field clears the target.
pub fn parse_target_color_count(text: &str) -> Result<Option<NonZeroU32>> {
    if text.is_empty() {
        return Ok(None);
    }
    parse_positive(text, "number of colors").map(Some)
}

// ------------------------------------------------------------
// Decoding
// ------------------------------------------------------------

/// Turns host-supplied file bytes into pixels.
pub trait Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage>;
}

/// Decodes any format the `image` crate recognizes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCrateDecoder;

impl Decoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage> {
        let img = image::load_from_memory(bytes).map_err(|e| PixelateError::Decode(e.to_string()))?;
        Ok(img.to_rgba8())
    }
}

// ------------------------------------------------------------
// Image session
// ------------------------------------------------------------

/// Everything derived from one decoded image.
#[derive(Clone, Debug)]
pub struct ImageSession {
    pixels: RgbaImage,
    options: PixelateOptions,
    grid: BlockGrid,
    palette: Palette,
    reduced: Option<Palette>,
    surface: RgbaImage,
    canvas_hidden: bool,
}

impl ImageSession {
    /// Pixelate a freshly decoded image and paint its surface.
    pub fn new(pixels: RgbaImage, options: PixelateOptions) -> Result<Self> {
        let grid = BlockGrid::compute(&PixelBuffer::from(&pixels), options.block_size);
        let palette = Palette::aggregate(&grid, &Palette::new());
        let reduced = reduced_for(&palette, options.target_color_count);
        let (surface, _) = paint(pixels.width(), pixels.height(), &grid, &palette, reduced.as_ref())?;
        Ok(Self { pixels, options, grid, palette, reduced, surface, canvas_hidden: false })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The decoded image as loaded, never modified.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn options(&self) -> PixelateOptions {
        self.options
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    /// Every block color with its count.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The reduced palette, when reduction is in effect.
    pub fn reduced_palette(&self) -> Option<&Palette> {
        self.reduced.as_ref()
    }

    /// The palette the surface was painted with.
    pub fn displayed_palette(&self) -> &Palette {
        self.reduced.as_ref().unwrap_or(&self.palette)
    }

    /// The pixelated rendering.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn canvas_hidden(&self) -> bool {
        self.canvas_hidden
    }

    /// Re-average and re-aggregate at a new block size. Hidden flags carry
    /// over for colors that survive.
    pub fn set_block_size(&mut self, block_size: NonZeroU32) -> Result<RenderStats> {
        let grid = BlockGrid::compute(&PixelBuffer::from(&self.pixels), block_size);
        let palette = Palette::aggregate(&grid, &self.palette);
        let options = PixelateOptions { block_size, ..self.options };
        self.rebuild(options, grid, palette)
    }

    /// Block averages and counts do not depend on the target, so only the
    /// reduction and the paint are redone.
    pub fn set_target_color_count(&mut self, target: Option<NonZeroU32>) -> Result<RenderStats> {
        let options = PixelateOptions { target_color_count: target, ..self.options };
        self.rebuild(options, self.grid.clone(), self.palette.clone())
    }

    /// Flip the visibility of one color and repaint. Returns the new
    /// `hidden` value.
    pub fn toggle_visibility(&mut self, name: &str) -> Result<bool> {
        let mut palette = self.palette.clone();
        let hidden = palette
            .toggle_hidden(name)
            .ok_or_else(|| PixelateError::InvalidParameter(format!("no color named {name:?} in the palette")))?;
        let mut reduced = self.reduced.clone();
        if let Some(reduced) = reduced.as_mut() {
            reduced.set_hidden(name, hidden);
        }
        let (surface, _) = paint(self.width(), self.height(), &self.grid, &palette, reduced.as_ref())?;
        self.palette = palette;
        self.reduced = reduced;
        self.surface = surface;
        Ok(hidden)
    }

    /// Reduce and paint into a fresh surface, then swap everything in. On
    /// error the session is left as it was.
    fn rebuild(&mut self, options: PixelateOptions, grid: BlockGrid, palette: Palette) -> Result<RenderStats> {
        let reduced = reduced_for(&palette, options.target_color_count);
        let (surface, stats) = paint(self.width(), self.height(), &grid, &palette, reduced.as_ref())?;
        self.options = options;
        self.grid = grid;
        self.palette = palette;
        self.reduced = reduced;
        self.surface = surface;
        Ok(stats)
    }
}

fn reduced_for(palette: &Palette, target: Option<NonZeroU32>) -> Option<Palette> {
    match target {
        Some(k) if palette.len() >= k.get() as usize => Some(palette.reduce(k.get() as usize)),
        _ => None,
    }
}

fn paint(
    width: u32,
    height: u32,
    grid: &BlockGrid,
    palette: &Palette,
    reduced: Option<&Palette>,
) -> Result<(RgbaImage, RenderStats)> {
    let assignment = match reduced {
        Some(reduced) => Assignment::Nearest(reduced),
        None => Assignment::Full(palette),
    };
    let mut surface = RgbaImage::new(width, height);
    let stats = render(&mut surface, grid, assignment)?;
    Ok((surface, stats))
}

// ------------------------------------------------------------
// Orchestrator
// ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Empty,
    Loading,
    Ready,
}

/// Identifies one load request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl From<u64> for LoadTicket {
    fn from(generation: u64) -> Self {
        Self { generation }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The decoded image replaced the session.
    Applied,
    /// A newer load was requested after this one; the result was dropped.
    Stale,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    options: PixelateOptions,
    session: Option<ImageSession>,
    issued: u64,
    pending: Option<u64>,
}

impl Orchestrator {
    pub fn new(options: PixelateOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn state(&self) -> State {
        match (&self.pending, &self.session) {
            (Some(_), _) => State::Loading,
            (None, Some(_)) => State::Ready,
            (None, None) => State::Empty,
        }
    }

    pub fn options(&self) -> PixelateOptions {
        self.options
    }

    pub fn session(&self) -> Option<&ImageSession> {
        self.session.as_ref()
    }

    /// True until the first image has been pixelated.
    pub fn canvas_hidden(&self) -> bool {
        self.session.as_ref().is_none_or(ImageSession::canvas_hidden)
    }

    /// Start a load. Any earlier ticket still outstanding becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.issued += 1;
        self.pending = Some(self.issued);
        debug!(generation = self.issued, "load requested");
        LoadTicket { generation: self.issued }
    }

    /// Deliver the decode result for `ticket`.
    ///
    /// A failed decode leaves the previous session (if any) in place and is
    /// returned as the error. A stale ticket is ignored whether it carries
    /// pixels or an error.
    pub fn complete_load(&mut self, ticket: LoadTicket, decoded: Result<RgbaImage>) -> Result<LoadOutcome> {
        if self.pending != Some(ticket.generation) {
            warn!(
                generation = ticket.generation,
                latest = self.issued,
                "discarding stale image load"
            );
            return Ok(LoadOutcome::Stale);
        }
        self.pending = None;

        let pixels = decoded.inspect_err(|e| warn!(error = %e, "image decode failed"))?;
        let session = ImageSession::new(pixels, self.options)?;
        info!(
            width = session.width(),
            height = session.height(),
            block_size = self.options.block_size.get(),
            colors = session.palette().len(),
            "image pixelated"
        );
        self.session = Some(session);
        Ok(LoadOutcome::Applied)
    }

    /// Decode and load in one step.
    pub fn load_image(&mut self, bytes: &[u8], decoder: &impl Decoder) -> Result<&ImageSession> {
        let ticket = self.begin_load();
        self.complete_load(ticket, decoder.decode(bytes))?;
        self.session
            .as_ref()
            .ok_or_else(|| PixelateError::Decode("no image loaded".to_string()))
    }

    pub fn set_block_size(&mut self, block_size: NonZeroU32) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            session.set_block_size(block_size)?;
        }
        self.options.block_size = block_size;
        Ok(())
    }

    pub fn set_target_color_count(&mut self, target: Option<NonZeroU32>) -> Result<()> {
        if let Some(session) = self.session.as_mut() {
            session.set_target_color_count(target)?;
        }
        self.options.target_color_count = target;
        Ok(())
    }

    /// Parse then apply a block size typed by the user. Rejected input
    /// changes nothing.
    pub fn set_block_size_text(&mut self, text: &str) -> Result<()> {
        let block_size = parse_block_size(text).inspect_err(|e| warn!(error = %e, "block size rejected"))?;
        self.set_block_size(block_size)
    }

    pub fn set_target_color_count_text(&mut self, text: &str) -> Result<()> {
        let target = parse_target_color_count(text).inspect_err(|e| warn!(error = %e, "color count rejected"))?;
        self.set_target_color_count(target)
    }

    pub fn toggle_visibility(&mut self, name: &str) -> Result<bool> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PixelateError::InvalidParameter("no image loaded".to_string()))?;
        session.toggle_visibility(name)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn parse_accepts_integers_and_decimals() {
        assert_eq!(parse_block_size("12").unwrap(), nz(12));
        assert_eq!(parse_block_size("-4").unwrap(), nz(4));
        assert_eq!(parse_block_size("7.9").unwrap(), nz(7));
        assert_eq!(parse_block_size("007").unwrap(), nz(7));
    }

    #[test]
    fn parse_rejects_zero_and_garbage() {
        for text in ["0", "", "abc", "1e3", "-2.5", " 3", "3 ", "0.5", "-0", "00", "99999999999"] {
            assert!(
                matches!(parse_block_size(text), Err(PixelateError::InvalidParameter(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_color_count_clears_target() {
        assert_eq!(parse_target_color_count("").unwrap(), None);
        assert_eq!(parse_target_color_count("3").unwrap(), Some(nz(3)));
        assert!(parse_target_color_count("0").is_err());
    }

    #[test]
    fn session_starts_visible_and_painted() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let session = ImageSession::new(img, PixelateOptions { block_size: nz(2), target_color_count: None }).unwrap();
        assert!(!session.canvas_hidden());
        assert_eq!(session.palette().get("255_0_0").unwrap().count, 4);
        assert!(session.surface().pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn reduction_only_when_palette_reaches_target() {
        let img = RgbaImage::from_fn(4, 2, |x, _| Rgba([x as u8 * 50, 0, 0, 255]));
        let mut session = ImageSession::new(img, PixelateOptions { block_size: nz(1), target_color_count: None }).unwrap();
        assert_eq!(session.palette().len(), 4);

        session.set_target_color_count(Some(nz(5))).unwrap();
        assert!(session.reduced_palette().is_none());

        session.set_target_color_count(Some(nz(4))).unwrap();
        assert_eq!(session.reduced_palette().map(Palette::len), Some(4));

        session.set_target_color_count(Some(nz(2))).unwrap();
        assert_eq!(session.displayed_palette().len(), 2);
    }

    #[test]
    fn unknown_toggle_is_rejected() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let mut session = ImageSession::new(img, PixelateOptions::default()).unwrap();
        assert!(matches!(session.toggle_visibility("9_9_9"), Err(PixelateError::InvalidParameter(_))));
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut orch = Orchestrator::default();
        let first = orch.begin_load();
        let second = orch.begin_load();

        let late = orch.complete_load(first, Ok(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])))).unwrap();
        assert_eq!(late, LoadOutcome::Stale);
        assert_eq!(orch.state(), State::Loading);

        let applied = orch.complete_load(second, Ok(RgbaImage::from_pixel(3, 3, Rgba([1, 1, 1, 255])))).unwrap();
        assert_eq!(applied, LoadOutcome::Applied);
        assert_eq!(orch.state(), State::Ready);
        assert_eq!(orch.session().unwrap().width(), 3);
    }

    #[test]
    fn stale_failure_is_dropped_too() {
        let mut orch = Orchestrator::default();
        let first = orch.begin_load();
        let ticket = orch.begin_load();
        orch.complete_load(ticket, Ok(RgbaImage::from_pixel(2, 2, Rgba([4, 4, 4, 255])))).unwrap();

        let late = orch.complete_load(first, Err(PixelateError::Decode("late".into()))).unwrap();
        assert_eq!(late, LoadOutcome::Stale);
        assert_eq!(orch.state(), State::Ready);
        assert!(orch.session().unwrap().palette().contains("4_4_4"));
    }

    #[test]
    fn options_follow_the_rebuilt_grid() {
        let mut orch = Orchestrator::new(PixelateOptions { block_size: nz(2), target_color_count: None });
        let ticket = orch.begin_load();
        orch.complete_load(ticket, Ok(RgbaImage::from_fn(6, 3, |x, _| Rgba([x as u8 * 40, 0, 0, 255])))).unwrap();

        orch.set_block_size(nz(3)).unwrap();
        orch.set_target_color_count(Some(nz(1))).unwrap();
        let session = orch.session().unwrap();
        assert_eq!(orch.options(), session.options());
        assert_eq!(session.options().block_size, session.grid().block_size());
        assert_eq!(session.grid().len(), 2);
        assert_eq!(session.reduced_palette().map(Palette::len), Some(1));
    }

    #[test]
    fn first_failed_decode_returns_to_empty() {
        let mut orch = Orchestrator::default();
        assert!(orch.canvas_hidden());
        let ticket = orch.begin_load();
        let res = orch.complete_load(ticket, Err(PixelateError::Decode("bad".into())));
        assert!(matches!(res, Err(PixelateError::Decode(_))));
        assert_eq!(orch.state(), State::Empty);
        assert!(orch.canvas_hidden());
    }

    #[test]
    fn options_set_before_load_apply_to_it() {
        let mut orch = Orchestrator::default();
        orch.set_block_size_text("2").unwrap();
        let ticket = orch.begin_load();
        orch.complete_load(ticket, Ok(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])))).unwrap();
        assert_eq!(orch.session().unwrap().palette().total_count(), 4);
    }

    #[test]
    fn toggle_without_image_is_rejected() {
        let mut orch = Orchestrator::default();
        assert!(orch.toggle_visibility("0_0_0").is_err());
    }
}
