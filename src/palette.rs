//! Palette aggregation, reduction and nearest-color matching.
//!
//! A [`Palette`] maps canonical color names (see
//! [`canonical_name`](crate::color::canonical_name)) to a [`PaletteEntry`].
//! Enumeration order is the order in which colors were first seen during the
//! block walk, which makes both reduction and matching deterministic.

use std::collections::HashMap;

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::debug;

use crate::color::{Color, canonical_name, distance_from_black, manhattan_distance};
use crate::error::{PixelateError, Result};
use crate::pixels::BlockGrid;

/// Number of legend rows per page in the host's palette listing.
pub const COLORS_PER_PAGE: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaletteEntry {
    pub color: Color,
    /// Number of blocks whose average maps to this entry.
    pub count: u32,
    /// Display flag owned by the user; survives palette rebuilds by name.
    pub hidden: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Palette {
    entries: Vec<(String, PaletteEntry)>,
    index: HashMap<String, usize>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PaletteEntry> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PaletteEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Sum of all block counts.
    pub fn total_count(&self) -> u64 {
        self.entries.iter().map(|(_, e)| e.count as u64).sum()
    }

    /// Flip the `hidden` flag of `name`, returning the new value, or `None`
    /// if the palette has no such color.
    pub fn toggle_hidden(&mut self, name: &str) -> Option<bool> {
        let &i = self.index.get(name)?;
        let entry = &mut self.entries[i].1;
        entry.hidden = !entry.hidden;
        Some(entry.hidden)
    }

    pub fn set_hidden(&mut self, name: &str, hidden: bool) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                self.entries[i].1.hidden = hidden;
                true
            }
            None => false,
        }
    }

    fn push(&mut self, name: String, entry: PaletteEntry) {
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, entry));
    }

    /// Count one more block of `color`. New colors inherit their `hidden`
    /// flag from `previous`, matched by name.
    fn record(&mut self, color: Color, previous: &Palette) {
        let name = canonical_name(color);
        if let Some(&i) = self.index.get(&name) {
            self.entries[i].1.count += 1;
            return;
        }
        let hidden = previous.get(&name).is_some_and(|e| e.hidden);
        self.push(name, PaletteEntry { color, count: 1, hidden });
    }

    // ------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------

    /// Build the full palette of a block grid, carrying `hidden` flags over
    /// from `previous` for colors that are still present.
    pub fn aggregate(grid: &BlockGrid, previous: &Palette) -> Palette {
        let mut palette = Palette::new();
        for (_, color) in grid.iter() {
            palette.record(color, previous);
        }
        debug!(
            blocks = grid.len(),
            colors = palette.len(),
            block_size = grid.block_size().get(),
            "aggregated palette"
        );
        palette
    }

    // ------------------------------------------------------------
    // Reduction
    // ------------------------------------------------------------

    /// Select at most `target` representative colors.
    ///
    /// Entries are stably sorted by distance from black, cut into `target`
    /// contiguous groups (`[i*len/target, (i+1)*len/target)`, the last group
    /// running to the end), and from each group the entry with the
    /// **smallest** count is kept, first one winning ties.
    ///
    /// A palette with fewer than `target` entries, or a `target` of zero,
    /// is returned unchanged.
    pub fn reduce(&self, target: usize) -> Palette {
        if target == 0 || self.len() < target {
            return self.clone();
        }

        let mut sorted: Vec<&(String, PaletteEntry)> = self.entries.iter().collect();
        sorted.sort_by_key(|(_, e)| distance_from_black(e.color));

        let len = sorted.len();
        let mut reduced = Palette::new();
        for i in 0..target {
            let start = i * len / target;
            let end = if i + 1 == target { len } else { (i + 1) * len / target };
            let group = &sorted[start..end];
            if let Some((name, entry)) = group.iter().copied().min_by_key(|(_, e)| e.count) {
                reduced.push(name.clone(), entry.clone());
            }
        }

        debug!(from = len, to = reduced.len(), k = target, "reduced palette");
        reduced
    }

    // ------------------------------------------------------------
    // Nearest-color matching
    // ------------------------------------------------------------

    /// Entry closest to `probe` by Manhattan distance. Ties keep the entry
    /// enumerated first. Matching against an empty palette is a caller bug
    /// and reported as [`PixelateError::EmptyPalette`].
    pub fn nearest(&self, probe: Color) -> Result<(&str, &PaletteEntry)> {
        let mut best: Option<(&str, &PaletteEntry, u32)> = None;
        for (name, entry) in self.iter() {
            let dist = manhattan_distance(probe, entry.color);
            if best.is_none_or(|(_, _, best_dist)| dist < best_dist) {
                best = Some((name, entry, dist));
                if dist == 0 {
                    break;
                }
            }
        }
        best.map(|(name, entry, _)| (name, entry)).ok_or(PixelateError::EmptyPalette)
    }

    // ------------------------------------------------------------
    // Legend pagination
    // ------------------------------------------------------------

    /// Number of legend pages; an empty palette still has one (empty) page.
    pub fn page_count(&self, per_page: usize) -> usize {
        self.len().div_ceil(per_page.max(1)).max(1)
    }

    /// Entries on 1-based `page`. Pages past the end clamp to the last page,
    /// page 0 to the first.
    pub fn page(&self, page: usize, per_page: usize) -> impl Iterator<Item = (&str, &PaletteEntry)> {
        let per_page = per_page.max(1);
        let page = page.clamp(1, self.page_count(per_page));
        self.iter().skip((page - 1) * per_page).take(per_page)
    }
}

impl Serialize for Palette {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, entry) in self.iter() {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use image::{Rgba, RgbaImage};
    use palette::Srgb;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::pixels::{PixelBuffer, block_count};

    fn nz(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn entry(r: u8, g: u8, b: u8, count: u32) -> (String, PaletteEntry) {
        let color = Srgb::new(r, g, b);
        (canonical_name(color), PaletteEntry { color, count, hidden: false })
    }

    fn palette_of(entries: Vec<(String, PaletteEntry)>) -> Palette {
        let mut p = Palette::new();
        for (name, e) in entries {
            p.push(name, e);
        }
        p
    }

    fn names(p: &Palette) -> Vec<&str> {
        p.iter().map(|(n, _)| n).collect()
    }

    fn aggregate_image(img: &RgbaImage, size: u32, previous: &Palette) -> Palette {
        let grid = BlockGrid::compute(&PixelBuffer::from(img), nz(size));
        Palette::aggregate(&grid, previous)
    }

    #[test]
    fn uniform_image_yields_single_entry() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 255]));
        let p = aggregate_image(&img, 2, &Palette::new());
        assert_eq!(p.len(), 1);
        assert_eq!(
            p.get("255_0_0"),
            Some(&PaletteEntry { color: Srgb::new(255, 0, 0), count: 4, hidden: false })
        );
    }

    #[test]
    fn counts_sum_to_block_count() {
        let img = RgbaImage::from_fn(13, 7, |x, y| Rgba([(x * 19) as u8, (y * 31) as u8, (x ^ y) as u8, 255]));
        for size in [1, 2, 3, 5, 8, 20] {
            let p = aggregate_image(&img, size, &Palette::new());
            assert_eq!(p.total_count(), block_count(13, 7, nz(size)), "block size {size}");
        }
    }

    #[test]
    fn names_match_colors() {
        let img = RgbaImage::from_fn(9, 9, |x, y| Rgba([(x * 28) as u8, (y * 28) as u8, 3, 255]));
        let p = aggregate_image(&img, 2, &Palette::new());
        for (name, e) in p.iter() {
            assert_eq!(name, canonical_name(e.color));
            assert_eq!(crate::color::parse_name(name), Some(e.color));
        }
    }

    #[test]
    fn empty_image_yields_empty_palette() {
        let img = RgbaImage::new(0, 0);
        let p = aggregate_image(&img, 3, &Palette::new());
        assert!(p.is_empty());
    }

    #[test]
    fn hidden_flags_carry_forward_by_name() {
        let img = RgbaImage::from_fn(4, 2, |x, _| if x < 2 { Rgba([10, 10, 10, 255]) } else { Rgba([90, 0, 0, 255]) });
        let mut previous = aggregate_image(&img, 2, &Palette::new());
        previous.toggle_hidden("90_0_0");
        previous.push("1_2_3".into(), PaletteEntry { color: Srgb::new(1, 2, 3), count: 9, hidden: true });

        let rebuilt = aggregate_image(&img, 1, &previous);
        assert!(rebuilt.get("90_0_0").unwrap().hidden);
        assert!(!rebuilt.get("10_10_10").unwrap().hidden);
        assert!(!rebuilt.contains("1_2_3"));
        assert_eq!(rebuilt.get("90_0_0").unwrap().count, 4);
    }

    #[test]
    fn reduce_keeps_small_palettes() {
        let p = palette_of(vec![entry(1, 1, 1, 3), entry(2, 2, 2, 1)]);
        assert_eq!(p.reduce(3), p);
        assert_eq!(p.reduce(0), p);
    }

    #[test]
    fn reduce_picks_smallest_count_per_group() {
        // Sorted by distance from black: 0_0_0, 10_0_0, 0_20_0, 30_0_0, 0_0_40, 50_0_0
        let p = palette_of(vec![
            entry(50, 0, 0, 1),
            entry(0, 0, 0, 5),
            entry(0, 20, 0, 2),
            entry(10, 0, 0, 7),
            entry(0, 0, 40, 4),
            entry(30, 0, 0, 8),
        ]);
        let r = p.reduce(2);
        // groups: [0_0_0(5), 10_0_0(7), 0_20_0(2)] and [30_0_0(8), 0_0_40(4), 50_0_0(1)]
        assert_eq!(names(&r), vec!["0_20_0", "50_0_0"]);
        assert_eq!(r.get("50_0_0").unwrap().count, 1);
    }

    #[test]
    fn reduce_uneven_groups_cover_everything() {
        // 7 entries into 3 groups: [0,2) [2,4) [4,7)
        let p = palette_of((0..7u8).map(|i| entry(i * 10, 0, 0, 10 - i as u32)).collect());
        let r = p.reduce(3);
        assert_eq!(names(&r), vec!["10_0_0", "30_0_0", "60_0_0"]);
    }

    #[test]
    fn reduce_ties_keep_iteration_order() {
        let p = palette_of(vec![entry(0, 0, 9, 2), entry(9, 0, 0, 2), entry(0, 9, 0, 2), entry(5, 5, 5, 2)]);
        let r = p.reduce(1);
        assert_eq!(names(&r), vec!["0_0_9"]);
    }

    #[test]
    fn reduce_never_exceeds_target_or_invents_colors() {
        let p = palette_of((0..25u8).map(|i| entry(i, i.wrapping_mul(7), 255 - i, (i % 4) as u32 + 1)).collect());
        for k in 1..=25 {
            let r = p.reduce(k);
            assert!(r.len() <= k);
            for (name, e) in r.iter() {
                assert_eq!(p.get(name), Some(e));
            }
        }
    }

    #[test]
    fn reduce_preserves_hidden_flags() {
        let mut p = palette_of(vec![entry(0, 0, 0, 1), entry(200, 0, 0, 3)]);
        p.toggle_hidden("0_0_0");
        let r = p.reduce(2);
        assert!(r.get("0_0_0").unwrap().hidden);
    }

    #[test]
    fn nearest_by_manhattan_distance() {
        let p = palette_of(vec![entry(0, 0, 0, 1), entry(100, 100, 100, 1), entry(255, 0, 0, 1)]);
        let (name, _) = p.nearest(Srgb::new(200, 30, 30)).unwrap();
        assert_eq!(name, "255_0_0");
        let (name, _) = p.nearest(Srgb::new(60, 60, 60)).unwrap();
        assert_eq!(name, "100_100_100");
    }

    #[test]
    fn nearest_ties_keep_first() {
        let p = palette_of(vec![entry(10, 0, 0, 1), entry(0, 10, 0, 1)]);
        let (name, _) = p.nearest(Srgb::new(5, 5, 0)).unwrap();
        assert_eq!(name, "10_0_0");
    }

    #[test]
    fn nearest_on_empty_palette_is_an_error() {
        assert!(matches!(Palette::new().nearest(Srgb::new(0, 0, 0)), Err(PixelateError::EmptyPalette)));
    }

    #[test]
    fn pagination_clamps() {
        let p = palette_of((0..23u8).map(|i| entry(i, 0, 0, 1)).collect());
        assert_eq!(p.page_count(COLORS_PER_PAGE), 3);
        assert_eq!(p.page(1, COLORS_PER_PAGE).count(), 10);
        assert_eq!(p.page(3, COLORS_PER_PAGE).count(), 3);
        let last: Vec<_> = p.page(9, COLORS_PER_PAGE).map(|(n, _)| n.to_string()).collect();
        assert_eq!(last, vec!["20_0_0", "21_0_0", "22_0_0"]);
        assert_eq!(Palette::new().page_count(COLORS_PER_PAGE), 1);
        assert_eq!(Palette::new().page(1, COLORS_PER_PAGE).count(), 0);
    }

    #[test]
    fn toggle_unknown_name() {
        let mut p = palette_of(vec![entry(1, 2, 3, 1)]);
        assert_eq!(p.toggle_hidden("9_9_9"), None);
        assert_eq!(p.toggle_hidden("1_2_3"), Some(true));
        assert_eq!(p.toggle_hidden("1_2_3"), Some(false));
    }
}
