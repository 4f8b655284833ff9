use palette::Srgb;

/// An 8-bit sRGB triple. Block averages and palette entries are all stored
/// in this form; no color-space conversion happens anywhere in the crate.
pub type Color = Srgb<u8>;

/// Canonical palette key for a color: `"R_G_B"` in decimal.
///
/// The mapping is a bijection with [`parse_name`], so a palette keyed by
/// these names can never hold two entries for the same triple.
pub fn canonical_name(color: Color) -> String {
    format!("{}_{}_{}", color.red, color.green, color.blue)
}

/// Inverse of [`canonical_name`]. Returns `None` for anything that is not
/// exactly three decimal channels in `0..=255` separated by `_`.
pub fn parse_name(name: &str) -> Option<Color> {
    let mut parts = name.split('_');
    let red = parse_channel(parts.next()?)?;
    let green = parse_channel(parts.next()?)?;
    let blue = parse_channel(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(Srgb::new(red, green, blue))
}

fn parse_channel(s: &str) -> Option<u8> {
    // Reject "+1", "01" and friends so the name stays canonical.
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    s.parse().ok()
}

/// CSS functional notation, used for legend swatches: `rgb(R, G, B)`.
pub fn css(color: Color) -> String {
    format!("rgb({}, {}, {})", color.red, color.green, color.blue)
}

/// `|Δred| + |Δgreen| + |Δblue|`.
#[inline]
pub fn manhattan_distance(a: Color, b: Color) -> u32 {
    (a.red.abs_diff(b.red) as u32) + (a.green.abs_diff(b.green) as u32) + (a.blue.abs_diff(b.blue) as u32)
}

/// Manhattan distance from black, the sort key used by palette reduction.
#[inline]
pub fn distance_from_black(color: Color) -> u32 {
    color.red as u32 + color.green as u32 + color.blue as u32
}
