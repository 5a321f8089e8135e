//! CSS value helpers.

/// Resolve a CSS color value to RGBA components.
///
/// Handles the full CSS color syntax, including named colors, by deferring to
/// `csscolorparser`. Returns `None` for values that are not colors.
pub fn parse_color(value: &str) -> Option<(u8, u8, u8, u8)> {
    let color = csscolorparser::parse(value.trim()).ok()?;
    let [r, g, b, a] = color.to_rgba8();
    Some((r, g, b, a))
}
