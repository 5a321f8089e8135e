//! Inline style parsing and per-block style propagation.
//!
//! Colors come from `#hex` and `rgb()/rgba()` forms directly; everything
//! else (named colors and the rest of the CSS color syntax) defers to the
//! `css` collaborator. Font sizes are normalized to pixels with the fixed
//! conversion table below and clamped to 32.

use log::debug;

use crate::content::{FONT_SIZE_UNSET, HtmlBlock, HtmlColor, HtmlContent, TagExtra};
use crate::tags::{ComponentKind, FL_CLOSED, TagId};
use crate::util::is_space;

/// Parse one color value. Failure yields an all-zero, invalid color; callers
/// assign the result wholesale, so a bad value resets earlier components.
pub(crate) fn parse_color_value(value: &[u8]) -> HtmlColor {
    let mut cl = HtmlColor::default();

    if value.first() == Some(&b'#') {
        let digits: Vec<u8> = value[1..]
            .iter()
            .copied()
            .take_while(|b| b.is_ascii_hexdigit())
            .take(6)
            .collect();
        let hex = |range: &[u8]| {
            u8::from_str_radix(std::str::from_utf8(range).expect("hex digits"), 16)
                .expect("bounded hex")
        };
        match digits.len() {
            3 => {
                let expand = |d: u8| hex(&[d, d]);
                cl = HtmlColor::rgb(expand(digits[0]), expand(digits[1]), expand(digits[2]));
            }
            6 => {
                cl = HtmlColor::rgb(hex(&digits[0..2]), hex(&digits[2..4]), hex(&digits[4..6]));
            }
            _ => {}
        }
        return cl;
    }

    if value.len() > 4 && value[..3].eq_ignore_ascii_case(b"rgb") {
        parse_rgb_function(&value[3..], &mut cl);
        return cl;
    }

    let text = String::from_utf8_lossy(value);
    if let Some((r, g, b, _)) = css::parse_color(text.trim()) {
        cl = HtmlColor::rgb(r, g, b);
    }
    cl
}

/// `(r, g, b)` or `(r, g, b, a)` after the `rgb`/`rgba` keyword.
fn parse_rgb_function(rest: &[u8], cl: &mut HtmlColor) {
    let mut rest = rest;
    if rest.first().is_some_and(|b| *b == b'a' || *b == b'A') {
        rest = &rest[1..];
    }
    let open = match rest.iter().position(|b| *b == b'(') {
        Some(i) if rest[..i].iter().all(|b| is_space(*b)) => i,
        _ => return,
    };
    let Some(close) = rest.iter().position(|b| *b == b')') else {
        return;
    };
    if close < open {
        return;
    }

    let mut values = [0u32; 4];
    let mut n = 0;
    for part in rest[open + 1..close].split(|b| *b == b',') {
        if n == 4 {
            return;
        }
        let part = trim_bytes(part);
        if part.is_empty() || !part.iter().all(u8::is_ascii_digit) {
            return;
        }
        let Ok(v) = std::str::from_utf8(part).expect("digits").parse::<u32>() else {
            return;
        };
        values[n] = v;
        n += 1;
    }
    if n < 3 {
        return;
    }

    cl.r = values[0] as u8;
    cl.g = values[1] as u8;
    cl.b = values[2] as u8;
    cl.alpha = if n == 4 { values[3].min(255) as u8 } else { 255 };
    cl.valid = true;
}

fn trim_bytes(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !is_space(*b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_space(*b)).map_or(start, |e| e + 1);
    &bytes[start..end]
}

/// Convert a suffixed CSS length to pixels. Prefix-matched, like the values
/// mail clients actually emit.
fn css_size(suffix: &[u8], sz: f64) -> Option<f64> {
    if suffix.len() >= 2 {
        if suffix.starts_with(b"px") {
            return Some(sz.trunc());
        }
        if suffix.starts_with(b"em") {
            return Some((sz * 16.0).trunc());
        }
        if suffix.len() >= 3 && suffix.starts_with(b"rem") {
            return Some((sz * 16.0).trunc());
        }
        if suffix.starts_with(b"ex") {
            // x-height; 1ex = 0.5em in many fonts.
            return Some((sz * 8.0).trunc());
        }
        if suffix.starts_with(b"vw") {
            // 1% of viewport width assumed to be 8px.
            return Some((sz * 8.0).trunc());
        }
        if suffix.starts_with(b"vh") {
            // 1% of viewport height assumed to be 6px.
            return Some((sz * 6.0).trunc());
        }
        if suffix.len() >= 4 && suffix.starts_with(b"vmax") {
            return Some((sz * 8.0).trunc());
        }
        if suffix.len() >= 4 && suffix.starts_with(b"vmin") {
            return Some((sz * 6.0).trunc());
        }
        if suffix.starts_with(b"pt") {
            return Some((sz * 96.0 / 72.0).trunc());
        }
        if suffix.starts_with(b"cm") {
            return Some((sz * 96.0 / 2.54).trunc());
        }
        if suffix.starts_with(b"mm") {
            return Some((sz * 9.6 / 2.54).trunc());
        }
        if suffix.starts_with(b"in") {
            return Some((sz * 96.0).trunc());
        }
        if suffix.starts_with(b"pc") {
            return Some((sz * 96.0 / 6.0).trunc());
        }
    } else if suffix.first() == Some(&b'%') {
        // Percentages of the 16px default.
        return Some((sz / 100.0 * 16.0).trunc());
    }
    None
}

fn scan_number(bytes: &[u8]) -> (Option<f64>, usize) {
    if !bytes.first().is_some_and(u8::is_ascii_digit) {
        return (None, 0);
    }
    let mut end = 0;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac = end + 1;
        while frac < bytes.len() && bytes[frac].is_ascii_digit() {
            frac += 1;
        }
        if frac > end + 1 {
            end = frac;
        }
    }
    let parsed = std::str::from_utf8(&bytes[..end])
        .ok()
        .and_then(|s| s.parse::<f64>().ok());
    (parsed, end)
}

/// Normalize a font size declaration to pixels.
///
/// `is_css` selects the failure mode for unusable values: CSS declarations
/// collapse to 0 (below one) or the 16px default, the legacy `size=`
/// attribute multiplies naked numbers by 16. The result is clamped to 32.
pub(crate) fn process_font_size(value: &[u8], is_css: bool) -> u32 {
    let value = {
        let start = value
            .iter()
            .position(|b| !is_space(*b))
            .unwrap_or(value.len());
        &value[start..]
    };

    let (number, consumed) = scan_number(value);
    let mut failsafe = false;
    let mut sz = match number {
        Some(n) if n >= 0.0 => n,
        Some(_) => 0.0,
        None => {
            failsafe = true;
            if is_css { 16.0 } else { 1.0 }
        }
    };

    if !failsafe {
        let suffix = trim_bytes(&value[consumed..]).to_ascii_lowercase();
        match css_size(&suffix, sz) {
            Some(converted) => sz = converted,
            None => failsafe = true,
        }
    }

    if failsafe {
        if is_css {
            // Sizes are mostly ignored in CSS mode, but tiny ones matter.
            sz = if sz < 1.0 { 0.0 } else { 16.0 };
        } else {
            sz = if sz >= 1.0 { sz * 16.0 } else { 16.0 };
        }
    }

    sz.min(32.0) as u32
}

fn contains_caseless(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

fn scan_opacity(value: &[u8]) -> f64 {
    let value = trim_bytes(value);
    let end = value
        .iter()
        .position(|b| !b.is_ascii_digit() && *b != b'.')
        .unwrap_or(value.len());
    std::str::from_utf8(&value[..end])
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Scan an inline `style` attribute's declaration list into the block.
///
/// Declarations apply in source order; in particular `opacity` overwrites
/// the alpha of whatever font color is current when it is scanned.
pub(crate) fn process_style(style: &[u8], bl: &mut HtmlBlock) {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        ReadKey,
        ReadColon,
        ReadValue,
        SkipSpaces,
    }

    let len = style.len();
    let mut state = State::SkipSpaces;
    let mut next_state = State::ReadKey;
    let mut c = 0usize;
    let mut key: Option<(usize, usize)> = None;
    let mut p = 0usize;

    while p <= len {
        let at_end = p == len;
        let b = if at_end { 0 } else { style[p] };
        match state {
            State::ReadKey => {
                if at_end || b == b':' {
                    key = Some((c, p));
                    state = State::SkipSpaces;
                    next_state = State::ReadValue;
                } else if is_space(b) {
                    key = Some((c, p));
                    state = State::SkipSpaces;
                    next_state = State::ReadColon;
                }
                p += 1;
            }
            State::ReadColon => {
                if at_end || b == b':' {
                    state = State::SkipSpaces;
                    next_state = State::ReadValue;
                }
                p += 1;
            }
            State::ReadValue => {
                if at_end || b == b';' {
                    if let Some((ks, ke)) = key
                        && ke > ks
                        && p > c
                    {
                        apply_declaration(&style[ks..ke], &style[c..p], bl);
                    }
                    key = None;
                    state = State::SkipSpaces;
                    next_state = State::ReadKey;
                }
                p += 1;
            }
            State::SkipSpaces => {
                if !at_end && !is_space(b) {
                    c = p;
                    state = next_state;
                } else {
                    p += 1;
                }
            }
        }
    }
}

fn apply_declaration(key: &[u8], value: &[u8], bl: &mut HtmlBlock) {
    if key.eq_ignore_ascii_case(b"color") || key.eq_ignore_ascii_case(b"font-color") {
        bl.font_color = parse_color_value(value);
        debug!("got color: {:x}", bl.font_color.to_rgba_u32());
    } else if key.eq_ignore_ascii_case(b"background-color")
        || key.eq_ignore_ascii_case(b"background")
    {
        bl.background_color = parse_color_value(value);
        debug!("got bgcolor: {:x}", bl.background_color.to_rgba_u32());
    } else if key.eq_ignore_ascii_case(b"display") {
        if contains_caseless(value, b"none") {
            bl.visible = false;
            debug!("tag is not visible");
        }
    } else if key.eq_ignore_ascii_case(b"font-size") {
        bl.font_size = process_font_size(value, true);
        debug!("got font size: {}", bl.font_size);
    } else if key.eq_ignore_ascii_case(b"opacity") {
        let opacity = scan_opacity(value).clamp(0.0, 1.0);
        bl.font_color.alpha = (opacity * 255.0) as u8;
    } else if key.eq_ignore_ascii_case(b"visibility") && contains_caseless(value, b"hidden") {
        bl.visible = false;
        debug!("tag is not visible");
    }
}

/// Build the style block for a block-level tag from its attributes and
/// register it on the content. Returns the block index.
pub(crate) fn process_block_tag(hc: &mut HtmlContent, tag_idx: u32) -> u32 {
    let params = hc.tags[tag_idx as usize].parameters.clone();
    let tag_id = hc.tags[tag_idx as usize].id;
    let mut bl = HtmlBlock::new(tag_idx);

    for (kind, value) in &params {
        if value.is_empty() {
            continue;
        }
        match kind {
            ComponentKind::Color => {
                bl.font_color = parse_color_value(value);
            }
            ComponentKind::BgColor => {
                bl.background_color = parse_color_value(value);
                if tag_id == Some(TagId::Body) {
                    hc.bgcolor = bl.background_color;
                }
            }
            ComponentKind::Style => {
                bl.style = value.clone();
                process_style(value, &mut bl);
            }
            ComponentKind::Class => {
                bl.class = Some(value.clone());
            }
            ComponentKind::Size => {
                bl.font_size = process_font_size(value, false);
            }
            _ => {}
        }
    }

    let idx = hc.blocks.len() as u32;
    hc.blocks.push(bl);
    hc.tags[tag_idx as usize].extra = TagExtra::Block(idx);
    idx
}

/// Inherit unset style fields from the innermost styled ancestor and fall
/// back to document defaults. A block whose fields resolved before the
/// defaults (own or inherited) is pushed for its descendants, unless the
/// tag was self-closed.
pub(crate) fn propagate_style(hc: &mut HtmlContent, block_idx: u32, stack: &mut Vec<u32>) {
    let parent = stack.last().map(|i| {
        let p = &hc.blocks[*i as usize];
        (p.background_color, p.font_color, p.font_size)
    });
    let tag_idx = hc.blocks[block_idx as usize].tag;
    let tag_flags = hc.tags[tag_idx as usize].flags;
    let page_bg = hc.bgcolor;

    let bl = &mut hc.blocks[block_idx as usize];
    let mut push_block = false;

    if let Some((parent_bg, parent_fc, parent_fs)) = parent {
        if !bl.background_color.valid {
            if parent_bg.valid {
                bl.background_color = parent_bg;
            }
        } else {
            push_block = true;
        }
        if !bl.font_color.valid {
            if parent_fc.valid {
                bl.font_color = parent_fc;
            }
        } else {
            push_block = true;
        }
        if bl.font_size == FONT_SIZE_UNSET {
            if parent_fs != FONT_SIZE_UNSET {
                bl.font_size = parent_fs;
            }
        } else {
            push_block = true;
        }
    }

    // Last resort: black text on the page background at the default size.
    if !bl.font_color.valid {
        // Alpha is left alone; opacity may have set it separately.
        bl.font_color.r = 0;
        bl.font_color.g = 0;
        bl.font_color.b = 0;
        bl.font_color.valid = true;
    } else {
        push_block = true;
    }
    if !bl.background_color.valid {
        bl.background_color = page_bg;
    } else {
        push_block = true;
    }
    if bl.font_size == FONT_SIZE_UNSET {
        bl.font_size = 16;
    } else {
        push_block = true;
    }

    if push_block && tag_flags & FL_CLOSED == 0 {
        stack.push(block_idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_long_and_short_forms() {
        let c = parse_color_value(b"#112233");
        assert!(c.valid);
        assert_eq!(c.to_rgba_u32(), 0x112233FF);

        let c = parse_color_value(b"#f0a");
        assert!(c.valid);
        assert_eq!((c.r, c.g, c.b), (0xFF, 0x00, 0xAA));
    }

    #[test]
    fn malformed_hex_is_invalid() {
        assert!(!parse_color_value(b"#12").valid);
        assert!(!parse_color_value(b"#12345").valid);
        assert!(!parse_color_value(b"#zzz").valid);
    }

    #[test]
    fn rgb_functions_parse_with_whitespace() {
        let c = parse_color_value(b"rgb(1, 2, 3)");
        assert!(c.valid);
        assert_eq!((c.r, c.g, c.b, c.alpha), (1, 2, 3, 255));

        let c = parse_color_value(b"rgba( 10 , 20 , 30 , 40 )");
        assert!(c.valid);
        assert_eq!((c.r, c.g, c.b, c.alpha), (10, 20, 30, 40));
    }

    #[test]
    fn rgb_functions_reject_garbage() {
        assert!(!parse_color_value(b"rgb(1, 2)").valid);
        assert!(!parse_color_value(b"rgb(1, x, 3)").valid);
        assert!(!parse_color_value(b"rgb(1, 2, 3").valid);
        assert!(!parse_color_value(b"rgb 1, 2, 3)").valid);
    }

    #[test]
    fn named_colors_resolve_via_collaborator() {
        let c = parse_color_value(b"red");
        assert!(c.valid);
        assert_eq!((c.r, c.g, c.b, c.alpha), (255, 0, 0, 255));
        assert!(!parse_color_value(b"not-a-color").valid);
    }

    #[test]
    fn font_size_unit_conversions() {
        assert_eq!(process_font_size(b"2px", true), 2);
        assert_eq!(process_font_size(b"2em", true), 32);
        assert_eq!(process_font_size(b"1rem", true), 16);
        assert_eq!(process_font_size(b"2ex", true), 16);
        assert_eq!(process_font_size(b"1vw", true), 8);
        assert_eq!(process_font_size(b"1vh", true), 6);
        assert_eq!(process_font_size(b"1vmax", true), 8);
        assert_eq!(process_font_size(b"1vmin", true), 6);
        assert_eq!(process_font_size(b"12pt", true), 16);
        assert_eq!(process_font_size(b"1in", true), 32);
        assert_eq!(process_font_size(b"1pc", true), 16);
        assert_eq!(process_font_size(b"50%", true), 8);
        assert_eq!(process_font_size(b"1cm", true), 32);
        assert_eq!(process_font_size(b"10mm", true), 32);
    }

    #[test]
    fn font_size_clamps_to_32() {
        assert_eq!(process_font_size(b"500px", true), 32);
        assert_eq!(process_font_size(b"100em", true), 32);
    }

    #[test]
    fn font_size_css_failsafe_collapses() {
        assert_eq!(process_font_size(b"small", true), 16);
        assert_eq!(process_font_size(b"0.5", true), 0);
        assert_eq!(process_font_size(b"2", true), 16);
        assert_eq!(process_font_size(b"12qq", true), 16);
    }

    #[test]
    fn font_size_legacy_mode_scales_naked_numbers() {
        assert_eq!(process_font_size(b"2", false), 32);
        assert_eq!(process_font_size(b"1", false), 16);
        assert_eq!(process_font_size(b"0", false), 16);
        assert_eq!(process_font_size(b"junk", false), 16);
    }

    fn block() -> HtmlBlock {
        HtmlBlock::new(0)
    }

    #[test]
    fn style_declarations_apply_in_order() {
        let mut bl = block();
        process_style(b"color:#ff0000;font-size:2px", &mut bl);
        assert_eq!(bl.font_color.to_rgba_u32(), 0xFF0000FF);
        assert_eq!(bl.font_size, 2);
        assert!(bl.visible);
    }

    #[test]
    fn style_tolerates_spaces_and_final_unterminated_pair() {
        let mut bl = block();
        process_style(b"  color : #00ff00 ; font-size : 4px", &mut bl);
        assert_eq!((bl.font_color.r, bl.font_color.g), (0, 0xFF));
        assert_eq!(bl.font_size, 4);
    }

    #[test]
    fn display_none_and_visibility_hidden_hide_the_block() {
        let mut bl = block();
        process_style(b"display: none", &mut bl);
        assert!(!bl.visible);

        let mut bl = block();
        process_style(b"visibility:HIDDEN", &mut bl);
        assert!(!bl.visible);

        let mut bl = block();
        process_style(b"display: block", &mut bl);
        assert!(bl.visible);
    }

    #[test]
    fn opacity_applies_to_current_color_in_declaration_order() {
        let mut bl = block();
        process_style(b"color:#102030;opacity:0.5", &mut bl);
        assert_eq!(bl.font_color.alpha, 127);

        // Opacity first, then a color reset: the color wins.
        let mut bl = block();
        process_style(b"opacity:0.5;color:#102030", &mut bl);
        assert_eq!(bl.font_color.alpha, 255);
    }

    #[test]
    fn opacity_is_clamped() {
        let mut bl = block();
        process_style(b"opacity: 30", &mut bl);
        assert_eq!(bl.font_color.alpha, 255);

        let mut bl = block();
        process_style(b"opacity: .2", &mut bl);
        assert_eq!(bl.font_color.alpha, 51);
    }

    #[test]
    fn propagation_inherits_unset_fields_from_stack_top() {
        let mut hc = HtmlContent::new();
        hc.tags.push(crate::content::HtmlTag::default());
        hc.tags.push(crate::content::HtmlTag::default());
        let mut stack = Vec::new();

        let mut parent = HtmlBlock::new(1);
        parent.font_color = HtmlColor::rgb(10, 20, 30);
        parent.font_size = 9;
        hc.blocks.push(parent);
        propagate_style(&mut hc, 0, &mut stack);
        assert_eq!(stack, vec![0]);

        let child = HtmlBlock::new(2);
        hc.blocks.push(child);
        propagate_style(&mut hc, 1, &mut stack);
        let child = &hc.blocks[1];
        assert_eq!((child.font_color.r, child.font_color.g), (10, 20));
        assert_eq!(child.font_size, 9);
        // Inherited fields count as resolved, so the child joins the stack.
        assert_eq!(stack, vec![0, 1]);
    }

    #[test]
    fn propagation_defaults_to_black_on_page_background() {
        let mut hc = HtmlContent::new();
        hc.tags.push(crate::content::HtmlTag::default());
        let mut stack = Vec::new();
        hc.blocks.push(HtmlBlock::new(1));
        propagate_style(&mut hc, 0, &mut stack);
        let bl = &hc.blocks[0];
        assert!(bl.font_color.valid);
        assert_eq!((bl.font_color.r, bl.font_color.g, bl.font_color.b), (0, 0, 0));
        assert_eq!(bl.font_color.alpha, 255);
        assert_eq!(bl.background_color, hc.bgcolor);
        assert_eq!(bl.font_size, 16);
        assert!(stack.is_empty());
    }

    #[test]
    fn self_closed_blocks_are_not_pushed() {
        let mut hc = HtmlContent::new();
        let mut tag = crate::content::HtmlTag::default();
        tag.flags = FL_CLOSED;
        hc.tags.push(tag);
        let mut stack = Vec::new();
        let mut bl = HtmlBlock::new(1);
        bl.font_color = HtmlColor::rgb(1, 1, 1);
        hc.blocks.push(bl);
        propagate_style(&mut hc, 0, &mut stack);
        assert!(stack.is_empty());
    }
}
