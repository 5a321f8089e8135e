//! Semantic actions for `img`, `link rel=icon` and embedded image payloads.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use log::debug;
use memchr::memchr;
use std::io::Cursor;

use crate::content::{EmbeddedImage, HtmlContent, HtmlImage, HtmlUrl, TagExtra, UrlSet};
use crate::tags::{ComponentKind, FL_IMAGE};
use crate::urls;
use crate::util::is_space;

/// Mail clients wrap and under-pad base64 payloads; decode forgivingly.
const DATA_PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

fn leading_u32(bytes: &[u8]) -> u32 {
    let end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len())
        .min(9);
    std::str::from_utf8(&bytes[..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn find_caseless(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
}

/// Pull a pixel dimension out of a style attribute: the first numeric run
/// after `height`/`width`, allowing `:`, `=` and spaces in between.
fn dimension_from_style(style: &[u8], key: &[u8]) -> Option<u32> {
    let pos = find_caseless(style, key)?;
    let mut p = pos + key.len();
    while p < style.len() {
        let b = style[p];
        if b.is_ascii_digit() {
            return Some(leading_u32(&style[p..]));
        }
        if !is_space(b) && b != b'=' && b != b':' {
            return None;
        }
        p += 1;
    }
    None
}

/// Probe decoded bytes with the image collaborator: format plus dimensions,
/// without a full decode.
fn probe_image(data: &[u8]) -> Option<EmbeddedImage> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;
    let format = reader.format()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(EmbeddedImage {
        width,
        height,
        mime: format.to_mime_type(),
    })
}

/// Decode a `data:image/xxx;base64,yyy` source into an embedded image.
///
/// Only the base64 payload form is parsed; the declared content type is
/// ignored and the real format is sniffed from the decoded bytes. Decode or
/// probe failures drop the embedded image but keep the tag.
fn process_data_image(img: &mut HtmlImage, src: &[u8]) {
    let Some(semi) = memchr(b';', src) else {
        return;
    };
    let rest = &src[semi + 1..];
    if rest.len() <= b"base64,".len() {
        return;
    }
    let Some(payload) = rest.strip_prefix(b"base64,") else {
        return;
    };

    let filtered: Vec<u8> = payload.iter().copied().filter(|b| !is_space(*b)).collect();
    match DATA_PAYLOAD.decode(&filtered) {
        Ok(decoded) => {
            if let Some(info) = probe_image(&decoded) {
                debug!(
                    "detected {} image of size {} x {} in data url",
                    info.mime, info.width, info.height
                );
                img.embedded_image = Some(info);
            }
        }
        Err(err) => {
            debug!("cannot decode data url payload: {err}");
        }
    }
}

/// Process an `img` (or `link rel=icon`) tag: classify the source, resolve
/// external URLs into the set, recover dimensions, and emit `alt` text.
pub(crate) fn process_img_tag(
    hc: &mut HtmlContent,
    tag_idx: u32,
    mut url_set: Option<&mut UrlSet>,
    mut part_urls: Option<&mut Vec<HtmlUrl>>,
    mut dest: Option<&mut Vec<u8>>,
) {
    let params = hc.tags[tag_idx as usize].parameters.clone();
    hc.tags[tag_idx as usize].flags |= FL_IMAGE;

    let mut img = HtmlImage::default();
    let mut seen_width = false;
    let mut seen_height = false;

    for (kind, value) in &params {
        if value.is_empty() {
            continue;
        }
        match kind {
            ComponentKind::Href => {
                img.src = value.clone();
                if value.len() > 4 && value.starts_with(b"cid:") {
                    img.flags |= HtmlImage::EMBEDDED;
                } else if value.len() > 5 && value.starts_with(b"data:") {
                    img.flags |= HtmlImage::EMBEDDED | HtmlImage::DATA;
                    process_data_image(&mut img, value);
                    hc.flags |= HtmlContent::HAS_DATA_URLS;
                } else {
                    img.flags |= HtmlImage::EXTERNAL;
                    if let Some(mut url) = urls::process_url(value) {
                        url.flags |= HtmlUrl::IMAGE;
                        img.url = Some(url.url.clone());
                        if let Some(set) = url_set.as_deref_mut() {
                            if set.add_or_increase(&url)
                                && let Some(part) = part_urls.as_deref_mut()
                            {
                                part.push(url);
                            }
                        } else if let Some(part) = part_urls.as_deref_mut() {
                            part.push(url);
                        }
                    }
                }
            }
            ComponentKind::Height => {
                img.height = leading_u32(value);
                seen_height = true;
            }
            ComponentKind::Width => {
                img.width = leading_u32(value);
                seen_width = true;
            }
            ComponentKind::Style => {
                if !seen_height
                    && let Some(h) = dimension_from_style(value, b"height")
                {
                    img.height = h;
                }
                if !seen_width
                    && let Some(w) = dimension_from_style(value, b"width")
                {
                    img.width = w;
                }
            }
            ComponentKind::Alt => {
                if let Some(d) = dest.as_deref_mut() {
                    if d.last().is_some_and(|b| !is_space(*b)) {
                        d.push(b' ');
                    }
                    d.extend_from_slice(value);
                    if d.last().is_some_and(|b| !is_space(*b)) {
                        d.push(b' ');
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(embedded) = &img.embedded_image {
        if !seen_height {
            img.height = embedded.height;
        }
        if !seen_width {
            img.width = embedded.width;
        }
    }

    let idx = hc.images.len() as u32;
    hc.images.push(img);
    hc.tags[tag_idx as usize].extra = TagExtra::Image(idx);
}

/// `link` carries image semantics only for `rel=icon`.
pub(crate) fn process_link_tag(
    hc: &mut HtmlContent,
    tag_idx: u32,
    url_set: Option<&mut UrlSet>,
    part_urls: Option<&mut Vec<HtmlUrl>>,
) {
    let is_icon = hc.tags[tag_idx as usize]
        .component(ComponentKind::Rel)
        .is_some_and(|rel| rel.eq_ignore_ascii_case(b"icon"));
    if is_icon {
        process_img_tag(hc, tag_idx, url_set, part_urls, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::HtmlTag;
    use base64::engine::general_purpose::STANDARD;

    // Smallest well-formed PNG: 1x1 RGBA.
    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn content_with_tag(params: Vec<(ComponentKind, Vec<u8>)>) -> (HtmlContent, u32) {
        let mut hc = HtmlContent::new();
        let tag = HtmlTag {
            parameters: params,
            ..HtmlTag::default()
        };
        let idx = hc.tags.len() as u32;
        hc.tags.push(tag);
        (hc, idx)
    }

    #[test]
    fn cid_source_is_embedded() {
        let (mut hc, idx) =
            content_with_tag(vec![(ComponentKind::Href, b"cid:part1@msg".to_vec())]);
        process_img_tag(&mut hc, idx, None, None, None);
        let img = &hc.images[0];
        assert_eq!(img.flags, HtmlImage::EMBEDDED);
        assert_eq!(img.src, b"cid:part1@msg");
        assert!(img.url.is_none());
    }

    #[test]
    fn data_source_decodes_and_probes_dimensions() {
        let src = format!("data:image/png;base64,{}", STANDARD.encode(PNG_1X1));
        let (mut hc, idx) = content_with_tag(vec![(ComponentKind::Href, src.into_bytes())]);
        process_img_tag(&mut hc, idx, None, None, None);

        assert!(hc.flags & HtmlContent::HAS_DATA_URLS != 0);
        let img = &hc.images[0];
        assert_eq!(img.flags, HtmlImage::EMBEDDED | HtmlImage::DATA);
        let embedded = img.embedded_image.expect("probed");
        assert_eq!((embedded.width, embedded.height), (1, 1));
        assert_eq!(embedded.mime, "image/png");
        // Dimensions filled from the decoded payload.
        assert_eq!((img.width, img.height), (1, 1));
    }

    #[test]
    fn explicit_dimensions_beat_probed_ones() {
        let src = format!("data:image/png;base64,{}", STANDARD.encode(PNG_1X1));
        let (mut hc, idx) = content_with_tag(vec![
            (ComponentKind::Href, src.into_bytes()),
            (ComponentKind::Width, b"10".to_vec()),
        ]);
        process_img_tag(&mut hc, idx, None, None, None);
        let img = &hc.images[0];
        assert_eq!(img.width, 10);
        assert_eq!(img.height, 1);
    }

    #[test]
    fn truncated_data_payload_keeps_the_tag() {
        let (mut hc, idx) = content_with_tag(vec![(
            ComponentKind::Href,
            b"data:image/png;base64,iVBORw0KGgo=".to_vec(),
        )]);
        process_img_tag(&mut hc, idx, None, None, None);
        let img = &hc.images[0];
        assert_eq!(img.flags, HtmlImage::EMBEDDED | HtmlImage::DATA);
        assert!(img.embedded_image.is_none());
        assert!(hc.flags & HtmlContent::HAS_DATA_URLS != 0);
    }

    #[test]
    fn external_source_resolves_and_registers() {
        let (mut hc, idx) = content_with_tag(vec![(
            ComponentKind::Href,
            b"http://example.com/pix.gif".to_vec(),
        )]);
        let mut set = UrlSet::new();
        let mut part_urls = Vec::new();
        process_img_tag(&mut hc, idx, Some(&mut set), Some(&mut part_urls), None);

        let img = &hc.images[0];
        assert_eq!(img.flags, HtmlImage::EXTERNAL);
        assert_eq!(img.url.as_deref(), Some("http://example.com/pix.gif"));
        let entry = set.get("http://example.com/pix.gif").expect("inserted");
        assert!(entry.flags & HtmlUrl::IMAGE != 0);
        assert_eq!(part_urls.len(), 1);
    }

    #[test]
    fn duplicate_external_source_coalesces() {
        let (mut hc, idx) = content_with_tag(vec![(
            ComponentKind::Href,
            b"http://example.com/pix.gif".to_vec(),
        )]);
        let mut set = UrlSet::new();
        let mut part_urls = Vec::new();
        process_img_tag(
            &mut hc,
            idx,
            Some(&mut set),
            Some(&mut part_urls),
            None,
        );
        let tag = HtmlTag {
            parameters: vec![(ComponentKind::Href, b"http://example.com/pix.gif".to_vec())],
            ..HtmlTag::default()
        };
        let idx2 = hc.tags.len() as u32;
        hc.tags.push(tag);
        process_img_tag(&mut hc, idx2, Some(&mut set), Some(&mut part_urls), None);

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("http://example.com/pix.gif").expect("entry").count, 2);
        assert_eq!(part_urls.len(), 1);
    }

    #[test]
    fn style_dimensions_are_scanned_when_attributes_missing() {
        let (mut hc, idx) = content_with_tag(vec![
            (ComponentKind::Href, b"cid:x@y".to_vec()),
            (ComponentKind::Style, b"width: 120px; height:40px".to_vec()),
        ]);
        process_img_tag(&mut hc, idx, None, None, None);
        let img = &hc.images[0];
        assert_eq!((img.width, img.height), (120, 40));
    }

    #[test]
    fn attribute_dimensions_win_over_style() {
        let (mut hc, idx) = content_with_tag(vec![
            (ComponentKind::Width, b"10".to_vec()),
            (ComponentKind::Style, b"width: 120px".to_vec()),
        ]);
        process_img_tag(&mut hc, idx, None, None, None);
        assert_eq!(hc.images[0].width, 10);
    }

    #[test]
    fn alt_text_is_emitted_with_surrounding_spaces() {
        let (mut hc, idx) = content_with_tag(vec![(ComponentKind::Alt, b"a kitten".to_vec())]);
        let mut dest = b"see".to_vec();
        process_img_tag(&mut hc, idx, None, None, Some(&mut dest));
        assert_eq!(dest, b"see a kitten ");
    }

    #[test]
    fn link_rel_icon_reuses_the_image_path() {
        let (mut hc, idx) = content_with_tag(vec![
            (ComponentKind::Rel, b"ICON".to_vec()),
            (ComponentKind::Href, b"http://example.com/favicon.ico".to_vec()),
        ]);
        let mut set = UrlSet::new();
        process_link_tag(&mut hc, idx, Some(&mut set), None);
        assert_eq!(hc.images.len(), 1);
        assert!(
            set.get("http://example.com/favicon.ico")
                .expect("icon url")
                .flags
                & HtmlUrl::IMAGE
                != 0
        );
    }

    #[test]
    fn link_without_icon_rel_is_ignored() {
        let (mut hc, idx) = content_with_tag(vec![
            (ComponentKind::Rel, b"stylesheet".to_vec()),
            (ComponentKind::Href, b"http://example.com/s.css".to_vec()),
        ]);
        process_link_tag(&mut hc, idx, None, None);
        assert!(hc.images.is_empty());
    }
}
