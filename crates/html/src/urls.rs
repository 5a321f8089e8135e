//! URL extraction: href cleanup, scheme synthesis, base-url joins, query
//! scanning, and the displayed-URL phishing check.
//!
//! The resolver never fails loudly: anything that cannot be turned into a
//! URL with a real host and a known scheme resolves to `None` and the tag is
//! kept without one.

use log::debug;
use memchr::memmem;
use url::Url;

use crate::content::{ExceptionKind, HtmlContent, HtmlUrl, ProcessException, UrlSet};
use crate::tags::ComponentKind;
use crate::util::{is_graph, is_space};

const KNOWN_SCHEMES: &[&str] = &["http", "https", "ftp", "file", "mailto", "tel", "callto"];

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn trim_spaces(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| !is_space(*b)).unwrap_or(s.len());
    let end = s.iter().rposition(|b| !is_space(*b)).map_or(start, |e| e + 1);
    &s[start..end]
}

/// Approximate "has a TLD": a dotted host whose final label looks like one.
fn has_tld(host: &str) -> bool {
    match host.rsplit_once('.') {
        Some((_, last)) => last.len() >= 2 && last.bytes().all(|b| b.is_ascii_alphabetic()),
        None => false,
    }
}

/// Clean and normalize one link target.
///
/// Heuristics for scheme-less values: `//host` gets `http:`, something
/// looking like a bare address gets `mailto://`, anything else host-like
/// gets `http://`. Synthesized URLs are marked `SCHEMALESS` and must carry a
/// TLD; bytes that had to be percent-encoded mark the URL `OBSCURED`.
pub(crate) fn process_url(input: &[u8]) -> Option<HtmlUrl> {
    let s = trim_spaces(input);
    if s.is_empty() {
        return None;
    }

    let mut prefix = "";
    let mut schemaless = false;

    if memmem::find(s, b"://").is_none()
        && !(s.starts_with(b"mailto:") || s.starts_with(b"tel:") || s.starts_with(b"callto:"))
    {
        for (i, b) in s.iter().enumerate() {
            if *b & 0x80 != 0 || b.is_ascii_alphanumeric() {
                continue;
            }
            if i == 0 && s.len() > 2 && *b == b'/' && s[1] == b'/' {
                prefix = "http:";
                schemaless = true;
            } else if *b == b'@' {
                // Likely a bare mail address.
                prefix = "mailto://";
                schemaless = true;
            } else if *b == b':' && i != 0 {
                // Scheme-like; leave as is.
            } else if i == 0 {
                // No usable data.
                return None;
            } else {
                prefix = "http://";
                schemaless = true;
            }
            break;
        }
    }

    // Drop internal whitespace, percent-encode control bytes.
    let mut out = Vec::with_capacity(prefix.len() + s.len() * 3);
    out.extend_from_slice(prefix.as_bytes());
    let mut obscured = false;
    for &b in s {
        if is_space(b) {
            continue;
        }
        if b < 0x80 && !is_graph(b) {
            out.push(b'%');
            out.push(HEX_DIGITS[usize::from(b >> 4)]);
            out.push(HEX_DIGITS[usize::from(b & 0xF)]);
            obscured = true;
        } else {
            out.push(b);
        }
    }

    let text = String::from_utf8_lossy(&out);
    let parsed = Url::parse(&text).ok()?;

    let scheme = parsed.scheme();
    if !KNOWN_SCHEMES.contains(&scheme) {
        return None;
    }
    match scheme {
        "mailto" => {
            if let Some(host) = parsed.host_str() {
                if host.is_empty() || parsed.username().is_empty() {
                    return None;
                }
            } else {
                let (user, domain) = parsed.path().split_once('@')?;
                if user.is_empty() || domain.is_empty() {
                    return None;
                }
            }
        }
        "tel" | "callto" => {
            if parsed.path().is_empty() && parsed.host_str().is_none() {
                return None;
            }
        }
        _ => {
            if parsed.host_str().is_none_or(str::is_empty) {
                return None;
            }
        }
    }

    if schemaless {
        let host = parsed.host_str()?;
        if !has_tld(host) {
            // No scheme and no TLD: too damaged to score.
            return None;
        }
    }

    let mut flags = 0;
    if obscured {
        flags |= HtmlUrl::OBSCURED;
    }
    if schemaless {
        flags |= HtmlUrl::SCHEMALESS;
    }
    Some(HtmlUrl::new(parsed.to_string(), flags))
}

/// Resolve the link target of a tag, joining relative forms against the
/// content's base url when one was captured.
pub(crate) fn process_url_tag(hc: &HtmlContent, tag_idx: u32) -> Option<HtmlUrl> {
    let tag = &hc.tags[tag_idx as usize];
    let value = tag.component(ComponentKind::Href)?;
    if value.is_empty() {
        return None;
    }

    let mut joined: Vec<u8>;
    let mut target: &[u8] = value;

    if let Some(base) = &hc.base_url
        && value.len() > 2
    {
        if value.len() > 5 && value[..5].eq_ignore_ascii_case(b"data:") {
            // Image data url, never insert as url.
            return None;
        }
        if value[0] == b'/' && value[1] != b'/' {
            // Path below the base's origin.
            if let Ok(base_parsed) = Url::parse(base)
                && let Some(host) = base_parsed.host_str()
            {
                joined = format!("{}://{}", base_parsed.scheme(), host).into_bytes();
                joined.extend_from_slice(value);
                target = &joined;
            }
        } else if memmem::find(value, b"://").is_none() {
            // Relative: concatenate below the base url.
            joined = base.as_bytes().to_vec();
            joined.extend_from_slice(value);
            target = &joined;
        }
    }

    let url = process_url(target);
    if let Some(url) = &url {
        debug!("resolved url {}", url.url);
    }
    url
}

fn url_end(text: &[u8], from: usize) -> usize {
    let mut end = from;
    while end < text.len() {
        let b = text[end];
        if is_space(b) || matches!(b, b'"' | b'\'' | b'<' | b'>') {
            break;
        }
        end += 1;
    }
    end
}

/// Scan free text for embedded absolute URLs (`scheme://` or `www.` forms).
pub(crate) fn find_urls_in_text(text: &[u8]) -> Vec<HtmlUrl> {
    let mut spans: Vec<(usize, usize)> = Vec::new();

    for m in memmem::find_iter(text, b"://") {
        let mut start = m;
        while start > 0 && text[start - 1].is_ascii_alphabetic() {
            start -= 1;
        }
        if start == m {
            continue;
        }
        spans.push((start, url_end(text, m + 3)));
    }
    for m in memmem::find_iter(text, b"www.") {
        let preceded = m > 0
            && (text[m - 1].is_ascii_alphanumeric() || matches!(text[m - 1], b'/' | b'.'));
        if preceded {
            continue;
        }
        spans.push((m, url_end(text, m)));
    }

    spans.sort_unstable();
    let mut out = Vec::new();
    let mut last_end = 0;
    for (start, end) in spans {
        if start < last_end {
            continue;
        }
        if let Some(url) = process_url(&text[start..end]) {
            out.push(url);
        }
        last_end = end;
    }
    out
}

/// Extract URLs smuggled inside the query string of a freshly inserted URL,
/// then record the URL itself in `part_urls`.
pub(crate) fn process_html_url(
    url: &HtmlUrl,
    mut url_set: Option<&mut UrlSet>,
    mut part_urls: Option<&mut Vec<HtmlUrl>>,
) {
    if let Ok(parsed) = Url::parse(&url.url)
        && let Some(query) = parsed.query()
        && !query.is_empty()
    {
        for mut found in find_urls_in_text(query.as_bytes()) {
            debug!("found url {} in query of url {}", found.url, url.url);
            found.flags |= HtmlUrl::QUERY;
            if let Some(set) = url_set.as_deref_mut() {
                if set.add_or_increase(&found)
                    && let Some(part) = part_urls.as_deref_mut()
                {
                    part.push(found);
                }
            } else if let Some(part) = part_urls.as_deref_mut() {
                part.push(found);
            }
        }
    }

    if let Some(part) = part_urls {
        part.push(url.clone());
    }
}

/// Try to read a URL out of anchor text: whole tokens only, scheme-less
/// hosts included.
fn find_url_in_visible(visible: &str) -> Option<HtmlUrl> {
    visible
        .split_whitespace()
        .find_map(|token| process_url(token.as_bytes()))
}

/// Compare the URL displayed in anchor text with the anchor's real target.
///
/// A disagreement marks both URLs `DISPLAY_URL`, records an exception span
/// over the anchor text, and folds the displayed URL into the set (an entry
/// first seen in a text part swaps `FROM_TEXT` for `HTML_DISPLAYED`).
pub(crate) fn check_displayed_url(
    exceptions: Option<&mut Vec<ProcessException>>,
    url_set: Option<&mut UrlSet>,
    dest: &[u8],
    href_offset: usize,
    url: &mut HtmlUrl,
) {
    let raw = String::from_utf8_lossy(&dest[href_offset..]);
    let visible = raw.trim_matches(char::is_whitespace).to_string();
    url.visible_part = Some(visible.clone());

    let Some(mut displayed) = find_url_in_visible(&visible) else {
        return;
    };
    if displayed.url == url.url {
        return;
    }

    debug!("displayed url {} disagrees with href {}", displayed.url, url.url);
    url.flags |= HtmlUrl::DISPLAY_URL;

    if let Some(exceptions) = exceptions {
        exceptions.push(ProcessException {
            pos: href_offset,
            len: dest.len() - href_offset,
            kind: ExceptionKind::Url,
            url: url.url.clone(),
        });
    }

    if let Some(set) = url_set {
        if let Some(entry) = set.get_mut(&url.url) {
            entry.flags |= HtmlUrl::DISPLAY_URL;
        }
        displayed.flags |= HtmlUrl::DISPLAY_URL;
        if !set.add_or_increase(&displayed)
            && let Some(existing) = set.get_mut(&displayed.url)
            && existing.flags & HtmlUrl::FROM_TEXT != 0
        {
            existing.flags |= HtmlUrl::HTML_DISPLAYED;
            existing.flags &= !HtmlUrl::FROM_TEXT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(s: &str) -> Option<HtmlUrl> {
        process_url(s.as_bytes())
    }

    #[test]
    fn absolute_urls_normalize() {
        let u = resolve("http://Example.COM/Path?q=1").expect("resolves");
        assert_eq!(u.url, "http://example.com/Path?q=1");
        assert_eq!(u.flags, 0);
    }

    #[test]
    fn surrounding_whitespace_is_stripped() {
        let u = resolve("  http://example.com/  ").expect("resolves");
        assert_eq!(u.url, "http://example.com/");
    }

    #[test]
    fn internal_whitespace_is_dropped() {
        let u = resolve("http://exam ple.com/").expect("resolves");
        assert_eq!(u.url, "http://example.com/");
    }

    #[test]
    fn control_bytes_are_encoded_and_flagged() {
        let u = process_url(b"http://example.com/a\x01b").expect("resolves");
        assert!(u.flags & HtmlUrl::OBSCURED != 0);
        assert!(u.url.contains("%01"));
    }

    #[test]
    fn protocol_relative_gets_http() {
        let u = resolve("//example.com/x").expect("resolves");
        assert_eq!(u.url, "http://example.com/x");
        assert!(u.flags & HtmlUrl::SCHEMALESS != 0);
    }

    #[test]
    fn bare_hosts_get_http() {
        let u = resolve("www.example.com/login").expect("resolves");
        assert_eq!(u.url, "http://www.example.com/login");
        assert!(u.flags & HtmlUrl::SCHEMALESS != 0);
    }

    #[test]
    fn bare_addresses_get_mailto() {
        let u = resolve("someone@example.com").expect("resolves");
        assert!(u.url.starts_with("mailto://someone@example.com"));
        assert!(u.flags & HtmlUrl::SCHEMALESS != 0);
    }

    #[test]
    fn mailto_requires_a_user_part() {
        assert!(resolve("mailto:user@example.com").is_some());
        assert!(resolve("mailto:@example.com").is_none());
        assert!(resolve("mailto:plain").is_none());
    }

    #[test]
    fn schemaless_without_tld_is_rejected() {
        assert!(resolve("//localhost/x").is_none());
        assert!(resolve("intranet/page").is_none());
        assert!(resolve("http://localhost/x").is_some());
    }

    #[test]
    fn unusable_values_resolve_to_none() {
        assert!(resolve("").is_none());
        assert!(resolve("   ").is_none());
        assert!(resolve("#anchor").is_none());
        assert!(resolve("javascript:alert(1)").is_none());
        assert!(resolve("plainword").is_none());
    }

    #[test]
    fn known_schemes_only() {
        assert!(resolve("gopher://example.com/").is_none());
        assert!(resolve("ftp://example.com/file").is_some());
        assert!(resolve("tel:+15551234567").is_some());
    }

    fn content_with_base(base: &str) -> HtmlContent {
        let mut hc = HtmlContent::new();
        hc.base_url = Some(base.to_string());
        hc
    }

    fn tag_with_href(hc: &mut HtmlContent, href: &str) -> u32 {
        let mut tag = crate::content::HtmlTag::default();
        tag.parameters
            .push((ComponentKind::Href, href.as_bytes().to_vec()));
        let idx = hc.tags.len() as u32;
        hc.tags.push(tag);
        idx
    }

    #[test]
    fn relative_href_joins_below_base_path() {
        let mut hc = content_with_base("http://ex.com/a/");
        let idx = tag_with_href(&mut hc, "foo/bar");
        let u = process_url_tag(&hc, idx).expect("resolves");
        assert_eq!(u.url, "http://ex.com/a/foo/bar");
    }

    #[test]
    fn relative_href_joins_host_only_base() {
        let mut hc = content_with_base("http://ex.com/");
        let idx = tag_with_href(&mut hc, "foo/bar");
        let u = process_url_tag(&hc, idx).expect("resolves");
        assert_eq!(u.url, "http://ex.com/foo/bar");
    }

    #[test]
    fn rooted_href_replaces_base_path() {
        let mut hc = content_with_base("http://ex.com/deep/dir/");
        let idx = tag_with_href(&mut hc, "/top");
        let u = process_url_tag(&hc, idx).expect("resolves");
        assert_eq!(u.url, "http://ex.com/top");
    }

    #[test]
    fn absolute_href_ignores_base() {
        let mut hc = content_with_base("http://ex.com/");
        let idx = tag_with_href(&mut hc, "https://other.org/x");
        let u = process_url_tag(&hc, idx).expect("resolves");
        assert_eq!(u.url, "https://other.org/x");
    }

    #[test]
    fn data_href_never_becomes_a_url() {
        let mut hc = content_with_base("http://ex.com/");
        let idx = tag_with_href(&mut hc, "data:image/png;base64,AAAA");
        assert!(process_url_tag(&hc, idx).is_none());

        let mut hc = HtmlContent::new();
        let idx = tag_with_href(&mut hc, "data:image/png;base64,AAAA");
        assert!(process_url_tag(&hc, idx).is_none());
    }

    #[test]
    fn query_urls_are_extracted_and_flagged() {
        let url = resolve("http://example.com/?x=http://evil.com").expect("resolves");
        let mut set = UrlSet::new();
        let mut part_urls = Vec::new();
        assert!(set.add_or_increase(&url));
        process_html_url(&url, Some(&mut set), Some(&mut part_urls));

        let evil = set.get("http://evil.com/").expect("query url inserted");
        assert!(evil.flags & HtmlUrl::QUERY != 0);
        // Query finds come first, the parent closes the list.
        assert_eq!(part_urls.len(), 2);
        assert_eq!(part_urls[1].url, url.url);
    }

    #[test]
    fn text_scan_finds_schemes_and_www_hosts() {
        let found = find_urls_in_text(b"visit http://a.com/x or www.b.org now");
        let urls: Vec<&str> = found.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(urls, ["http://a.com/x", "http://www.b.org/"]);
    }

    #[test]
    fn text_scan_does_not_double_count_overlaps() {
        let found = find_urls_in_text(b"http://www.a.com/");
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn displayed_url_disagreement_flags_and_records() {
        let mut url = resolve("http://example.com/").expect("resolves");
        let mut set = UrlSet::new();
        set.add_or_increase(&url);
        let mut exceptions = Vec::new();

        let dest = b"click http://safe.org now".to_vec();
        check_displayed_url(Some(&mut exceptions), Some(&mut set), &dest, 0, &mut url);

        assert!(url.flags & HtmlUrl::DISPLAY_URL != 0);
        assert!(set.get("http://example.com/").expect("href entry").flags & HtmlUrl::DISPLAY_URL != 0);
        let displayed = set.get("http://safe.org/").expect("displayed entry");
        assert!(displayed.flags & HtmlUrl::DISPLAY_URL != 0);
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].pos, 0);
        assert_eq!(exceptions[0].kind, ExceptionKind::Url);
    }

    #[test]
    fn matching_displayed_url_is_not_flagged() {
        let mut url = resolve("http://safe.org/").expect("resolves");
        let mut set = UrlSet::new();
        set.add_or_increase(&url);

        let dest = b"http://safe.org/".to_vec();
        check_displayed_url(None, Some(&mut set), &dest, 0, &mut url);
        assert_eq!(url.flags & HtmlUrl::DISPLAY_URL, 0);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn displayed_url_from_text_part_swaps_provenance() {
        let mut href = resolve("http://example.com/").expect("resolves");
        let mut set = UrlSet::new();
        set.add_or_increase(&href);
        let mut text_url = resolve("http://safe.org/").expect("resolves");
        text_url.flags |= HtmlUrl::FROM_TEXT;
        set.add_or_increase(&text_url);

        let dest = b"go http://safe.org/".to_vec();
        check_displayed_url(None, Some(&mut set), &dest, 0, &mut href);

        let entry = set.get("http://safe.org/").expect("entry");
        assert!(entry.flags & HtmlUrl::HTML_DISPLAYED != 0);
        assert_eq!(entry.flags & HtmlUrl::FROM_TEXT, 0);
        assert_eq!(entry.count, 2);
    }

    #[test]
    fn bare_domain_in_anchor_text_is_found() {
        assert!(find_url_in_visible("our site example.com here").is_some());
        assert!(find_url_in_visible("no links here at all").is_none());
    }
}
