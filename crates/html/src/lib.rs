//! HTML content processor for a spam-analysis pipeline.
//!
//! One pass over a raw (usually malformed) HTML message part produces:
//! - a sanitized visible-text byte stream,
//! - a tag tree with best-effort balancing,
//! - extracted URLs with provenance flags (image sources, query-embedded
//!   URLs, displayed-vs-href disagreements),
//! - per-block visual style (colors, font size, visibility),
//! - diagnostic flags describing structural defects of the input.
//!
//! Processing never fails: broken input degrades into flag bits on the
//! content root. The processor is synchronous and touches no process-wide
//! state beyond the immutable registries, so parts can be processed on any
//! number of threads, one [`HtmlContent`] each.
//!
//! ```
//! let mut content = html::HtmlContent::new();
//! let text = html::process_part(&mut content, b"<p>hello&nbsp;world</p>");
//! assert_eq!(text, "hello\u{00A0}world\r\n".as_bytes());
//! assert!(content.tag_seen("p"));
//! ```

mod attr;
mod content;
pub mod entities;
mod img;
mod style;
pub mod tags;
mod tokenizer;
mod tree;
mod urls;
mod util;

pub use content::{
    EmbeddedImage, ExceptionKind, FONT_SIZE_UNSET, HtmlBlock, HtmlColor, HtmlContent, HtmlImage,
    HtmlTag, HtmlUrl, ProcessException, TagExtra, UrlSet,
};
pub use tags::{ComponentKind, TagId, tag_id_by_name, tag_name_by_id};

use tokenizer::Processor;

/// Process one HTML part with every extraction enabled.
///
/// `content` is mutated in place; the returned slice is the visible text,
/// also kept on `content`. `exceptions` receives displayed-URL spans,
/// `url_set` deduplicates URLs across parts, `part_urls` lists URLs newly
/// inserted by this part in document order, and `allow_css` turns on
/// `<style>` block parsing.
pub fn process_part_full<'a>(
    content: &'a mut HtmlContent,
    input: &[u8],
    exceptions: Option<&mut Vec<ProcessException>>,
    url_set: Option<&mut UrlSet>,
    part_urls: Option<&mut Vec<HtmlUrl>>,
    allow_css: bool,
) -> &'a [u8] {
    Processor::new(content, input, exceptions, url_set, part_urls, allow_css).run();
    &content.parsed
}

/// Text-only processing: no URL collection, no exceptions, no CSS.
pub fn process_part<'a>(content: &'a mut HtmlContent, input: &[u8]) -> &'a [u8] {
    process_part_full(content, input, None, None, None, false)
}
