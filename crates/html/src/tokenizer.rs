//! Document-level tokenizer and text emitter.
//!
//! One left-to-right pass over the input bytes drives everything: the
//! attribute lexer is fed one byte at a time inside tag bodies, finished
//! tags go to the tree builder, and semantic actions (urls, images, base,
//! style blocks) run at each tag end. There is no lookbehind beyond the
//! current text run and no recursion.
//!
//! Emission rules:
//! - Runs of source whitespace collapse to one space, and only when the
//!   previous output byte is not already whitespace.
//! - `\r\n` is appended after `br`, `hr`, `p`, `tr` and `div` tokens unless
//!   the buffer already ends with a newline.
//! - Entity decoding of content is deferred: a run is copied verbatim, then
//!   decoded in place and the buffer truncated by the decode delta, but only
//!   when the run contained `&`.
//! - A tag's `content_offset` is set at the first byte emitted while it is
//!   the innermost open tag; `content_length` accumulates from there.

use log::debug;
use memchr::memmem;

use crate::attr::AttrParser;
use crate::content::{HtmlContent, HtmlTag, HtmlUrl, ProcessException, TagExtra, UrlSet};
use crate::entities;
use crate::img;
use crate::style;
use crate::tags::{CM_UNIQUE, FL_BLOCK, FL_CLOSED, FL_CLOSING, FL_HREF, TagId};
use crate::tree;
use crate::urls;
use crate::util::is_space;

/// Outer machine states. Tag finalization (the `tag_end` step) is the
/// `finish_tag` method rather than a state: it always consumes exactly the
/// terminator byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    ParseStart,
    TagBegin,
    SgmlTag,
    XmlTag,
    XmlTagEnd,
    CompoundTag,
    CommentTag,
    CommentContent,
    SgmlContent,
    TagContent,
    ContentIgnore,
    ContentWrite,
    ContentStyle,
    ContentIgnoreSp,
}

struct Pending {
    tag: HtmlTag,
    attrs: AttrParser,
}

pub(crate) struct Processor<'i, 'h, 'o> {
    input: &'i [u8],
    hc: &'h mut HtmlContent,
    exceptions: Option<&'o mut Vec<ProcessException>>,
    url_set: Option<&'o mut UrlSet>,
    part_urls: Option<&'o mut Vec<HtmlUrl>>,
    allow_css: bool,

    state: State,
    p: usize,
    c: usize,
    closing: bool,
    need_decode: bool,
    save_space: bool,
    obrace: u32,
    ebrace: u32,
    cur_level: u32,
    content_tag: Option<u32>,
    href_offset: Option<usize>,
    cur_url: Option<HtmlUrl>,
    pending: Option<Pending>,
    styles_stack: Vec<u32>,
    dest: Vec<u8>,
}

impl<'i, 'h, 'o> Processor<'i, 'h, 'o> {
    pub(crate) fn new(
        hc: &'h mut HtmlContent,
        input: &'i [u8],
        exceptions: Option<&'o mut Vec<ProcessException>>,
        url_set: Option<&'o mut UrlSet>,
        part_urls: Option<&'o mut Vec<HtmlUrl>>,
        allow_css: bool,
    ) -> Self {
        Self {
            input,
            hc,
            exceptions,
            url_set,
            part_urls,
            allow_css,
            state: State::ParseStart,
            p: 0,
            c: 0,
            closing: false,
            need_decode: false,
            save_space: false,
            obrace: 0,
            ebrace: 0,
            cur_level: 0,
            content_tag: None,
            href_offset: None,
            cur_url: None,
            pending: None,
            styles_stack: Vec::new(),
            dest: Vec::with_capacity(input.len() / 3 * 2),
        }
    }

    pub(crate) fn run(mut self) {
        let end = self.input.len();

        while self.p < end {
            let t = self.input[self.p];

            match self.state {
                State::ParseStart => {
                    if t == b'<' {
                        self.state = State::TagBegin;
                    } else {
                        // No leading tag: still content, but worth noting.
                        self.hc.flags |= HtmlContent::BAD_START;
                        self.state = State::ContentWrite;
                    }
                }

                State::TagBegin => match t {
                    b'<' => {
                        self.p += 1;
                        self.closing = false;
                    }
                    b'!' => {
                        self.state = State::SgmlTag;
                        self.p += 1;
                    }
                    b'?' => {
                        self.state = State::XmlTag;
                        self.hc.flags |= HtmlContent::XML;
                        self.p += 1;
                    }
                    b'/' => {
                        self.closing = true;
                        self.p += 1;
                    }
                    b'>' => {
                        // `<>`
                        self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                        self.finish_tag();
                    }
                    _ => {
                        self.pending = Some(Pending {
                            tag: HtmlTag::default(),
                            attrs: AttrParser::new(),
                        });
                        self.state = State::TagContent;
                    }
                },

                State::SgmlTag => match t {
                    b'[' => {
                        self.state = State::CompoundTag;
                        self.obrace = 1;
                        self.ebrace = 0;
                        self.p += 1;
                    }
                    b'-' => {
                        self.state = State::CommentTag;
                        self.p += 1;
                    }
                    _ => {
                        self.state = State::SgmlContent;
                    }
                },

                State::XmlTag => {
                    if t == b'>' {
                        self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                        self.finish_tag();
                    } else {
                        if t == b'?' {
                            self.state = State::XmlTagEnd;
                        }
                        self.p += 1;
                    }
                }

                State::XmlTagEnd => {
                    if t == b'>' {
                        self.finish_tag();
                    } else {
                        self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                        self.p += 1;
                    }
                }

                State::CompoundTag => match t {
                    b'[' => {
                        self.obrace += 1;
                        self.p += 1;
                    }
                    b']' => {
                        self.ebrace += 1;
                        self.p += 1;
                    }
                    b'>' if self.obrace == self.ebrace => {
                        self.finish_tag();
                    }
                    _ => {
                        self.p += 1;
                    }
                },

                State::CommentTag => {
                    if t != b'-' {
                        self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                        self.finish_tag();
                    } else {
                        self.p += 1;
                        self.ebrace = 0;
                        // A comment must not immediately close: `<!-->` and
                        // `<!--->` are invalid per the HTML5 comment syntax.
                        if self.p + 1 < end
                            && self.input[self.p] == b'-'
                            && self.input[self.p + 1] == b'>'
                        {
                            self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                            self.p += 1;
                            self.finish_tag();
                        } else if self.p < end && self.input[self.p] == b'>' {
                            self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                            self.finish_tag();
                        } else {
                            self.state = State::CommentContent;
                        }
                    }
                }

                State::CommentContent => {
                    if t == b'-' {
                        self.ebrace += 1;
                        self.p += 1;
                    } else if t == b'>' && self.ebrace >= 2 {
                        self.finish_tag();
                    } else {
                        self.ebrace = 0;
                        self.p += 1;
                    }
                }

                State::SgmlContent => {
                    // DOCTYPE and friends carry nothing we score.
                    if t == b'>' {
                        self.pending = None;
                        self.finish_tag();
                    } else {
                        self.p += 1;
                    }
                }

                State::TagContent => {
                    {
                        let pending = self.pending.as_mut().expect("tag body without a tag");
                        pending
                            .attrs
                            .step(self.input, self.p, &mut pending.tag, &mut self.hc.flags);
                    }
                    if t == b'>' {
                        if self.closing {
                            let tag = &mut self.pending.as_mut().expect("checked above").tag;
                            tag.flags |= FL_CLOSING;
                            if tag.flags & FL_CLOSED != 0 {
                                // `</x/>`: both closing and closed.
                                self.hc.flags |= HtmlContent::BAD_ELEMENTS;
                            }
                            self.closing = false;
                        }
                        self.finish_tag();
                    } else {
                        self.p += 1;
                    }
                }

                State::ContentIgnore => {
                    if t == b'<' {
                        self.state = State::TagBegin;
                    } else {
                        self.p += 1;
                    }
                }

                State::ContentWrite => {
                    if t != b'<' {
                        if t == b'&' {
                            self.need_decode = true;
                        } else if is_space(t) {
                            self.save_space = true;
                            if self.p > self.c {
                                self.flush_run();
                            }
                            self.c = self.p;
                            self.state = State::ContentIgnoreSp;
                        } else if self.save_space {
                            self.append_pending_space();
                        }
                        self.p += 1;
                    } else {
                        if self.c != self.p {
                            self.flush_run();
                        }
                        self.content_tag = None;
                        self.state = State::TagBegin;
                    }
                }

                State::ContentIgnoreSp => {
                    if !is_space(t) {
                        self.c = self.p;
                        self.state = State::ContentWrite;
                    } else {
                        self.p += 1;
                    }
                }

                State::ContentStyle => {
                    // Hand everything up to the closing `</s` to the CSS
                    // collaborator, or skip the block entirely.
                    let rest = &self.input[self.p..];
                    match memmem::find(rest, b"</") {
                        Some(off)
                            if self.p + off + 2 < end
                                && self.input[self.p + off + 2].to_ascii_lowercase() == b's' =>
                        {
                            if self.allow_css {
                                self.parse_style_block(self.p, self.p + off);
                            }
                            self.p += off;
                            self.state = State::TagBegin;
                        }
                        _ => {
                            self.state = State::ContentIgnore;
                        }
                    }
                }
            }
        }

        // Unterminated trailing text is still content.
        if self.state == State::ContentWrite && self.p > self.c {
            self.flush_run();
        }

        tree::propagate_lengths(self.hc);
        self.hc.parsed = self.dest;
    }

    /// Emit the pending text run `[c, p)`, decoding entities in place when
    /// the run contained `&`, and keep the innermost tag's span current.
    fn flush_run(&mut self) {
        let run = &self.input[self.c..self.p];
        if run.is_empty() {
            return;
        }
        let old_len = self.dest.len();
        if let Some(ct) = self.content_tag {
            let tag = &mut self.hc.tags[ct as usize];
            if tag.content_length == 0 {
                tag.content_offset = old_len;
            }
        }
        self.dest.extend_from_slice(run);
        let emitted = if self.need_decode {
            let new_len = entities::decode_in_place(&mut self.dest[old_len..]);
            self.dest.truncate(old_len + new_len);
            new_len
        } else {
            run.len()
        };
        if let Some(ct) = self.content_tag {
            self.hc.tags[ct as usize].content_length += emitted;
        }
    }

    /// One collapsed space, only against non-space output.
    fn append_pending_space(&mut self) {
        if let Some(last) = self.dest.last()
            && !is_space(*last)
        {
            self.dest.push(b' ');
            if let Some(ct) = self.content_tag {
                let tag = &mut self.hc.tags[ct as usize];
                if tag.content_length == 0 {
                    tag.content_offset = self.dest.len();
                } else {
                    tag.content_length += 1;
                }
            }
        }
        self.save_space = false;
    }

    /// `\r\n` separator after line-breaking tags, never doubled.
    fn append_line_break(&mut self) {
        if !self.dest.is_empty() && self.dest.last() != Some(&b'\n') {
            self.dest.extend_from_slice(b"\r\n");
            if let Some(ct) = self.content_tag {
                let tag = &mut self.hc.tags[ct as usize];
                if tag.content_length == 0 {
                    tag.content_offset = self.dest.len();
                } else {
                    tag.content_length += 2;
                }
            }
        }
    }

    fn parse_style_block(&mut self, start: usize, end: usize) {
        let css_text = String::from_utf8_lossy(&self.input[start..end]);
        match css::parse_stylesheet(&css_text) {
            Ok(sheet) if !sheet.is_empty() => match &mut self.hc.css_style {
                Some(existing) => existing.merge(sheet),
                None => self.hc.css_style = Some(sheet),
            },
            Ok(_) => {}
            Err(err) => debug!("cannot parse css: {err}"),
        }
    }

    /// Finalize the tag whose terminator is at `p`: tree placement, state
    /// transition, newline separators and semantic actions.
    fn finish_tag(&mut self) {
        if let Some(pending) = self.pending.take() {
            let tag = pending.tag;
            let id = tag.id;
            let tflags = tag.flags;

            if let Some(id) = id {
                // Only opening appearances count toward uniqueness.
                if tflags & CM_UNIQUE != 0
                    && tflags & FL_CLOSING == 0
                    && self.hc.seen_by_id(id)
                {
                    self.hc.flags |= HtmlContent::DUPLICATE_ELEMENTS;
                }
                self.hc.mark_seen(id);
            }

            let mut balanced = true;
            let outcome = tree::process_tag(self.hc, tag, &mut self.cur_level, &mut balanced);

            self.state = if outcome.write_content {
                self.need_decode = false;
                State::ContentWrite
            } else if id == Some(TagId::Style) {
                State::ContentStyle
            } else {
                State::ContentIgnore
            };

            if tflags & (FL_CLOSED | FL_CLOSING) == 0
                && let Some(node) = outcome.node
            {
                self.content_tag = Some(node);
            }

            if matches!(
                id,
                Some(TagId::Br) | Some(TagId::Hr) | Some(TagId::P) | Some(TagId::Tr)
                    | Some(TagId::Div)
            ) {
                self.append_line_break();
                self.save_space = false;
            }

            self.dispatch_semantics(outcome.node, id, tflags, balanced);
        } else {
            self.state = State::ContentWrite;
        }

        self.p += 1;
        self.c = self.p;
    }

    /// Tag-specific actions: urls, base, images, links, style blocks.
    fn dispatch_semantics(
        &mut self,
        node: Option<u32>,
        id: Option<TagId>,
        tflags: u32,
        balanced: bool,
    ) {
        if tflags & FL_HREF != 0 {
            if tflags & FL_CLOSING == 0 {
                let resolved = node.and_then(|n| urls::process_url_tag(self.hc, n));
                if let Some(url) = &resolved {
                    if let Some(n) = node
                        && matches!(self.hc.tags[n as usize].extra, TagExtra::None)
                    {
                        self.hc.tags[n as usize].extra = TagExtra::Url(url.clone());
                    }
                    let is_new = match self.url_set.as_deref_mut() {
                        Some(set) => set.add_or_increase(url),
                        None => true,
                    };
                    if is_new {
                        urls::process_html_url(
                            url,
                            self.url_set.as_deref_mut(),
                            self.part_urls.as_deref_mut(),
                        );
                    }
                    self.href_offset = Some(self.dest.len());
                }
                self.cur_url = resolved;
            }

            if id == Some(TagId::A) {
                if !balanced && tflags & FL_CLOSING == 0 {
                    self.check_previous_anchor();
                }
                if tflags & FL_CLOSING != 0 {
                    if let Some(href_offset) = self.href_offset
                        && self.dest.len() > href_offset
                        && let Some(mut url) = self.cur_url.take()
                    {
                        urls::check_displayed_url(
                            self.exceptions.as_deref_mut(),
                            self.url_set.as_deref_mut(),
                            &self.dest,
                            href_offset,
                            &mut url,
                        );
                    }
                    self.href_offset = None;
                    self.cur_url = None;
                }
            }
        } else if id == Some(TagId::Base)
            && tflags & FL_CLOSING == 0
            && self.hc.base_url.is_none()
            && let Some(n) = node
        {
            // Base belongs in head, but mail HTML puts it anywhere.
            match urls::process_url_tag(self.hc, n) {
                Some(url) => {
                    debug!("got valid base tag: {}", url.url);
                    self.hc.base_url = Some(url.url.clone());
                    self.hc.tags[n as usize].extra = TagExtra::Url(url);
                    self.hc.tags[n as usize].flags |= FL_HREF;
                }
                None => debug!("got invalid base tag"),
            }
        }

        if id == Some(TagId::Img) && tflags & FL_CLOSING == 0 {
            if let Some(n) = node {
                img::process_img_tag(
                    self.hc,
                    n,
                    self.url_set.as_deref_mut(),
                    self.part_urls.as_deref_mut(),
                    Some(&mut self.dest),
                );
            }
        } else if id == Some(TagId::Link) && tflags & FL_CLOSING == 0 {
            if let Some(n) = node {
                img::process_link_tag(
                    self.hc,
                    n,
                    self.url_set.as_deref_mut(),
                    self.part_urls.as_deref_mut(),
                );
            }
        } else if tflags & FL_BLOCK != 0 {
            if tflags & FL_CLOSING != 0 {
                self.styles_stack.pop();
            } else if let Some(n) = node {
                let block_idx = style::process_block_tag(self.hc, n);
                style::propagate_style(self.hc, block_idx, &mut self.styles_stack);

                let bl = &mut self.hc.blocks[block_idx as usize];
                if bl.font_size < 3 || bl.font_color.alpha < 10 {
                    bl.visible = false;
                    debug!(
                        "tag is not visible: font size {}, alpha {}",
                        bl.font_size, bl.font_color.alpha
                    );
                }
                if !bl.visible {
                    self.state = State::ContentIgnore;
                }
            }
        }
    }

    /// The `<a>bla<a>foo` path: the first anchor never closed, so its
    /// displayed text ends where the second anchor starts.
    fn check_previous_anchor(&mut self) {
        let cur = self.cur_level;
        let Some(parent) = self.hc.tags[cur as usize].parent else {
            return;
        };
        let siblings = &self.hc.tags[parent as usize].children;
        let Some(pos) = siblings.iter().position(|i| *i == cur) else {
            return;
        };
        if pos == 0 {
            return;
        }
        let prev_idx = siblings[pos - 1];

        let prev = &self.hc.tags[prev_idx as usize];
        let prev_url = match (&prev.extra, prev.id) {
            (TagExtra::Url(url), Some(TagId::A)) if prev.flags & FL_CLOSING == 0 => url.clone(),
            _ => return,
        };

        let Some(href_offset) = self.href_offset else {
            return;
        };
        let mut url = prev_url;
        urls::check_displayed_url(
            self.exceptions.as_deref_mut(),
            self.url_set.as_deref_mut(),
            &self.dest,
            href_offset,
            &mut url,
        );
        self.hc.tags[prev_idx as usize].extra = TagExtra::Url(url);
    }
}
