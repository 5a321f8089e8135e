//! Attribute lexer: a resumable per-byte state machine over one tag's
//! interior (the bytes between `<` or `</` and the matching `>`).
//!
//! The machine is driven one byte at a time by the outer tokenizer and keeps
//! its whole resume state in three fields, so a tag interior never needs to
//! be re-scanned. Malformed input degrades per tag: a broken name or a quote
//! where `=` was expected poisons only the current tag (`IgnoreBadTag`).
//!
//! Legacy tolerances, kept deliberately:
//! - An attribute name followed by whitespace and then `>` is an accepted
//!   empty-valued attribute.
//! - A name directly followed by a quote (`href"x"`) is read as a value;
//!   whitespace between name and quote marks the tag broken instead.
//! - Unknown attribute names are parsed and discarded.

use crate::content::{HtmlContent, HtmlTag};
use crate::entities;
use crate::tags::{self, ComponentKind, FL_BROKEN, FL_CLOSED};
use crate::util::{is_graph, is_space};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrState {
    Start,
    Name,
    AttrName,
    Equal,
    StartDq,
    DqValue,
    EndDq,
    StartSq,
    SqValue,
    EndSq,
    Value,
    SpacesAfterName,
    SpacesBeforeEq,
    SpacesAfterEq,
    SpacesAfterParam,
    IgnoreBadTag,
}

#[derive(Debug)]
pub(crate) struct AttrParser {
    state: AttrState,
    /// Start offset of the slice being accumulated (name or value).
    saved: Option<usize>,
    component: Option<ComponentKind>,
    name_start: Option<usize>,
}

impl AttrParser {
    pub(crate) fn new() -> Self {
        Self {
            state: AttrState::Start,
            saved: None,
            component: None,
            name_start: None,
        }
    }

    /// Feed one byte of the tag interior. `pos` indexes into `input`.
    pub(crate) fn step(
        &mut self,
        input: &[u8],
        pos: usize,
        tag: &mut HtmlTag,
        content_flags: &mut u32,
    ) {
        let b = input[pos];

        match self.state {
            AttrState::Start => {
                if !b.is_ascii_alphabetic() && !is_space(b) {
                    *content_flags |= HtmlContent::BAD_ELEMENTS;
                    self.state = AttrState::IgnoreBadTag;
                    tag.id = None;
                    tag.flags |= FL_BROKEN;
                } else if b.is_ascii_alphabetic() {
                    self.state = AttrState::Name;
                    self.name_start = Some(pos);
                }
            }

            AttrState::Name => {
                if is_space(b) || b == b'>' || b == b'/' {
                    if b == b'/' {
                        tag.flags |= FL_CLOSED;
                    }
                    let start = self.name_start.unwrap_or(pos);
                    if start == pos {
                        *content_flags |= HtmlContent::BAD_ELEMENTS;
                        tag.id = None;
                        tag.flags |= FL_BROKEN;
                        self.state = AttrState::IgnoreBadTag;
                    } else {
                        let mut name = input[start..pos].to_vec();
                        entities::decode_vec(&mut name);
                        name.make_ascii_lowercase();
                        match tags::by_name(&name) {
                            Some(def) => {
                                tag.id = Some(def.id);
                                tag.flags |= def.flags;
                            }
                            None => {
                                *content_flags |= HtmlContent::UNKNOWN_ELEMENTS;
                                tag.id = None;
                            }
                        }
                        tag.name = name;
                        self.state = AttrState::SpacesAfterName;
                    }
                }
            }

            AttrState::AttrName => {
                let Some(saved) = self.saved else {
                    self.state = AttrState::IgnoreBadTag;
                    return;
                };
                let mut attr_name_end = pos;
                if b == b'=' {
                    self.state = AttrState::Equal;
                } else if b == b'"' {
                    // No equal sign but a quote: read what follows as a value.
                    self.state = AttrState::StartDq;
                    attr_name_end = backtrack_alnum(input, saved, pos);
                } else if is_space(b) {
                    self.state = AttrState::SpacesBeforeEq;
                } else if b == b'/' {
                    tag.flags |= FL_CLOSED;
                } else if !is_graph(b) {
                    self.state = AttrState::Value;
                    attr_name_end = backtrack_alnum(input, saved, pos);
                } else {
                    // Still inside the attribute name.
                    return;
                }

                self.component = find_component(&input[saved..attr_name_end]);
                if self.component.is_none() {
                    self.saved = None;
                } else if self.state == AttrState::Value {
                    self.saved = Some(pos + 1);
                }
            }

            AttrState::SpacesAfterName => {
                if !is_space(b) {
                    self.saved = Some(pos);
                    if b == b'/' {
                        tag.flags |= FL_CLOSED;
                    } else if b != b'>' {
                        self.state = AttrState::AttrName;
                    }
                }
            }

            AttrState::SpacesBeforeEq => {
                if b == b'=' {
                    self.state = AttrState::Equal;
                } else if !is_space(b) {
                    if b == b'>' {
                        // Name then end of tag: an empty attribute; the outer
                        // machine finalizes the tag.
                    } else if b == b'"' || b == b'\'' {
                        *content_flags |= HtmlContent::BAD_ELEMENTS;
                        tag.flags |= FL_BROKEN;
                        self.state = AttrState::IgnoreBadTag;
                    } else {
                        // Previous attribute had no value; start the next one.
                        self.state = AttrState::AttrName;
                        self.saved = Some(pos);
                    }
                }
            }

            AttrState::SpacesAfterEq => {
                if b == b'"' {
                    self.state = AttrState::StartDq;
                } else if b == b'\'' {
                    self.state = AttrState::StartSq;
                } else if !is_space(b) {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::Value;
                }
            }

            AttrState::Equal => {
                if is_space(b) {
                    self.state = AttrState::SpacesAfterEq;
                } else if b == b'"' {
                    self.state = AttrState::StartDq;
                } else if b == b'\'' {
                    self.state = AttrState::StartSq;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::Value;
                }
            }

            AttrState::StartDq => {
                if b == b'"' {
                    // Empty attribute value.
                    self.saved = None;
                    self.state = AttrState::SpacesAfterParam;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::DqValue;
                }
            }

            AttrState::StartSq => {
                if b == b'\'' {
                    self.saved = None;
                    self.state = AttrState::SpacesAfterParam;
                } else {
                    if self.saved.is_some() {
                        self.saved = Some(pos);
                    }
                    self.state = AttrState::SqValue;
                }
            }

            AttrState::DqValue => {
                if b == b'"' {
                    self.store(input, pos, tag);
                    self.state = AttrState::EndDq;
                }
            }

            AttrState::SqValue => {
                if b == b'\'' {
                    self.store(input, pos, tag);
                    self.state = AttrState::EndSq;
                }
            }

            AttrState::Value => {
                if b == b'/' && input.get(pos + 1) == Some(&b'>') {
                    tag.flags |= FL_CLOSED;
                    self.store(input, pos, tag);
                } else if is_space(b) || b == b'>' || b == b'"' {
                    self.store(input, pos, tag);
                    self.state = AttrState::SpacesAfterParam;
                }
            }

            AttrState::EndDq | AttrState::EndSq => {
                if is_space(b) {
                    self.state = AttrState::SpacesAfterParam;
                } else if b == b'/' && input.get(pos + 1) == Some(&b'>') {
                    tag.flags |= FL_CLOSED;
                } else {
                    // No space between attributes; start the next name here.
                    self.state = AttrState::AttrName;
                    self.saved = Some(pos);
                }
            }

            AttrState::SpacesAfterParam => {
                if !is_space(b) {
                    if b == b'/' && input.get(pos + 1) == Some(&b'>') {
                        tag.flags |= FL_CLOSED;
                    }
                    self.state = AttrState::AttrName;
                    self.saved = Some(pos);
                }
            }

            AttrState::IgnoreBadTag => {}
        }
    }

    /// Store the accumulated value for the current component, first
    /// occurrence wins. Always clears the accumulation state.
    fn store(&mut self, input: &[u8], end: usize, tag: &mut HtmlTag) {
        if let (Some(saved), Some(component)) = (self.saved, self.component)
            && end > saved
            && !tag.has_component(component)
        {
            let mut value = input[saved..end].to_vec();
            entities::decode_vec(&mut value);
            tag.parameters.push((component, value));
        }
        self.saved = None;
        self.component = None;
    }
}

/// Trim trailing non-alphanumeric bytes off an attribute name slice.
fn backtrack_alnum(input: &[u8], saved: usize, pos: usize) -> usize {
    let mut end = pos.saturating_sub(1);
    while end > saved && !input[end].is_ascii_alphanumeric() {
        end -= 1;
    }
    end + 1
}

/// Entity-decode and lowercase an attribute name, then classify it.
fn find_component(name: &[u8]) -> Option<ComponentKind> {
    if name.is_empty() {
        return None;
    }
    let mut owned = name.to_vec();
    entities::decode_vec(&mut owned);
    owned.make_ascii_lowercase();
    tags::component_by_name(&owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagId;

    /// Run the lexer over a tag interior, including the final `>` the outer
    /// machine would also feed it.
    fn parse(interior: &str) -> (HtmlTag, u32) {
        let mut tag = HtmlTag::default();
        let mut flags = 0u32;
        let mut parser = AttrParser::new();
        let bytes = interior.as_bytes();
        for pos in 0..bytes.len() {
            parser.step(bytes, pos, &mut tag, &mut flags);
        }
        (tag, flags)
    }

    fn href(tag: &HtmlTag) -> Option<&str> {
        tag.component(ComponentKind::Href)
            .map(|v| std::str::from_utf8(v).expect("ascii test data"))
    }

    #[test]
    fn parses_name_and_double_quoted_value() {
        let (tag, flags) = parse("a href=\"http://x/\">");
        assert_eq!(tag.id, Some(TagId::A));
        assert_eq!(href(&tag), Some("http://x/"));
        assert_eq!(flags, 0);
    }

    #[test]
    fn parses_single_quoted_and_unquoted_values() {
        let (tag, _) = parse("a href='x y'>");
        assert_eq!(href(&tag), Some("x y"));

        let (tag, _) = parse("a href=plain>");
        assert_eq!(href(&tag), Some("plain"));
    }

    #[test]
    fn name_case_is_folded_and_decoded() {
        let (tag, _) = parse("DiV>");
        assert_eq!(tag.id, Some(TagId::Div));
        assert_eq!(tag.name, b"div");

        let (tag, _) = parse("A HREF=x>");
        assert_eq!(tag.id, Some(TagId::A));
        assert_eq!(href(&tag), Some("x"));
    }

    #[test]
    fn trailing_slash_sets_closed() {
        let (tag, _) = parse("br/>");
        assert_eq!(tag.id, Some(TagId::Br));
        assert!(tag.flags & FL_CLOSED != 0);

        let (tag, _) = parse("img src=x/>");
        assert!(tag.flags & FL_CLOSED != 0);
        assert_eq!(href(&tag), Some("x"));

        let (tag, _) = parse("div >");
        assert!(tag.flags & FL_CLOSED == 0);
    }

    #[test]
    fn unknown_tag_name_is_flagged() {
        let (tag, flags) = parse("blink2000>");
        assert_eq!(tag.id, None);
        assert!(flags & HtmlContent::UNKNOWN_ELEMENTS != 0);
        assert_eq!(tag.name, b"blink2000");
    }

    #[test]
    fn non_alpha_start_is_broken() {
        let (tag, flags) = parse("=junk>");
        assert!(flags & HtmlContent::BAD_ELEMENTS != 0);
        assert!(tag.flags & FL_BROKEN != 0);
        assert_eq!(tag.id, None);
    }

    #[test]
    fn duplicate_attribute_keeps_first_value() {
        let (tag, _) = parse("a href=\"first\" href=\"second\">");
        assert_eq!(href(&tag), Some("first"));
        assert_eq!(tag.parameters.len(), 1);
    }

    #[test]
    fn src_and_action_collapse_to_href() {
        let (tag, _) = parse("img src=\"pic.png\">");
        assert_eq!(href(&tag), Some("pic.png"));

        let (tag, _) = parse("form action=\"http://x/\">");
        assert_eq!(href(&tag), Some("http://x/"));
    }

    #[test]
    fn unknown_attributes_are_discarded() {
        let (tag, _) = parse("a onclick=\"evil()\" href=\"x\">");
        assert_eq!(tag.parameters.len(), 1);
        assert_eq!(href(&tag), Some("x"));
    }

    #[test]
    fn attribute_values_are_entity_decoded() {
        let (tag, _) = parse("a href=\"x&amp;y\">");
        assert_eq!(href(&tag), Some("x&y"));
    }

    #[test]
    fn name_space_then_quote_is_broken() {
        let (tag, flags) = parse("a href \"x\">");
        assert!(flags & HtmlContent::BAD_ELEMENTS != 0);
        assert!(tag.flags & FL_BROKEN != 0);
        assert_eq!(href(&tag), None);
    }

    #[test]
    fn name_directly_followed_by_quote_reads_a_value() {
        let (tag, flags) = parse("a href\"x\">");
        assert_eq!(flags, 0);
        assert_eq!(href(&tag), Some("x"));
    }

    #[test]
    fn bare_attribute_before_close_is_accepted_empty() {
        let (tag, flags) = parse("input disabled >");
        assert_eq!(tag.id, Some(TagId::Input));
        assert_eq!(flags, 0);
        assert!(tag.parameters.is_empty());
    }

    #[test]
    fn spaces_around_equals_are_tolerated() {
        let (tag, _) = parse("a href = \"x\">");
        assert_eq!(href(&tag), Some("x"));

        let (tag, _) = parse("a href =x>");
        assert_eq!(href(&tag), Some("x"));
    }

    #[test]
    fn empty_quoted_value_is_dropped() {
        let (tag, _) = parse("a href=\"\">");
        assert_eq!(href(&tag), None);
    }

    #[test]
    fn adjacent_quoted_attributes_without_spaces() {
        let (tag, _) = parse("img src=\"x\"width=\"5\">");
        assert_eq!(href(&tag), Some("x"));
        assert_eq!(tag.component(ComponentKind::Width), Some(&b"5"[..]));
    }

    #[test]
    fn broken_tag_stops_collecting_attributes() {
        let (tag, flags) = parse("a href \"x\" class=\"c\">");
        assert!(flags & HtmlContent::BAD_ELEMENTS != 0);
        assert!(tag.parameters.is_empty());
    }
}
