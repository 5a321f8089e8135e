//! Tree builder: attaches emitted tag records to a dense arena and
//! reconciles closing tags against the chain of open ancestors.
//!
//! Invariants:
//! - Node 0 is the sentinel root; every other node has a parent with a
//!   smaller index, so a reverse iteration visits children before parents.
//! - At most `MAX_TAGS` records are attached; the excess is dropped and
//!   only flagged.
//! - A closing token that balances is never attached; one that does not
//!   balance stays in the tree as a leaf.

use log::debug;

use crate::content::{HtmlContent, HtmlTag};
use crate::tags::{
    CM_EMPTY, CM_HEAD, CM_INLINE, CM_UNKNOWN, FL_CLOSED, FL_CLOSING, FL_IGNORE, FL_PAIRED,
};

pub(crate) const MAX_TAGS: u32 = 8192;

pub(crate) struct TagOutcome {
    /// Whether the tokenizer should keep emitting visible text.
    pub(crate) write_content: bool,
    /// Arena index of the attached node, when one was attached.
    pub(crate) node: Option<u32>,
}

/// Place one emitted tag. `cur_level` is the arena index of the innermost
/// open node and is updated in place; `balanced` reports whether a closing
/// token found its opening partner.
pub(crate) fn process_tag(
    hc: &mut HtmlContent,
    mut tag: HtmlTag,
    cur_level: &mut u32,
    balanced: &mut bool,
) -> TagOutcome {
    if tag.id.is_none() {
        // Unknown names count toward the cap but are never attached.
        if hc.total_tags < MAX_TAGS {
            hc.total_tags += 1;
        } else {
            hc.flags |= HtmlContent::TOO_MANY_TAGS;
        }
        return TagOutcome {
            write_content: false,
            node: None,
        };
    }

    let under_limit = hc.total_tags < MAX_TAGS;
    if !under_limit {
        hc.flags |= HtmlContent::TOO_MANY_TAGS;
    }

    if tag.flags & (CM_INLINE | CM_EMPTY) != 0 && tag.flags & FL_PAIRED == 0 {
        // Plain inline or void: a leaf under the current node. Inline pairs
        // (`FL_PAIRED`) fall through to the open-stack paths below.
        let parent_flags = hc.tags[*cur_level as usize].flags;
        let ignored = parent_flags & (CM_HEAD | CM_UNKNOWN | FL_IGNORE) != 0;
        if ignored {
            tag.flags |= FL_IGNORE;
        }
        let mut node = None;
        if under_limit {
            node = Some(attach(hc, tag, *cur_level));
            hc.total_tags += 1;
        }
        return TagOutcome {
            write_content: !ignored,
            node,
        };
    }

    if tag.flags & FL_CLOSING != 0 {
        if !under_limit {
            return TagOutcome {
                write_content: true,
                node: None,
            };
        }
        hc.total_tags += 1;

        // Walk the open chain for the nearest unclosed tag of the same id.
        let mut cur = *cur_level;
        let mut found = None;
        while cur != 0 {
            let candidate = &hc.tags[cur as usize];
            if candidate.id == tag.id && candidate.flags & FL_CLOSED == 0 {
                found = Some(cur);
                break;
            }
            cur = candidate.parent.unwrap_or(0);
        }

        return match found {
            Some(idx) => {
                hc.tags[idx as usize].flags |= FL_CLOSED;
                *cur_level = hc.tags[idx as usize].parent.unwrap_or(0);
                *balanced = true;
                TagOutcome {
                    write_content: true,
                    node: None,
                }
            }
            None => {
                debug!(
                    "unpaired closing tag {}",
                    String::from_utf8_lossy(&tag.name)
                );
                hc.flags |= HtmlContent::UNBALANCED;
                *balanced = false;
                let node = attach(hc, tag, *cur_level);
                TagOutcome {
                    write_content: true,
                    node: Some(node),
                }
            }
        };
    }

    if tag.flags & FL_CLOSED != 0 {
        // Self-closed block: a closed leaf, the open chain is untouched.
        let mut node = None;
        if under_limit {
            node = Some(attach(hc, tag, *cur_level));
            hc.total_tags += 1;
        }
        return TagOutcome {
            write_content: true,
            node,
        };
    }

    // Opening block.
    let parent_idx = *cur_level;
    if parent_idx != 0 {
        let parent = &hc.tags[parent_idx as usize];
        if parent.flags & FL_IGNORE != 0 {
            tag.flags |= FL_IGNORE;
        }
        if parent.flags & CM_INLINE != 0 && parent.id == tag.id {
            // Direct same-id nesting under an inline pair, which is no block
            // container, as in `<a>bla<a>foo`: reparent beside the parent
            // instead of under it.
            hc.flags |= HtmlContent::UNBALANCED;
            *balanced = false;
            let grandparent = parent.parent.unwrap_or(0);
            let mut node = None;
            if under_limit {
                let idx = attach(hc, tag, grandparent);
                *cur_level = idx;
                hc.total_tags += 1;
                node = Some(idx);
            }
            return TagOutcome {
                write_content: true,
                node,
            };
        }
    }

    let ignored = tag.flags & (CM_HEAD | CM_UNKNOWN | FL_IGNORE) != 0;
    if ignored {
        tag.flags |= FL_IGNORE;
    }
    let mut node = None;
    if under_limit {
        let idx = attach(hc, tag, parent_idx);
        *cur_level = idx;
        hc.total_tags += 1;
        node = Some(idx);
    }
    TagOutcome {
        write_content: !ignored,
        node,
    }
}

fn attach(hc: &mut HtmlContent, mut tag: HtmlTag, parent: u32) -> u32 {
    tag.parent = Some(parent);
    let idx = hc.tags.len() as u32;
    hc.tags.push(tag);
    hc.tags[parent as usize].children.push(idx);
    idx
}

/// Sum `content_length` from children into parents. Children always carry
/// larger arena indices, so one reverse sweep is a post-order accumulation.
pub(crate) fn propagate_lengths(hc: &mut HtmlContent) {
    for idx in (1..hc.tags.len()).rev() {
        let len = hc.tags[idx].content_length;
        if let Some(parent) = hc.tags[idx].parent {
            hc.tags[parent as usize].content_length += len;
        }
    }
}
