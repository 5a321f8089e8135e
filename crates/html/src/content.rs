//! Parsed-content data model.
//!
//! Everything produced by one processing pass lives in vectors owned by
//! `HtmlContent`; tag records reference each other through dense indices
//! (node 0 is an empty sentinel root), so dropping the content releases the
//! whole parse and nothing is freed individually.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::tags::{ComponentKind, N_TAGS, TagId};

/// Structural-defect flags on [`HtmlContent::flags`]. Stable public values.
impl HtmlContent {
    pub const BAD_START: u32 = 0x1;
    pub const XML: u32 = 0x2;
    pub const UNBALANCED: u32 = 0x4;
    pub const BAD_ELEMENTS: u32 = 0x8;
    pub const UNKNOWN_ELEMENTS: u32 = 0x10;
    pub const DUPLICATE_ELEMENTS: u32 = 0x20;
    pub const TOO_MANY_TAGS: u32 = 0x40;
    pub const HAS_DATA_URLS: u32 = 0x80;
}

/// RGBA color with a validity marker (`valid == false` means "not set").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HtmlColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: u8,
    pub valid: bool,
}

impl HtmlColor {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r,
            g,
            b,
            alpha: 255,
            valid: true,
        }
    }

    /// Packed `0xRRGGBBAA` form used by scoring rules.
    pub fn to_rgba_u32(self) -> u32 {
        (u32::from(self.r) << 24)
            | (u32::from(self.g) << 16)
            | (u32::from(self.b) << 8)
            | u32::from(self.alpha)
    }
}

/// Per-tag payload; which variant may appear is determined by the tag id.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TagExtra {
    #[default]
    None,
    Url(HtmlUrl),
    /// Index into [`HtmlContent::images`].
    Image(u32),
    /// Index into [`HtmlContent::blocks`].
    Block(u32),
}

/// One parsed element: registry identity, attributes, tree links and the
/// span of visible text emitted while it was open.
#[derive(Clone, Debug, Default)]
pub struct HtmlTag {
    /// `None` for names the registry does not know.
    pub id: Option<TagId>,
    /// Entity-decoded, ASCII-lowercased name bytes.
    pub name: Vec<u8>,
    pub flags: u32,
    /// First value wins; duplicate attribute kinds are never stored.
    pub parameters: Vec<(ComponentKind, Vec<u8>)>,
    /// Arena index of the parent; `None` only on the sentinel root.
    pub parent: Option<u32>,
    /// Arena indices of children, in document order.
    pub children: Vec<u32>,
    pub content_offset: usize,
    pub content_length: usize,
    pub extra: TagExtra,
}

impl HtmlTag {
    /// First stored value for an attribute kind.
    pub fn component(&self, kind: ComponentKind) -> Option<&[u8]> {
        self.parameters
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_slice())
    }

    pub(crate) fn has_component(&self, kind: ComponentKind) -> bool {
        self.parameters.iter().any(|(k, _)| *k == kind)
    }
}

/// Flags on [`HtmlImage::flags`].
impl HtmlImage {
    pub const EMBEDDED: u32 = 0x1;
    pub const EXTERNAL: u32 = 0x2;
    pub const DATA: u32 = 0x4;
}

/// Dimensions and format recovered from a decoded `data:` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub mime: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct HtmlImage {
    /// Raw `src` attribute bytes.
    pub src: Vec<u8>,
    /// Resolved external URL, when the source was not embedded.
    pub url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub flags: u32,
    pub embedded_image: Option<EmbeddedImage>,
}

/// Sentinel for "font size not set on this block".
pub const FONT_SIZE_UNSET: u32 = u32::MAX;

/// Visual style computed for one block-level element.
#[derive(Clone, Debug)]
pub struct HtmlBlock {
    /// Arena index of the owning tag.
    pub tag: u32,
    /// Raw `style` attribute bytes, when present.
    pub style: Vec<u8>,
    pub class: Option<Vec<u8>>,
    pub font_color: HtmlColor,
    pub background_color: HtmlColor,
    pub font_size: u32,
    pub visible: bool,
}

impl HtmlBlock {
    pub(crate) fn new(tag: u32) -> Self {
        Self {
            tag,
            style: Vec::new(),
            class: None,
            font_color: HtmlColor {
                alpha: 255,
                ..HtmlColor::default()
            },
            background_color: HtmlColor::default(),
            font_size: FONT_SIZE_UNSET,
            visible: true,
        }
    }
}

/// Provenance flags on [`HtmlUrl::flags`].
impl HtmlUrl {
    pub const IMAGE: u32 = 0x1;
    pub const DISPLAY_URL: u32 = 0x2;
    pub const QUERY: u32 = 0x4;
    pub const OBSCURED: u32 = 0x8;
    pub const SCHEMALESS: u32 = 0x10;
    pub const HTML_DISPLAYED: u32 = 0x20;
    pub const FROM_TEXT: u32 = 0x40;
    pub const NO_TLD: u32 = 0x80;
}

/// One extracted URL: normalized form plus provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtmlUrl {
    /// Normalized URL string; the identity key in a [`UrlSet`].
    pub url: String,
    pub flags: u32,
    pub count: u32,
    /// Anchor text captured for displayed-URL analysis.
    pub visible_part: Option<String>,
}

impl HtmlUrl {
    pub(crate) fn new(url: String, flags: u32) -> Self {
        Self {
            url,
            flags,
            count: 1,
            visible_part: None,
        }
    }
}

/// URL collection keyed by normalized identity. Inserting a duplicate
/// increments its count and OR-merges flags instead of storing twice.
#[derive(Debug, Default)]
pub struct UrlSet {
    map: HashMap<String, HtmlUrl>,
}

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or coalesce. Returns `true` when the URL was newly inserted.
    pub fn add_or_increase(&mut self, url: &HtmlUrl) -> bool {
        match self.map.entry(url.url.clone()) {
            Entry::Occupied(mut e) => {
                let existing = e.get_mut();
                existing.count += 1;
                existing.flags |= url.flags;
                false
            }
            Entry::Vacant(v) => {
                v.insert(url.clone());
                true
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<&HtmlUrl> {
        self.map.get(url)
    }

    pub(crate) fn get_mut(&mut self, url: &str) -> Option<&mut HtmlUrl> {
        self.map.get_mut(url)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HtmlUrl> {
        self.map.values()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    Url,
}

/// A span of visible text carrying special semantics for downstream scoring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessException {
    pub pos: usize,
    pub len: usize,
    pub kind: ExceptionKind,
    pub url: String,
}

const TAGS_SEEN_WORDS: usize = N_TAGS.div_ceil(64);

/// Root of one processed part.
#[derive(Debug)]
pub struct HtmlContent {
    /// Dense tag arena; index 0 is the sentinel root.
    pub tags: Vec<HtmlTag>,
    /// Visible text produced by the pass.
    pub parsed: Vec<u8>,
    pub images: Vec<HtmlImage>,
    pub blocks: Vec<HtmlBlock>,
    pub flags: u32,
    /// Page background; opaque white until a `body` background is seen.
    pub bgcolor: HtmlColor,
    pub base_url: Option<String>,
    /// Rules accumulated from `<style>` blocks when CSS parsing is enabled.
    pub css_style: Option<css::Stylesheet>,
    /// Count of tag tokens handed to the tree builder, capped elsewhere.
    pub total_tags: u32,
    tags_seen: [u64; TAGS_SEEN_WORDS],
}

impl HtmlContent {
    pub fn new() -> Self {
        Self {
            tags: vec![HtmlTag::default()],
            parsed: Vec::new(),
            images: Vec::new(),
            blocks: Vec::new(),
            flags: 0,
            bgcolor: HtmlColor::rgb(255, 255, 255),
            base_url: None,
            css_style: None,
            total_tags: 0,
            tags_seen: [0; TAGS_SEEN_WORDS],
        }
    }

    pub(crate) fn mark_seen(&mut self, id: TagId) {
        let idx = id as usize;
        self.tags_seen[idx / 64] |= 1 << (idx % 64);
    }

    pub fn seen_by_id(&self, id: TagId) -> bool {
        let idx = id as usize;
        self.tags_seen[idx / 64] & (1 << (idx % 64)) != 0
    }

    /// Was a tag with this name present in the input?
    pub fn tag_seen(&self, name: &str) -> bool {
        match crate::tags::tag_id_by_name(name.as_bytes()) {
            Some(id) => self.seen_by_id(id),
            None => false,
        }
    }

    pub fn root(&self) -> &HtmlTag {
        &self.tags[0]
    }

    pub fn children(&self, idx: u32) -> &[u32] {
        &self.tags[idx as usize].children
    }
}

impl Default for HtmlContent {
    fn default() -> Self {
        Self::new()
    }
}
