//! Tag-name and attribute-name registries.
//!
//! Both registries are compile-time perfect maps: immutable, shared by every
//! concurrently processed part. Names are matched in canonical ASCII
//! lowercase; callers lowercase before lookup or go through the helpers here.

use phf::phf_map;

// Static content-model classes, assigned by the registry.
pub const CM_INLINE: u32 = 1 << 0;
pub const CM_EMPTY: u32 = 1 << 1;
pub const CM_HEAD: u32 = 1 << 2;
pub const CM_UNKNOWN: u32 = 1 << 3;
pub const CM_UNIQUE: u32 = 1 << 4;
pub const FL_BLOCK: u32 = 1 << 5;
pub const FL_HREF: u32 = 1 << 6;
/// Inline pair: opens on the tree builder's open stack and must be matched
/// by a closing tag, unlike plain inline leaves.
pub const FL_PAIRED: u32 = 1 << 7;

// Dynamic flags, set while parsing and building the tree.
pub const FL_CLOSING: u32 = 1 << 16;
pub const FL_CLOSED: u32 = 1 << 17;
pub const FL_IGNORE: u32 = 1 << 18;
pub const FL_BROKEN: u32 = 1 << 19;
pub const FL_IMAGE: u32 = 1 << 20;

/// Dense tag identifier; doubles as the index into the tags-seen bitset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum TagId {
    A,
    Abbr,
    Acronym,
    Address,
    Applet,
    Area,
    Article,
    Aside,
    B,
    Base,
    Basefont,
    Bdo,
    Big,
    Blockquote,
    Body,
    Br,
    Button,
    Caption,
    Center,
    Cite,
    Code,
    Col,
    Colgroup,
    Dd,
    Del,
    Dfn,
    Dir,
    Div,
    Dl,
    Dt,
    Em,
    Embed,
    Fieldset,
    Font,
    Footer,
    Form,
    Frame,
    Frameset,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Head,
    Header,
    Hr,
    Html,
    I,
    Iframe,
    Img,
    Input,
    Ins,
    Kbd,
    Label,
    Legend,
    Li,
    Link,
    Main,
    Map,
    Marquee,
    Menu,
    Meta,
    Nav,
    Noframes,
    Noscript,
    Object,
    Ol,
    Optgroup,
    Option,
    P,
    Param,
    Pre,
    Q,
    S,
    Samp,
    Script,
    Section,
    Select,
    Small,
    Source,
    Span,
    Strike,
    Strong,
    Style,
    Sub,
    Sup,
    Table,
    Tbody,
    Td,
    Textarea,
    Tfoot,
    Th,
    Thead,
    Title,
    Tr,
    Track,
    Tt,
    U,
    Ul,
    Var,
    Wbr,
    Xmp,
}

pub const N_TAGS: usize = 103;

#[derive(Clone, Copy, Debug)]
pub struct TagDef {
    pub id: TagId,
    pub flags: u32,
}

const fn def(id: TagId, flags: u32) -> TagDef {
    TagDef { id, flags }
}

static TAGS_BY_NAME: phf::Map<&'static str, TagDef> = phf_map! {
    "a" => def(TagId::A, CM_INLINE | FL_PAIRED | FL_HREF | FL_BLOCK),
    "abbr" => def(TagId::Abbr, CM_INLINE),
    "acronym" => def(TagId::Acronym, CM_INLINE),
    "address" => def(TagId::Address, FL_BLOCK),
    "applet" => def(TagId::Applet, CM_UNKNOWN),
    "area" => def(TagId::Area, CM_INLINE | CM_EMPTY | FL_HREF),
    "article" => def(TagId::Article, FL_BLOCK),
    "aside" => def(TagId::Aside, FL_BLOCK),
    "b" => def(TagId::B, CM_INLINE | FL_PAIRED),
    "base" => def(TagId::Base, CM_HEAD | CM_EMPTY),
    "basefont" => def(TagId::Basefont, CM_INLINE | CM_EMPTY),
    "bdo" => def(TagId::Bdo, CM_INLINE),
    "big" => def(TagId::Big, CM_INLINE | FL_PAIRED),
    "blockquote" => def(TagId::Blockquote, FL_BLOCK),
    "body" => def(TagId::Body, CM_UNIQUE | FL_BLOCK),
    "br" => def(TagId::Br, CM_INLINE | CM_EMPTY),
    "button" => def(TagId::Button, CM_INLINE),
    "caption" => def(TagId::Caption, FL_BLOCK),
    "center" => def(TagId::Center, FL_BLOCK),
    "cite" => def(TagId::Cite, CM_INLINE),
    "code" => def(TagId::Code, CM_INLINE),
    "col" => def(TagId::Col, CM_EMPTY),
    "colgroup" => def(TagId::Colgroup, 0),
    "dd" => def(TagId::Dd, FL_BLOCK),
    "del" => def(TagId::Del, CM_INLINE),
    "dfn" => def(TagId::Dfn, CM_INLINE),
    "dir" => def(TagId::Dir, FL_BLOCK),
    "div" => def(TagId::Div, FL_BLOCK),
    "dl" => def(TagId::Dl, FL_BLOCK),
    "dt" => def(TagId::Dt, FL_BLOCK),
    "em" => def(TagId::Em, CM_INLINE | FL_PAIRED),
    "embed" => def(TagId::Embed, CM_EMPTY),
    "fieldset" => def(TagId::Fieldset, FL_BLOCK),
    "font" => def(TagId::Font, CM_INLINE | FL_PAIRED | FL_BLOCK),
    "footer" => def(TagId::Footer, FL_BLOCK),
    "form" => def(TagId::Form, FL_BLOCK | FL_HREF),
    "frame" => def(TagId::Frame, CM_EMPTY | CM_UNKNOWN),
    "frameset" => def(TagId::Frameset, CM_UNKNOWN),
    "h1" => def(TagId::H1, FL_BLOCK),
    "h2" => def(TagId::H2, FL_BLOCK),
    "h3" => def(TagId::H3, FL_BLOCK),
    "h4" => def(TagId::H4, FL_BLOCK),
    "h5" => def(TagId::H5, FL_BLOCK),
    "h6" => def(TagId::H6, FL_BLOCK),
    "head" => def(TagId::Head, CM_HEAD | CM_UNIQUE),
    "header" => def(TagId::Header, FL_BLOCK),
    "hr" => def(TagId::Hr, CM_INLINE | CM_EMPTY),
    "html" => def(TagId::Html, CM_UNIQUE),
    "i" => def(TagId::I, CM_INLINE | FL_PAIRED),
    "iframe" => def(TagId::Iframe, CM_UNKNOWN),
    "img" => def(TagId::Img, CM_INLINE | CM_EMPTY),
    "input" => def(TagId::Input, CM_INLINE | CM_EMPTY),
    "ins" => def(TagId::Ins, CM_INLINE),
    "kbd" => def(TagId::Kbd, CM_INLINE),
    "label" => def(TagId::Label, CM_INLINE),
    "legend" => def(TagId::Legend, CM_INLINE),
    "li" => def(TagId::Li, FL_BLOCK),
    "link" => def(TagId::Link, CM_HEAD | CM_EMPTY | FL_HREF),
    "main" => def(TagId::Main, FL_BLOCK),
    "map" => def(TagId::Map, CM_INLINE),
    "marquee" => def(TagId::Marquee, FL_BLOCK),
    "menu" => def(TagId::Menu, FL_BLOCK),
    "meta" => def(TagId::Meta, CM_HEAD | CM_EMPTY),
    "nav" => def(TagId::Nav, FL_BLOCK),
    "noframes" => def(TagId::Noframes, CM_UNKNOWN),
    "noscript" => def(TagId::Noscript, CM_UNKNOWN),
    "object" => def(TagId::Object, CM_UNKNOWN),
    "ol" => def(TagId::Ol, FL_BLOCK),
    "optgroup" => def(TagId::Optgroup, CM_INLINE),
    "option" => def(TagId::Option, CM_INLINE),
    "p" => def(TagId::P, FL_BLOCK),
    "param" => def(TagId::Param, CM_EMPTY),
    "pre" => def(TagId::Pre, FL_BLOCK),
    "q" => def(TagId::Q, CM_INLINE),
    "s" => def(TagId::S, CM_INLINE | FL_PAIRED),
    "samp" => def(TagId::Samp, CM_INLINE),
    "script" => def(TagId::Script, CM_HEAD | CM_UNKNOWN),
    "section" => def(TagId::Section, FL_BLOCK),
    "select" => def(TagId::Select, CM_INLINE),
    "small" => def(TagId::Small, CM_INLINE | FL_PAIRED),
    "source" => def(TagId::Source, CM_EMPTY),
    "span" => def(TagId::Span, CM_INLINE | FL_PAIRED | FL_BLOCK),
    "strike" => def(TagId::Strike, CM_INLINE | FL_PAIRED),
    "strong" => def(TagId::Strong, CM_INLINE | FL_PAIRED),
    "style" => def(TagId::Style, CM_HEAD),
    "sub" => def(TagId::Sub, CM_INLINE),
    "sup" => def(TagId::Sup, CM_INLINE),
    "table" => def(TagId::Table, FL_BLOCK),
    "tbody" => def(TagId::Tbody, FL_BLOCK),
    "td" => def(TagId::Td, FL_BLOCK),
    "textarea" => def(TagId::Textarea, CM_INLINE),
    "tfoot" => def(TagId::Tfoot, FL_BLOCK),
    "th" => def(TagId::Th, FL_BLOCK),
    "thead" => def(TagId::Thead, FL_BLOCK),
    "title" => def(TagId::Title, CM_HEAD | CM_UNIQUE),
    "tr" => def(TagId::Tr, FL_BLOCK),
    "track" => def(TagId::Track, CM_EMPTY),
    "tt" => def(TagId::Tt, CM_INLINE),
    "u" => def(TagId::U, CM_INLINE | FL_PAIRED),
    "ul" => def(TagId::Ul, FL_BLOCK),
    "var" => def(TagId::Var, CM_INLINE),
    "wbr" => def(TagId::Wbr, CM_INLINE | CM_EMPTY),
    "xmp" => def(TagId::Xmp, CM_UNKNOWN),
};

static TAG_NAMES: [&str; N_TAGS] = [
    "a", "abbr", "acronym", "address", "applet", "area", "article", "aside", "b", "base",
    "basefont", "bdo", "big", "blockquote", "body", "br", "button", "caption", "center", "cite",
    "code", "col", "colgroup", "dd", "del", "dfn", "dir", "div", "dl", "dt", "em", "embed",
    "fieldset", "font", "footer", "form", "frame", "frameset", "h1", "h2", "h3", "h4", "h5", "h6",
    "head", "header", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd", "label", "legend",
    "li", "link", "main", "map", "marquee", "menu", "meta", "nav", "noframes", "noscript",
    "object", "ol", "optgroup", "option", "p", "param", "pre", "q", "s", "samp", "script",
    "section", "select", "small", "source", "span", "strike", "strong", "style", "sub", "sup",
    "table", "tbody", "td", "textarea", "tfoot", "th", "thead", "title", "tr", "track", "tt", "u",
    "ul", "var", "wbr", "xmp",
];

const MAX_NAME_LEN: usize = 16;

/// Look up a tag definition, folding ASCII case without allocating.
pub fn by_name(name: &[u8]) -> Option<&'static TagDef> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return None;
    }
    let mut folded = [0u8; MAX_NAME_LEN];
    for (dst, src) in folded.iter_mut().zip(name) {
        *dst = src.to_ascii_lowercase();
    }
    let folded = std::str::from_utf8(&folded[..name.len()]).ok()?;
    TAGS_BY_NAME.get(folded)
}

pub fn tag_id_by_name(name: &[u8]) -> Option<TagId> {
    by_name(name).map(|d| d.id)
}

pub fn tag_name_by_id(id: TagId) -> &'static str {
    TAG_NAMES[id as usize]
}

/// A recognized attribute kind. Source spellings collapse onto one kind:
/// `href`, `src` and `action` all carry link targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Name,
    Href,
    Color,
    BgColor,
    Style,
    Class,
    Width,
    Height,
    Size,
    Rel,
    Alt,
}

static COMPONENTS_BY_NAME: phf::Map<&'static str, ComponentKind> = phf_map! {
    "name" => ComponentKind::Name,
    "href" => ComponentKind::Href,
    "src" => ComponentKind::Href,
    "action" => ComponentKind::Href,
    "color" => ComponentKind::Color,
    "bgcolor" => ComponentKind::BgColor,
    "style" => ComponentKind::Style,
    "class" => ComponentKind::Class,
    "width" => ComponentKind::Width,
    "height" => ComponentKind::Height,
    "size" => ComponentKind::Size,
    "rel" => ComponentKind::Rel,
    "alt" => ComponentKind::Alt,
};

/// Look up an attribute kind by its already-lowercased name.
pub(crate) fn component_by_name(name: &[u8]) -> Option<ComponentKind> {
    let name = std::str::from_utf8(name).ok()?;
    COMPONENTS_BY_NAME.get(name).copied()
}
