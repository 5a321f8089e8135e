//! Byte classification helpers shared by the state machines.

/// ASCII whitespace, including vertical tab, as legacy mail HTML uses it.
pub(crate) fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

/// Printable ASCII excluding space.
pub(crate) fn is_graph(b: u8) -> bool {
    (0x21..=0x7e).contains(&b)
}
