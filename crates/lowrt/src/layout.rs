//! Container record layouts, per word width.
//!
//! These offsets are the binary contract with compiler-generated code:
//!
//! | record        | fields (word offsets)                                 |
//! |---------------|-------------------------------------------------------|
//! | array header  | data @0, len @1, cap @2, elem_size @3                 |
//! | text value    | data @0, len @1                                       |
//! | table header  | data @0, len @1, key_kind @2, cap @3                  |
//! | table entry   | key @0..2 (int: word 0; text: data, len), value @2    |

use lowrt_targets::WordWidth;

/// Key kind stored in a table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Int,
    Text,
}

impl KeyKind {
    pub fn as_word(self) -> u64 {
        match self {
            KeyKind::Int => 0,
            KeyKind::Text => 1,
        }
    }

    pub fn from_word(w: u64) -> Option<Self> {
        match w {
            0 => Some(KeyKind::Int),
            1 => Some(KeyKind::Text),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Int => "int",
            KeyKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    width: WordWidth,
}

impl Layout {
    pub const fn new(width: WordWidth) -> Self {
        Layout { width }
    }

    pub fn host() -> Self {
        Layout::new(WordWidth::host())
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    pub fn word(&self) -> u64 {
        self.width.bytes()
    }

    pub fn array_header_size(&self) -> u64 {
        4 * self.word()
    }

    pub fn array_data(&self) -> u64 {
        0
    }

    pub fn array_len(&self) -> u64 {
        self.word()
    }

    pub fn array_cap(&self) -> u64 {
        2 * self.word()
    }

    pub fn array_elem_size(&self) -> u64 {
        3 * self.word()
    }

    pub fn text_size(&self) -> u64 {
        2 * self.word()
    }

    pub fn text_data(&self) -> u64 {
        0
    }

    pub fn text_len(&self) -> u64 {
        self.word()
    }

    pub fn table_header_size(&self) -> u64 {
        self.array_header_size()
    }

    pub fn table_data(&self) -> u64 {
        0
    }

    pub fn table_len(&self) -> u64 {
        self.word()
    }

    /// Occupies the slot an array header uses for capacity.
    pub fn table_key_kind(&self) -> u64 {
        2 * self.word()
    }

    pub fn table_cap(&self) -> u64 {
        3 * self.word()
    }

    pub fn entry_size(&self) -> u64 {
        3 * self.word()
    }

    pub fn entry_key(&self) -> u64 {
        0
    }

    pub fn entry_value(&self) -> u64 {
        2 * self.word()
    }

    /// Element size of a directory-listing array: a text name plus an is-dir word.
    pub fn dir_entry_size(&self) -> u64 {
        self.text_size() + self.word()
    }
}
