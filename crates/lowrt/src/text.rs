//! Text values: an immutable `{data, len}` pair over arena storage or a
//! static literal.

use crate::mem::{copy, Addr, Fault, Memory, NULL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Text {
    pub data: Addr,
    pub len: u64,
}

impl Text {
    pub const EMPTY: Text = Text { data: NULL, len: 0 };

    /// Wrap storage the caller already owns, such as an embedded literal.
    pub const fn from_raw(data: Addr, len: u64) -> Self {
        Text { data, len }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Copy `bytes` into fresh storage.
pub fn text_new<M: Memory + ?Sized>(m: &mut M, bytes: &[u8]) -> Text {
    if bytes.is_empty() {
        return Text::EMPTY;
    }
    let data = m.alloc(bytes.len() as u64);
    m.store(data, bytes);
    Text {
        data,
        len: bytes.len() as u64,
    }
}

pub fn text_bytes<M: Memory + ?Sized>(m: &M, t: Text) -> Result<Vec<u8>, Fault> {
    if t.len == 0 {
        return Ok(Vec::new());
    }
    if t.data == NULL {
        return Err(Fault::Null { len: t.len });
    }
    Ok(m.read_vec(t.data, t.len))
}

/// Length first, then bytes.
pub fn text_eq<M: Memory + ?Sized>(m: &M, a: Text, b: Text) -> Result<bool, Fault> {
    if a.len != b.len {
        return Ok(false);
    }
    if a.data == b.data {
        return Ok(true);
    }
    Ok(text_bytes(m, a)? == text_bytes(m, b)?)
}

pub fn text_concat<M: Memory + ?Sized>(m: &mut M, a: Text, b: Text) -> Result<Text, Fault> {
    if b.is_empty() {
        return Ok(a);
    }
    if a.is_empty() {
        return Ok(b);
    }
    let data = m.alloc(a.len + b.len);
    copy(m, data, a.data, a.len)?;
    copy(m, data + a.len, b.data, b.len)?;
    Ok(Text {
        data,
        len: a.len + b.len,
    })
}

/// Read an inline `{data, len}` pair stored at `addr`.
pub fn text_load<M: Memory + ?Sized>(m: &M, addr: Addr) -> Text {
    let l = m.layout();
    Text {
        data: m.read_word(addr + l.text_data()),
        len: m.read_word(addr + l.text_len()),
    }
}

pub fn text_store<M: Memory + ?Sized>(m: &mut M, addr: Addr, t: Text) {
    let l = m.layout();
    m.write_word(addr + l.text_data(), t.data);
    m.write_word(addr + l.text_len(), t.len);
}
