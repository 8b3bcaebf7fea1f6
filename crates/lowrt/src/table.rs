//! Associative tables: linear scan over a flat entry array, swap-delete.
//!
//! Header `{data, len, key_kind, cap}`; each entry is a two-word key slot
//! followed by a one-word value. Integer keys use the first key word and
//! compare as raw words; text keys store `{data, len}` and compare by length
//! then bytes. Integer keys and values must fit in one target word: storing
//! a wider one is a fault, and looking one up finds nothing.

use crate::layout::KeyKind;
use crate::mem::{copy, fit_word, Addr, Fault, Memory, NULL};
use crate::text::{text_eq, Text};

const INITIAL_CAPACITY: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Int(u64),
    Text(Text),
}

impl Key {
    pub fn kind(&self) -> KeyKind {
        match self {
            Key::Int(_) => KeyKind::Int,
            Key::Text(_) => KeyKind::Text,
        }
    }

    /// Key from the two words of an entry key slot.
    pub fn from_words(kind: KeyKind, w0: u64, w1: u64) -> Self {
        match kind {
            KeyKind::Int => Key::Int(w0),
            KeyKind::Text => Key::Text(Text::from_raw(w0, w1)),
        }
    }

    fn words(&self) -> (u64, u64) {
        match *self {
            Key::Int(v) => (v, 0),
            Key::Text(t) => (t.data, t.len),
        }
    }
}

struct Header {
    data: Addr,
    len: u64,
    kind: KeyKind,
    cap: u64,
}

fn read_header<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Header {
    let l = m.layout();
    Header {
        data: m.read_word(hdr + l.table_data()),
        len: m.read_word(hdr + l.table_len()),
        kind: KeyKind::from_word(m.read_word(hdr + l.table_key_kind())).unwrap_or(KeyKind::Int),
        cap: m.read_word(hdr + l.table_cap()),
    }
}

fn write_header<M: Memory + ?Sized>(m: &mut M, hdr: Addr, h: &Header) {
    let l = m.layout();
    m.write_word(hdr + l.table_data(), h.data);
    m.write_word(hdr + l.table_len(), h.len);
    m.write_word(hdr + l.table_key_kind(), h.kind.as_word());
    m.write_word(hdr + l.table_cap(), h.cap);
}

fn entry<M: Memory + ?Sized>(m: &M, h: &Header, i: u64) -> Addr {
    h.data + i * m.layout().entry_size()
}

fn entry_key<M: Memory + ?Sized>(m: &M, h: &Header, at: Addr) -> Key {
    let w = m.word();
    Key::from_words(h.kind, m.read_word(at), m.read_word(at + w))
}

fn check_kind(h: &Header, key: &Key) -> Result<(), Fault> {
    if h.kind != key.kind() {
        return Err(Fault::KeyKind {
            table: h.kind,
            given: key.kind(),
        });
    }
    Ok(())
}

fn keys_equal<M: Memory + ?Sized>(m: &M, a: &Key, b: &Key) -> Result<bool, Fault> {
    match (a, b) {
        (Key::Int(x), Key::Int(y)) => Ok(x == y),
        (Key::Text(x), Key::Text(y)) => text_eq(m, *x, *y),
        _ => Ok(false),
    }
}

/// Index of `key` among the live entries.
fn find<M: Memory + ?Sized>(m: &M, h: &Header, key: &Key) -> Result<Option<u64>, Fault> {
    if let Key::Int(v) = *key {
        if fit_word(m.width(), v).is_err() {
            return Ok(None);
        }
    }
    for i in 0..h.len {
        let k = entry_key(m, h, entry(m, h, i));
        if keys_equal(m, &k, key)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

pub fn table_new<M: Memory + ?Sized>(m: &mut M, kind: KeyKind) -> Addr {
    let hdr = m.alloc(m.layout().table_header_size());
    write_header(
        m,
        hdr,
        &Header {
            data: NULL,
            len: 0,
            kind,
            cap: 0,
        },
    );
    hdr
}

pub fn table_len<M: Memory + ?Sized>(m: &M, hdr: Addr) -> u64 {
    if hdr == NULL {
        return 0;
    }
    read_header(m, hdr).len
}

pub fn table_key_kind<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Option<KeyKind> {
    if hdr == NULL {
        return None;
    }
    Some(read_header(m, hdr).kind)
}

/// Value stored under `key`. A null table is empty.
pub fn table_get<M: Memory + ?Sized>(m: &M, hdr: Addr, key: Key) -> Result<Option<u64>, Fault> {
    if hdr == NULL {
        return Ok(None);
    }
    let h = read_header(m, hdr);
    check_kind(&h, &key)?;
    let value = m.layout().entry_value();
    Ok(find(m, &h, &key)?.map(|i| m.read_word(entry(m, &h, i) + value)))
}

/// Insert or overwrite; returns the header, newly created when `hdr` is null.
pub fn table_set<M: Memory + ?Sized>(
    m: &mut M,
    hdr: Addr,
    key: Key,
    value: u64,
) -> Result<Addr, Fault> {
    if let Key::Int(v) = key {
        fit_word(m.width(), v)?;
    }
    let value = fit_word(m.width(), value)?;
    let hdr = if hdr == NULL {
        table_new(m, key.kind())
    } else {
        hdr
    };
    let mut h = read_header(m, hdr);
    check_kind(&h, &key)?;
    let l = m.layout();
    if let Some(i) = find(m, &h, &key)? {
        let at = entry(m, &h, i);
        m.write_word(at + l.entry_value(), value);
        return Ok(hdr);
    }
    if h.len == h.cap {
        let new_cap = (h.cap * 2).max(INITIAL_CAPACITY);
        let data = m.alloc(new_cap * l.entry_size());
        copy(m, data, h.data, h.len * l.entry_size())?;
        h.data = data;
        h.cap = new_cap;
    }
    let at = entry(m, &h, h.len);
    let (w0, w1) = key.words();
    m.write_word(at + l.entry_key(), w0);
    m.write_word(at + l.entry_key() + l.word(), w1);
    m.write_word(at + l.entry_value(), value);
    h.len += 1;
    write_header(m, hdr, &h);
    Ok(hdr)
}

/// Remove `key` by moving the last entry into its slot. Returns whether an
/// entry was removed.
pub fn table_delete<M: Memory + ?Sized>(m: &mut M, hdr: Addr, key: Key) -> Result<bool, Fault> {
    if hdr == NULL {
        return Ok(false);
    }
    let mut h = read_header(m, hdr);
    check_kind(&h, &key)?;
    let Some(i) = find(m, &h, &key)? else {
        return Ok(false);
    };
    let last = h.len - 1;
    if i != last {
        let size = m.layout().entry_size();
        let (hole, tail) = (entry(m, &h, i), entry(m, &h, last));
        copy(m, hole, tail, size)?;
    }
    h.len = last;
    write_header(m, hdr, &h);
    Ok(true)
}

/// Live entries in storage order.
pub fn table_entries<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Vec<(Key, u64)> {
    if hdr == NULL {
        return Vec::new();
    }
    let h = read_header(m, hdr);
    let value = m.layout().entry_value();
    (0..h.len)
        .map(|i| {
            let at = entry(m, &h, i);
            (entry_key(m, &h, at), m.read_word(at + value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageMemory;
    use crate::text::text_new;
    use lowrt_targets::WordWidth;

    #[test]
    fn set_get_overwrite_delete() {
        let mut m = ImageMemory::new(WordWidth::W32);
        let t = table_set(&mut m, NULL, Key::Int(10), 100).expect("set");
        assert_eq!(table_get(&m, t, Key::Int(10)), Ok(Some(100)));

        table_set(&mut m, t, Key::Int(10), 101).expect("overwrite");
        assert_eq!(table_len(&m, t), 1);
        assert_eq!(table_get(&m, t, Key::Int(10)), Ok(Some(101)));

        assert_eq!(table_delete(&mut m, t, Key::Int(10)), Ok(true));
        assert_eq!(table_len(&m, t), 0);
        assert_eq!(table_get(&m, t, Key::Int(10)), Ok(None));
        assert_eq!(table_delete(&mut m, t, Key::Int(10)), Ok(false));
        assert_eq!(table_len(&m, t), 0);
    }

    #[test]
    fn delete_moves_the_last_entry_into_the_hole() {
        let mut m = ImageMemory::new(WordWidth::W64);
        let mut t = table_new(&mut m, KeyKind::Int);
        for k in 0..4 {
            t = table_set(&mut m, t, Key::Int(k), k * 10).expect("set");
        }
        table_delete(&mut m, t, Key::Int(1)).expect("delete");
        let order: Vec<_> = table_entries(&m, t).into_iter().map(|(_, v)| v).collect();
        assert_eq!(order, vec![0, 30, 20]);
    }

    #[test]
    fn text_keys_match_by_content() {
        let mut m = ImageMemory::new(WordWidth::W16);
        let k1 = text_new(&mut m, b"alpha");
        let k1_again = text_new(&mut m, b"alpha");
        let k2 = text_new(&mut m, b"alphb");
        let t = table_set(&mut m, NULL, Key::Text(k1), 1).expect("set");
        let t = table_set(&mut m, t, Key::Text(k2), 2).expect("set");
        assert_eq!(table_get(&m, t, Key::Text(k1_again)), Ok(Some(1)));
        assert_eq!(table_key_kind(&m, t), Some(KeyKind::Text));
        assert_eq!(
            table_get(&m, t, Key::Int(1)),
            Err(Fault::KeyKind {
                table: KeyKind::Text,
                given: KeyKind::Int
            })
        );
    }

    #[test]
    fn entry_array_grows_past_eight() {
        let mut m = ImageMemory::new(WordWidth::W32);
        let mut t = NULL;
        for k in 0..20 {
            t = table_set(&mut m, t, Key::Int(k), k + 1).expect("set");
        }
        assert_eq!(table_len(&m, t), 20);
        let cap = m.read_word(t + m.layout().table_cap());
        assert_eq!(cap, 32);
        for k in 0..20 {
            assert_eq!(table_get(&m, t, Key::Int(k)), Ok(Some(k + 1)));
        }
    }

    #[test]
    fn integer_keys_wider_than_the_word_are_rejected() {
        let mut m = ImageMemory::new(WordWidth::W16);
        let t = table_set(&mut m, NULL, Key::Int(4464), 7).expect("set");
        assert_eq!(
            table_set(&mut m, t, Key::Int(70_000), 1),
            Err(Fault::WordOverflow {
                value: 70_000,
                bytes: 2
            })
        );
        assert_eq!(table_len(&m, t), 1);
        // 70_000 truncates to 4464; it must not alias the stored key.
        assert_eq!(table_get(&m, t, Key::Int(70_000)), Ok(None));
        assert_eq!(table_delete(&mut m, t, Key::Int(70_000)), Ok(false));
        assert_eq!(table_get(&m, t, Key::Int(4464)), Ok(Some(7)));

        let t = table_set(&mut m, t, Key::Int(0xffff), 0xffff).expect("max word");
        assert_eq!(table_get(&m, t, Key::Int(0xffff)), Ok(Some(0xffff)));
        assert_eq!(
            table_set(&mut m, t, Key::Int(1), 0x1_0000),
            Err(Fault::WordOverflow {
                value: 0x1_0000,
                bytes: 2
            })
        );
        assert_eq!(table_len(&m, t), 2);
    }

    #[test]
    fn thirty_two_bit_keys_keep_their_identity() {
        let mut m = ImageMemory::new(WordWidth::W32);
        let mut t = NULL;
        for k in [70_000u64, 0xffff_ffff, 1] {
            t = table_set(&mut m, t, Key::Int(k), k / 2).expect("set");
            t = table_set(&mut m, t, Key::Int(k), k / 2).expect("set again");
        }
        assert_eq!(table_len(&m, t), 3);
        assert_eq!(table_get(&m, t, Key::Int(70_000)), Ok(Some(35_000)));
        assert!(table_set(&mut m, t, Key::Int(1 << 32), 0).is_err());
        assert_eq!(table_get(&m, t, Key::Int(1 << 32)), Ok(None));
    }
}
