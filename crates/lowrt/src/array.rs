//! Dynamic arrays: a four-word header `{data, len, cap, elem_size}` over a
//! separately allocated data region.
//!
//! A null header reads as an empty array. Growth never frees: the old data
//! region stays where it was, so views taken before a grow still read the
//! old storage.

use crate::mem::{copy, Addr, Fault, Memory, NULL};

/// Capacity of the first data region a push or append creates.
pub const INITIAL_CAPACITY: u64 = 8;

/// Read-only snapshot of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayHeader {
    pub data: Addr,
    pub len: u64,
    pub cap: u64,
    pub elem_size: u64,
}

pub fn header<M: Memory + ?Sized>(m: &M, hdr: Addr) -> ArrayHeader {
    if hdr == NULL {
        return ArrayHeader::default();
    }
    let l = m.layout();
    ArrayHeader {
        data: m.read_word(hdr + l.array_data()),
        len: m.read_word(hdr + l.array_len()),
        cap: m.read_word(hdr + l.array_cap()),
        elem_size: m.read_word(hdr + l.array_elem_size()),
    }
}

fn write_header<M: Memory + ?Sized>(m: &mut M, hdr: Addr, h: ArrayHeader) {
    let l = m.layout();
    m.write_word(hdr + l.array_data(), h.data);
    m.write_word(hdr + l.array_len(), h.len);
    m.write_word(hdr + l.array_cap(), h.cap);
    m.write_word(hdr + l.array_elem_size(), h.elem_size);
}

pub fn array_data<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Addr {
    header(m, hdr).data
}

pub fn array_len<M: Memory + ?Sized>(m: &M, hdr: Addr) -> u64 {
    header(m, hdr).len
}

pub fn array_cap<M: Memory + ?Sized>(m: &M, hdr: Addr) -> u64 {
    header(m, hdr).cap
}

pub fn array_elem_size<M: Memory + ?Sized>(m: &M, hdr: Addr) -> u64 {
    header(m, hdr).elem_size
}

/// New array of `len` zeroed elements; capacity equals `len`.
pub fn array_new<M: Memory + ?Sized>(m: &mut M, len: u64, elem_size: u64) -> Result<Addr, Fault> {
    if elem_size == 0 {
        return Err(Fault::ElemSize {
            header: 0,
            given: elem_size,
        });
    }
    let hdr = m.alloc(m.layout().array_header_size());
    let data = if len == 0 {
        NULL
    } else {
        m.alloc(len * elem_size)
    };
    write_header(
        m,
        hdr,
        ArrayHeader {
            data,
            len,
            cap: len,
            elem_size,
        },
    );
    Ok(hdr)
}

/// New array holding `bytes` as `bytes.len() / elem_size` elements.
pub fn array_from_bytes<M: Memory + ?Sized>(
    m: &mut M,
    bytes: &[u8],
    elem_size: u64,
) -> Result<Addr, Fault> {
    if elem_size == 0 || bytes.len() as u64 % elem_size != 0 {
        return Err(Fault::ElemSize {
            header: elem_size,
            given: bytes.len() as u64,
        });
    }
    let hdr = array_new(m, bytes.len() as u64 / elem_size, elem_size)?;
    if !bytes.is_empty() {
        let data = array_data(m, hdr);
        m.store(data, bytes);
    }
    Ok(hdr)
}

/// Move `h` into a data region of `new_cap` elements, copying the live prefix.
fn regrow<M: Memory + ?Sized>(m: &mut M, h: &mut ArrayHeader, new_cap: u64) -> Result<(), Fault> {
    let data = m.alloc(new_cap * h.elem_size);
    copy(m, data, h.data, h.len * h.elem_size)?;
    h.data = data;
    h.cap = new_cap;
    Ok(())
}

fn check_elem_size(h: &ArrayHeader, given: u64) -> Result<(), Fault> {
    if h.elem_size != given {
        return Err(Fault::ElemSize {
            header: h.elem_size,
            given,
        });
    }
    Ok(())
}

/// Append one element; returns the header, newly created when `hdr` is null.
pub fn array_push<M: Memory + ?Sized>(m: &mut M, hdr: Addr, elem: &[u8]) -> Result<Addr, Fault> {
    let es = elem.len() as u64;
    let (hdr, mut h) = if hdr == NULL {
        let hdr = array_new(m, 0, es)?;
        (hdr, header(m, hdr))
    } else {
        (hdr, header(m, hdr))
    };
    check_elem_size(&h, es)?;
    if h.len == h.cap {
        let new_cap = (h.cap * 2).max(INITIAL_CAPACITY);
        regrow(m, &mut h, new_cap)?;
    }
    m.store(h.data + h.len * es, elem);
    h.len += 1;
    write_header(m, hdr, h);
    Ok(hdr)
}

/// Append every element of `src`; returns the header, newly created when
/// `hdr` is null. Growth goes straight to the needed capacity when doubling
/// would not reach it.
pub fn array_append<M: Memory + ?Sized>(m: &mut M, hdr: Addr, src: Addr) -> Result<Addr, Fault> {
    let s = header(m, src);
    if s.len == 0 && hdr != NULL {
        return Ok(hdr);
    }
    let (hdr, mut h) = if hdr == NULL {
        let hdr = array_new(m, 0, s.elem_size.max(1))?;
        (hdr, header(m, hdr))
    } else {
        (hdr, header(m, hdr))
    };
    if s.len == 0 {
        return Ok(hdr);
    }
    check_elem_size(&h, s.elem_size)?;
    let need = h.len + s.len;
    if need > h.cap {
        let doubled = h.cap * 2;
        let new_cap = if doubled >= need { doubled } else { need }.max(INITIAL_CAPACITY);
        regrow(m, &mut h, new_cap)?;
    }
    copy(m, h.data + h.len * h.elem_size, s.data, s.len * s.elem_size)?;
    h.len = need;
    write_header(m, hdr, h);
    Ok(hdr)
}

/// View of elements `low..high` sharing `hdr`'s storage.
pub fn array_slice<M: Memory + ?Sized>(
    m: &mut M,
    hdr: Addr,
    low: u64,
    high: u64,
) -> Result<Addr, Fault> {
    let h = header(m, hdr);
    if high > h.len {
        return Err(Fault::OutOfRange {
            index: high,
            len: h.len,
        });
    }
    if low > high {
        return Err(Fault::OutOfRange {
            index: low,
            len: high,
        });
    }
    let view = m.alloc(m.layout().array_header_size());
    let data = if h.data == NULL {
        NULL
    } else {
        h.data + low * h.elem_size
    };
    write_header(
        m,
        view,
        ArrayHeader {
            data,
            len: high - low,
            cap: h.cap - low,
            elem_size: h.elem_size,
        },
    );
    Ok(view)
}

/// Copy `min(dst.len, src.len)` elements from `src` into `dst`; returns the count.
pub fn array_copy<M: Memory + ?Sized>(m: &mut M, dst: Addr, src: Addr) -> Result<u64, Fault> {
    let d = header(m, dst);
    let s = header(m, src);
    let n = d.len.min(s.len);
    if n == 0 {
        return Ok(0);
    }
    check_elem_size(&d, s.elem_size)?;
    copy(m, d.data, s.data, n * d.elem_size)?;
    Ok(n)
}

pub fn element_addr<M: Memory + ?Sized>(m: &M, hdr: Addr, index: u64) -> Result<Addr, Fault> {
    let h = header(m, hdr);
    if index >= h.len {
        return Err(Fault::OutOfRange { index, len: h.len });
    }
    Ok(h.data + index * h.elem_size)
}

pub fn read_element<M: Memory + ?Sized>(m: &M, hdr: Addr, index: u64) -> Result<Vec<u8>, Fault> {
    let at = element_addr(m, hdr, index)?;
    Ok(m.read_vec(at, array_elem_size(m, hdr)))
}

/// The whole live contents as one byte vector.
pub fn array_bytes<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Vec<u8> {
    let h = header(m, hdr);
    if h.data == NULL {
        return Vec::new();
    }
    m.read_vec(h.data, h.len * h.elem_size)
}
