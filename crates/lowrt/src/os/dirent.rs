//! Parsers for the raw records a directory-read call leaves in its buffer.

use lowrt_targets::DirentFormat;

use crate::sys::{le_u16, le_u32};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Dir,
    File,
    /// The record does not say; resolve with a stat.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEntry<'a> {
    pub name: &'a [u8],
    pub kind: EntryType,
}

const LINUX_RECLEN: usize = 16;
const LINUX_TYPE: usize = 18;
const LINUX_NAME: usize = 19;
const DT_UNKNOWN: u8 = 0;
const DT_DIR: u8 = 4;
const DT_LNK: u8 = 10;

const WASI_HEADER: usize = 24;
const WASI_NAMLEN: usize = 16;
const WASI_TYPE: usize = 20;
const WASI_UNKNOWN: u8 = 0;
const WASI_DIRECTORY: u8 = 3;
const WASI_SYMLINK: u8 = 7;

const FIND_DATA_LEN: usize = 320;
const FIND_NAME: usize = 44;
const FIND_NAME_MAX: usize = 260;
const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;

fn until_nul(b: &[u8]) -> &[u8] {
    match b.iter().position(|&c| c == 0) {
        Some(n) => &b[..n],
        None => b,
    }
}

/// Every whole record in `buf`, in order. A malformed tail ends the walk.
pub fn parse(format: DirentFormat, buf: &[u8]) -> Vec<RawEntry<'_>> {
    match format {
        DirentFormat::LinuxDirent64 => parse_linux(buf),
        DirentFormat::WasiDirent => parse_wasi(buf),
        DirentFormat::Win32FindDataA => parse_find_data(buf),
    }
}

fn parse_linux(buf: &[u8]) -> Vec<RawEntry<'_>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + LINUX_NAME <= buf.len() {
        let Some(reclen) = le_u16(buf, off + LINUX_RECLEN) else {
            break;
        };
        let reclen = reclen as usize;
        if reclen < LINUX_NAME || off + reclen > buf.len() {
            break;
        }
        let kind = match buf[off + LINUX_TYPE] {
            DT_DIR => EntryType::Dir,
            DT_UNKNOWN | DT_LNK => EntryType::Unknown,
            _ => EntryType::File,
        };
        out.push(RawEntry {
            name: until_nul(&buf[off + LINUX_NAME..off + reclen]),
            kind,
        });
        off += reclen;
    }
    out
}

fn parse_wasi(buf: &[u8]) -> Vec<RawEntry<'_>> {
    let mut out = Vec::new();
    let mut off = 0usize;
    while off + WASI_HEADER <= buf.len() {
        let Some(namlen) = le_u32(buf, off + WASI_NAMLEN) else {
            break;
        };
        let start = off + WASI_HEADER;
        let end = start + namlen as usize;
        if end > buf.len() {
            break;
        }
        let kind = match buf[off + WASI_TYPE] {
            WASI_DIRECTORY => EntryType::Dir,
            WASI_UNKNOWN | WASI_SYMLINK => EntryType::Unknown,
            _ => EntryType::File,
        };
        out.push(RawEntry {
            name: &buf[start..end],
            kind,
        });
        off = end;
    }
    out
}

fn parse_find_data(buf: &[u8]) -> Vec<RawEntry<'_>> {
    buf.chunks_exact(FIND_DATA_LEN)
        .map(|rec| {
            let attrs = le_u32(rec, 0).unwrap_or(0);
            RawEntry {
                name: until_nul(&rec[FIND_NAME..FIND_NAME + FIND_NAME_MAX]),
                kind: if attrs & FILE_ATTRIBUTE_DIRECTORY != 0 {
                    EntryType::Dir
                } else {
                    EntryType::File
                },
            }
        })
        .collect()
}

/// Record encoders, shared by the in-memory platform and the parser tests.
#[cfg(test)]
pub(crate) mod encode {
    pub fn linux(name: &[u8], d_type: u8) -> Vec<u8> {
        let reclen = (super::LINUX_NAME + name.len() + 1 + 7) & !7;
        let mut r = vec![0u8; reclen];
        r[16..18].copy_from_slice(&(reclen as u16).to_le_bytes());
        r[18] = d_type;
        r[19..19 + name.len()].copy_from_slice(name);
        r
    }

    pub fn wasi(next: u64, name: &[u8], filetype: u8) -> Vec<u8> {
        let mut r = vec![0u8; super::WASI_HEADER];
        r[0..8].copy_from_slice(&next.to_le_bytes());
        r[16..20].copy_from_slice(&(name.len() as u32).to_le_bytes());
        r[20] = filetype;
        r.extend_from_slice(name);
        r
    }

    pub fn find_data(name: &[u8], attrs: u32) -> Vec<u8> {
        let mut r = vec![0u8; super::FIND_DATA_LEN];
        r[0..4].copy_from_slice(&attrs.to_le_bytes());
        r[44..44 + name.len()].copy_from_slice(name);
        r
    }
}
