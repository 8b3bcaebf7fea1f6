//! Process environment and arguments, normalised from whichever block shape
//! the target hands out.

use once_cell::sync::OnceCell;

use crate::sys::{Native, Platform, RawBlock};

pub type Vars = Vec<(Vec<u8>, Vec<u8>)>;

/// Entries of a raw block, without terminators or empty entries.
fn entries(raw: RawBlock) -> Vec<Vec<u8>> {
    match raw {
        RawBlock::NulSeparated(blob) | RawBlock::DoubleNul(blob) => blob
            .split(|&b| b == 0)
            .filter(|e| !e.is_empty())
            .map(<[u8]>::to_vec)
            .collect(),
        RawBlock::Indexed(items) => items,
    }
}

/// Split `KEY=VALUE` at the first `=` after the first byte, so Windows'
/// per-drive entries (`=C:=C:\dir`) keep their leading `=` in the key.
pub fn split_entry(entry: &[u8]) -> Option<(&[u8], &[u8])> {
    let eq = entry.iter().skip(1).position(|&b| b == b'=')? + 1;
    Some((&entry[..eq], &entry[eq + 1..]))
}

pub fn parse_vars(raw: RawBlock) -> Vars {
    entries(raw)
        .iter()
        .filter_map(|e| split_entry(e))
        .map(|(k, v)| (k.to_vec(), v.to_vec()))
        .collect()
}

/// Argument vector. Unlike the environment, empty arguments are kept.
pub fn parse_args(raw: RawBlock) -> Vec<Vec<u8>> {
    match raw {
        RawBlock::NulSeparated(mut blob) | RawBlock::DoubleNul(mut blob) => {
            if blob.last() == Some(&0) {
                blob.pop();
            }
            if blob.is_empty() {
                return Vec::new();
            }
            blob.split(|&b| b == 0).map(<[u8]>::to_vec).collect()
        }
        RawBlock::Indexed(items) => items,
    }
}

pub fn lookup<'a>(vars: &'a Vars, key: &[u8]) -> Option<&'a [u8]> {
    vars.iter()
        .find(|(k, _)| k.as_slice() == key)
        .map(|(_, v)| v.as_slice())
}

/// Current environment of `platform`, read fresh. A failed read is empty.
pub fn read_vars<P: Platform>(platform: &P) -> Vars {
    platform.environ().map(parse_vars).unwrap_or_default()
}

pub fn read_args<P: Platform>(platform: &P) -> Vec<Vec<u8>> {
    platform.argv().map(parse_args).unwrap_or_default()
}

static VARS: OnceCell<Vars> = OnceCell::new();
static ARGS: OnceCell<Vec<Vec<u8>>> = OnceCell::new();

/// Process environment, read once.
pub fn vars() -> &'static Vars {
    VARS.get_or_init(|| read_vars(&Native))
}

pub fn var(key: &[u8]) -> Option<&'static [u8]> {
    lookup(vars(), key)
}

/// Process arguments, read once. Element 0 is the program.
pub fn args() -> &'static [Vec<u8>] {
    ARGS.get_or_init(|| read_args(&Native))
}
