//! In-memory platform for driving the OS layer through error paths a real
//! kernel will not produce on demand.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use lowrt_targets::DirentFormat;

use super::dirent::encode;
use crate::error::ErrorKind;
use crate::sys::{DirStream, Handle, OpenMode, Platform, RawBlock, Stat, SysRet};

const ENOENT: i32 = 2;
const EINTR: i32 = 4;
const EBADF: i32 = 9;
const EACCES: i32 = 13;
const EEXIST: i32 = 17;
const EISDIR: i32 = 21;
const EINVAL: i32 = 22;
const ENOSYS: i32 = 38;
const ENOTEMPTY: i32 = 39;

const DT_DIR: u8 = 4;
const DT_REG: u8 = 8;
const DT_UNKNOWN: u8 = 0;

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug)]
enum Open {
    File { path: Vec<u8>, pos: usize, writable: bool },
    Dir { records: Vec<Vec<u8>>, next: usize },
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<Vec<u8>, Node>,
    open: HashMap<Handle, Open>,
    next_handle: Handle,
    write_calls: usize,
    dir_reads: usize,
    mkdir_paths: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
pub(crate) struct MemFs {
    state: RefCell<State>,
    write_limit: Option<usize>,
    unknown_types: bool,
    fail_dir_open: Option<i32>,
    fail_dir_read: Option<i32>,
    interrupted_reads: Cell<usize>,
}

/// `/a//b/`, `a/b` and `\\a\b` all become `/a/b`.
fn normalize(path: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len() + 1);
    for part in path
        .split(|&b| b == b'/' || b == b'\\')
        .filter(|p| !p.is_empty())
    {
        out.push(b'/');
        out.extend_from_slice(part);
    }
    if out.is_empty() {
        out.push(b'/');
    }
    out
}

fn parent(norm: &[u8]) -> Vec<u8> {
    match norm.iter().rposition(|&b| b == b'/') {
        Some(0) | None => b"/".to_vec(),
        Some(i) => norm[..i].to_vec(),
    }
}

fn base_name(norm: &[u8]) -> &[u8] {
    match norm.iter().rposition(|&b| b == b'/') {
        Some(i) => &norm[i + 1..],
        None => norm,
    }
}

impl MemFs {
    pub const ENOTDIR: i32 = 20;

    pub fn new() -> Self {
        let fs = MemFs::default();
        fs.state.borrow_mut().nodes.insert(b"/".to_vec(), Node::Dir);
        fs.state.borrow_mut().next_handle = 3;
        fs
    }

    fn insert_parents(&self, norm: &[u8]) {
        let mut st = self.state.borrow_mut();
        let mut p = parent(norm);
        while p != b"/" {
            st.nodes.entry(p.clone()).or_insert(Node::Dir);
            p = parent(&p);
        }
    }

    pub fn with_file(self, path: &[u8], contents: &[u8]) -> Self {
        let norm = normalize(path);
        self.insert_parents(&norm);
        self.state
            .borrow_mut()
            .nodes
            .insert(norm, Node::File(contents.to_vec()));
        self
    }

    pub fn with_dir(self, path: &[u8]) -> Self {
        let norm = normalize(path);
        self.insert_parents(&norm);
        self.state.borrow_mut().nodes.insert(norm, Node::Dir);
        self
    }

    /// Each write call accepts at most `n` bytes.
    pub fn with_write_limit(mut self, n: usize) -> Self {
        self.write_limit = Some(n);
        self
    }

    /// Directory records carry the "unknown" type code.
    pub fn with_unknown_types(mut self) -> Self {
        self.unknown_types = true;
        self
    }

    pub fn with_failing_dir_open(mut self, code: i32) -> Self {
        self.fail_dir_open = Some(code);
        self
    }

    /// The next `n` file reads fail as interrupted before any progress.
    pub fn with_interrupted_reads(self, n: usize) -> Self {
        self.interrupted_reads.set(n);
        self
    }

    pub fn with_failing_dir_read(mut self, code: i32) -> Self {
        self.fail_dir_read = Some(code);
        self
    }

    pub fn contents(&self, path: &[u8]) -> Option<Vec<u8>> {
        match self.state.borrow().nodes.get(&normalize(path)) {
            Some(Node::File(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &[u8]) -> bool {
        matches!(self.state.borrow().nodes.get(&normalize(path)), Some(Node::Dir))
    }

    pub fn paths(&self) -> Vec<Vec<u8>> {
        self.state.borrow().nodes.keys().cloned().collect()
    }

    pub fn write_calls(&self) -> usize {
        self.state.borrow().write_calls
    }

    /// Every path passed to `mkdir`, as given.
    pub fn mkdir_paths(&self) -> Vec<Vec<u8>> {
        self.state.borrow().mkdir_paths.clone()
    }

    pub fn dir_reads(&self) -> usize {
        self.state.borrow().dir_reads
    }

    pub fn open_dirs(&self) -> usize {
        self.state
            .borrow()
            .open
            .values()
            .filter(|o| matches!(o, Open::Dir { .. }))
            .count()
    }

    /// `Ok(())` when the parent of `norm` is an existing directory.
    fn parent_ok(st: &State, norm: &[u8]) -> Result<(), i32> {
        match st.nodes.get(&parent(norm)) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(Self::ENOTDIR),
            None => Err(ENOENT),
        }
    }

    fn children(st: &State, dir: &[u8]) -> Vec<(Vec<u8>, bool)> {
        st.nodes
            .iter()
            .filter(|(k, _)| k.as_slice() != b"/" && parent(k) == dir)
            .map(|(k, n)| (base_name(k).to_vec(), matches!(n, Node::Dir)))
            .collect()
    }

    fn add_handle(st: &mut State, open: Open) -> SysRet {
        let h = st.next_handle;
        st.next_handle += 1;
        st.open.insert(h, open);
        SysRet::ok(h as usize)
    }
}

impl Platform for MemFs {
    const DIRENT: DirentFormat = DirentFormat::LinuxDirent64;
    const STAT_LEN: usize = 16;

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        let pending = self.interrupted_reads.get();
        if pending > 0 {
            self.interrupted_reads.set(pending - 1);
            return SysRet::err(EINTR);
        }
        let mut st = self.state.borrow_mut();
        let State { nodes, open, .. } = &mut *st;
        let Some(Open::File { path, pos, .. }) = open.get_mut(&h) else {
            return SysRet::err(EBADF);
        };
        let Some(Node::File(c)) = nodes.get(path.as_slice()) else {
            return SysRet::err(ENOENT);
        };
        let n = buf.len().min(c.len().saturating_sub(*pos));
        buf[..n].copy_from_slice(&c[*pos..*pos + n]);
        *pos += n;
        SysRet::ok(n)
    }

    fn write(&self, h: Handle, buf: &[u8]) -> SysRet {
        let mut st = self.state.borrow_mut();
        st.write_calls += 1;
        let State { nodes, open, .. } = &mut *st;
        let Some(Open::File {
            path,
            pos,
            writable: true,
        }) = open.get_mut(&h)
        else {
            return SysRet::err(EBADF);
        };
        let Some(Node::File(c)) = nodes.get_mut(path.as_slice()) else {
            return SysRet::err(ENOENT);
        };
        let n = self.write_limit.map_or(buf.len(), |l| l.min(buf.len()));
        let end = *pos + n;
        if c.len() < end {
            c.resize(end, 0);
        }
        c[*pos..end].copy_from_slice(&buf[..n]);
        *pos = end;
        SysRet::ok(n)
    }

    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet {
        let norm = normalize(path);
        let mut st = self.state.borrow_mut();
        let pos = match (st.nodes.get(&norm), mode) {
            (Some(Node::Dir), _) => return SysRet::err(EISDIR),
            (Some(Node::File(_)), OpenMode::Read) => 0,
            (None, OpenMode::Read) => return SysRet::err(ENOENT),
            (Some(Node::File(c)), OpenMode::Append) => c.len(),
            (_, OpenMode::Write | OpenMode::Append) => {
                if let Err(e) = Self::parent_ok(&st, &norm) {
                    return SysRet::err(e);
                }
                st.nodes.insert(norm.clone(), Node::File(Vec::new()));
                0
            }
        };
        Self::add_handle(
            &mut st,
            Open::File {
                path: norm,
                pos,
                writable: mode != OpenMode::Read,
            },
        )
    }

    fn close(&self, h: Handle) -> SysRet {
        match self.state.borrow_mut().open.remove(&h) {
            Some(_) => SysRet::ok(0),
            None => SysRet::err(EBADF),
        }
    }

    fn stat(&self, path: &[u8], raw: &mut [u8]) -> SysRet {
        let st = self.state.borrow();
        let (size, is_dir) = match st.nodes.get(&normalize(path)) {
            Some(Node::Dir) => (0u64, 1u8),
            Some(Node::File(c)) => (c.len() as u64, 0u8),
            None => return SysRet::err(ENOENT),
        };
        raw[..8].copy_from_slice(&size.to_le_bytes());
        raw[8] = is_dir;
        SysRet::ok(Self::STAT_LEN)
    }

    fn decode_stat(raw: &[u8]) -> Stat {
        let is_dir = raw.get(8) == Some(&1);
        Stat {
            size: crate::sys::le_u64(raw, 0).unwrap_or(0),
            mode: if is_dir { 0o040755 } else { 0o100644 },
            is_dir,
            mtime: 0,
        }
    }

    fn mkdir(&self, path: &[u8]) -> SysRet {
        let norm = normalize(path);
        let mut st = self.state.borrow_mut();
        st.mkdir_paths.push(path.to_vec());
        if st.nodes.contains_key(&norm) {
            return SysRet::err(EEXIST);
        }
        if let Err(e) = Self::parent_ok(&st, &norm) {
            return SysRet::err(e);
        }
        st.nodes.insert(norm, Node::Dir);
        SysRet::ok(0)
    }

    fn rmdir(&self, path: &[u8]) -> SysRet {
        let norm = normalize(path);
        let mut st = self.state.borrow_mut();
        match st.nodes.get(&norm) {
            None => return SysRet::err(ENOENT),
            Some(Node::File(_)) => return SysRet::err(Self::ENOTDIR),
            Some(Node::Dir) => {}
        }
        if !Self::children(&st, &norm).is_empty() {
            return SysRet::err(ENOTEMPTY);
        }
        st.nodes.remove(&norm);
        SysRet::ok(0)
    }

    fn unlink(&self, path: &[u8]) -> SysRet {
        let norm = normalize(path);
        let mut st = self.state.borrow_mut();
        match st.nodes.get(&norm) {
            None => SysRet::err(ENOENT),
            Some(Node::Dir) => SysRet::err(EISDIR),
            Some(Node::File(_)) => {
                st.nodes.remove(&norm);
                SysRet::ok(0)
            }
        }
    }

    fn getcwd(&self, buf: &mut [u8]) -> SysRet {
        match buf.first_mut() {
            Some(b) => {
                *b = b'/';
                SysRet::ok(1)
            }
            None => SysRet::err(EINVAL),
        }
    }

    fn chmod(&self, path: &[u8], _mode: u32) -> SysRet {
        if self.state.borrow().nodes.contains_key(&normalize(path)) {
            SysRet::ok(0)
        } else {
            SysRet::err(ENOENT)
        }
    }

    fn map_anon(&self, _len: usize) -> SysRet {
        SysRet::err(ENOSYS)
    }

    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet {
        if let Some(code) = self.fail_dir_open {
            return SysRet::err(code);
        }
        let norm = normalize(path);
        let mut st = self.state.borrow_mut();
        match st.nodes.get(&norm) {
            None => return SysRet::err(ENOENT),
            Some(Node::File(_)) => return SysRet::err(Self::ENOTDIR),
            Some(Node::Dir) => {}
        }
        let mut records = vec![encode::linux(b".", DT_DIR), encode::linux(b"..", DT_DIR)];
        for (name, is_dir) in Self::children(&st, &norm) {
            let t = match (self.unknown_types, is_dir) {
                (true, _) => DT_UNKNOWN,
                (false, true) => DT_DIR,
                (false, false) => DT_REG,
            };
            records.push(encode::linux(&name, t));
        }
        let r = Self::add_handle(&mut st, Open::Dir { records, next: 0 });
        dir.handle = r.r0 as Handle;
        r
    }

    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet {
        if let Some(code) = self.fail_dir_read {
            return SysRet::err(code);
        }
        let mut st = self.state.borrow_mut();
        st.dir_reads += 1;
        let Some(Open::Dir { records, next }) = st.open.get_mut(&dir.handle) else {
            return SysRet::err(EBADF);
        };
        let mut used = 0usize;
        while let Some(rec) = records.get(*next) {
            if used + rec.len() > buf.len() {
                if used == 0 {
                    return SysRet::err(EINVAL);
                }
                break;
            }
            buf[used..used + rec.len()].copy_from_slice(rec);
            used += rec.len();
            *next += 1;
        }
        SysRet::ok(used)
    }

    fn dir_close(&self, dir: &mut DirStream) -> SysRet {
        let r = self.close(dir.handle);
        dir.handle = crate::sys::INVALID_HANDLE;
        r
    }

    fn environ(&self) -> Result<RawBlock, i32> {
        Ok(RawBlock::NulSeparated(b"MOCK=1\0".to_vec()))
    }

    fn argv(&self) -> Result<RawBlock, i32> {
        Ok(RawBlock::Indexed(vec![b"mock".to_vec()]))
    }

    fn stdio(&self, slot: u8) -> Handle {
        slot as Handle
    }

    fn exit(&self, code: i32) -> ! {
        panic!("mock platform exit({code})")
    }

    fn classify(&self, code: i32) -> ErrorKind {
        match code {
            ENOENT => ErrorKind::NotFound,
            EINTR => ErrorKind::Interrupted,
            EEXIST => ErrorKind::AlreadyExists,
            EACCES => ErrorKind::PermissionDenied,
            ENOSYS => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}
