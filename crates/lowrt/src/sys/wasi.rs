//! WASI backend: `wasi_snapshot_preview1` imports.
//!
//! Paths resolve against the first preopened directory (descriptor 3); a
//! leading `/` is stripped. There is no process creation on this target.

use lowrt_targets::DirentFormat;

use super::{le_u32, le_u64, DirStream, Handle, OpenMode, Platform, RawBlock, Stat, SysRet};
use crate::error::ErrorKind;

#[repr(C)]
struct Iovec {
    buf: *const u8,
    len: usize,
}

#[link(wasm_import_module = "wasi_snapshot_preview1")]
extern "C" {
    fn fd_read(fd: u32, iovs: *const Iovec, iovs_len: usize, nread: *mut usize) -> u16;
    fn fd_write(fd: u32, iovs: *const Iovec, iovs_len: usize, nwritten: *mut usize) -> u16;
    fn fd_close(fd: u32) -> u16;
    fn fd_readdir(fd: u32, buf: *mut u8, buf_len: usize, cookie: u64, used: *mut usize) -> u16;
    fn path_open(
        dirfd: u32,
        dirflags: u32,
        path: *const u8,
        path_len: usize,
        oflags: u16,
        rights_base: u64,
        rights_inheriting: u64,
        fdflags: u16,
        fd: *mut u32,
    ) -> u16;
    fn path_filestat_get(
        dirfd: u32,
        flags: u32,
        path: *const u8,
        path_len: usize,
        out: *mut u8,
    ) -> u16;
    fn path_create_directory(dirfd: u32, path: *const u8, path_len: usize) -> u16;
    fn path_remove_directory(dirfd: u32, path: *const u8, path_len: usize) -> u16;
    fn path_unlink_file(dirfd: u32, path: *const u8, path_len: usize) -> u16;
    fn environ_sizes_get(count: *mut usize, size: *mut usize) -> u16;
    fn environ_get(ptrs: *mut *mut u8, buf: *mut u8) -> u16;
    fn args_sizes_get(count: *mut usize, size: *mut usize) -> u16;
    fn args_get(ptrs: *mut *mut u8, buf: *mut u8) -> u16;
    fn proc_exit(code: u32) -> !;
}

const PREOPEN_FD: u32 = 3;
const LOOKUP_SYMLINK_FOLLOW: u32 = 1;

const OFLAGS_CREAT: u16 = 1;
const OFLAGS_DIRECTORY: u16 = 2;
const OFLAGS_TRUNC: u16 = 8;
const FDFLAGS_APPEND: u16 = 1;

const RIGHT_FD_READ: u64 = 1 << 1;
const RIGHT_FD_SEEK: u64 = 1 << 2;
const RIGHT_FD_WRITE: u64 = 1 << 6;
const RIGHT_FD_READDIR: u64 = 1 << 14;
const RIGHT_PATH_FILESTAT_GET: u64 = 1 << 18;
const RIGHT_FD_FILESTAT_GET: u64 = 1 << 21;

const EACCES: i32 = 2;
const EEXIST: i32 = 20;
const EINTR: i32 = 27;
const EINVAL: i32 = 28;
const ENOENT: i32 = 44;
const ENOSYS: i32 = 52;
const ENOTSUP: i32 = 58;
const EPERM: i32 = 63;

const FILESTAT_LEN: usize = 64;
const FILETYPE_DIRECTORY: u8 = 3;
const DIRENT_HEADER: usize = 24;

const PAGE: usize = 65536;

#[derive(Debug, Clone, Copy, Default)]
pub struct Wasi;

fn errno_ret(e: u16) -> SysRet {
    if e == 0 {
        SysRet::ok(0)
    } else {
        SysRet::err(e as i32)
    }
}

/// Path relative to the preopened directory.
fn rel(path: &[u8]) -> &[u8] {
    let mut p = path;
    while let [b'/', rest @ ..] = p {
        p = rest;
    }
    if p.is_empty() {
        b"."
    } else {
        p
    }
}

fn path_call(path: &[u8], f: unsafe extern "C" fn(u32, *const u8, usize) -> u16) -> SysRet {
    let p = rel(path);
    errno_ret(unsafe { f(PREOPEN_FD, p.as_ptr(), p.len()) })
}

fn open_at(path: &[u8], oflags: u16, rights: u64, fdflags: u16) -> SysRet {
    let p = rel(path);
    let mut fd: u32 = 0;
    let e = unsafe {
        path_open(
            PREOPEN_FD,
            LOOKUP_SYMLINK_FOLLOW,
            p.as_ptr(),
            p.len(),
            oflags,
            rights,
            rights,
            fdflags,
            &mut fd,
        )
    };
    if e == 0 {
        SysRet::ok(fd as usize)
    } else {
        SysRet::err(e as i32)
    }
}

type SizesFn = unsafe extern "C" fn(*mut usize, *mut usize) -> u16;
type GetFn = unsafe extern "C" fn(*mut *mut u8, *mut u8) -> u16;

fn read_vector(sizes: SizesFn, get: GetFn) -> Result<RawBlock, i32> {
    let (mut count, mut size) = (0usize, 0usize);
    let e = unsafe { sizes(&mut count, &mut size) };
    if e != 0 {
        return Err(e as i32);
    }
    let mut ptrs: Vec<*mut u8> = vec![core::ptr::null_mut(); count];
    let mut buf = vec![0u8; size];
    let e = unsafe { get(ptrs.as_mut_ptr(), buf.as_mut_ptr()) };
    if e != 0 {
        return Err(e as i32);
    }
    let base = buf.as_ptr() as usize;
    let items = ptrs
        .iter()
        .map(|&p| {
            let start = (p as usize).saturating_sub(base).min(buf.len());
            let end = buf[start..]
                .iter()
                .position(|&b| b == 0)
                .map_or(buf.len(), |n| start + n);
            buf[start..end].to_vec()
        })
        .collect();
    Ok(RawBlock::Indexed(items))
}

/// Length of the whole records at the front of `buf`, and the resume cookie
/// of the last one.
fn whole_records(buf: &[u8]) -> (usize, Option<u64>) {
    let mut off = 0usize;
    let mut cookie = None;
    while off + DIRENT_HEADER <= buf.len() {
        let (Some(next), Some(namlen)) = (le_u64(buf, off), le_u32(buf, off + 16)) else {
            break;
        };
        let end = off + DIRENT_HEADER + namlen as usize;
        if end > buf.len() {
            break;
        }
        cookie = Some(next);
        off = end;
    }
    (off, cookie)
}

impl Platform for Wasi {
    const DIRENT: DirentFormat = DirentFormat::WasiDirent;
    const STAT_LEN: usize = FILESTAT_LEN;

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        let iov = Iovec {
            buf: buf.as_mut_ptr(),
            len: buf.len(),
        };
        let mut n = 0usize;
        match unsafe { fd_read(h as u32, &iov, 1, &mut n) } {
            0 => SysRet::ok(n),
            e => SysRet::err(e as i32),
        }
    }

    fn write(&self, h: Handle, buf: &[u8]) -> SysRet {
        let iov = Iovec {
            buf: buf.as_ptr(),
            len: buf.len(),
        };
        let mut n = 0usize;
        match unsafe { fd_write(h as u32, &iov, 1, &mut n) } {
            0 => SysRet::ok(n),
            e => SysRet::err(e as i32),
        }
    }

    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet {
        match mode {
            OpenMode::Read => open_at(
                path,
                0,
                RIGHT_FD_READ | RIGHT_FD_SEEK | RIGHT_FD_FILESTAT_GET,
                0,
            ),
            OpenMode::Write => open_at(path, OFLAGS_CREAT | OFLAGS_TRUNC, RIGHT_FD_WRITE, 0),
            OpenMode::Append => open_at(path, OFLAGS_CREAT, RIGHT_FD_WRITE, FDFLAGS_APPEND),
        }
    }

    fn close(&self, h: Handle) -> SysRet {
        errno_ret(unsafe { fd_close(h as u32) })
    }

    fn stat(&self, path: &[u8], raw: &mut [u8]) -> SysRet {
        if raw.len() < FILESTAT_LEN {
            return SysRet::err(EINVAL);
        }
        let p = rel(path);
        let e = unsafe {
            path_filestat_get(
                PREOPEN_FD,
                LOOKUP_SYMLINK_FOLLOW,
                p.as_ptr(),
                p.len(),
                raw.as_mut_ptr(),
            )
        };
        if e == 0 {
            SysRet::ok(FILESTAT_LEN)
        } else {
            SysRet::err(e as i32)
        }
    }

    fn decode_stat(raw: &[u8]) -> Stat {
        let is_dir = raw.get(16).copied() == Some(FILETYPE_DIRECTORY);
        Stat {
            size: le_u64(raw, 32).unwrap_or(0),
            mode: if is_dir { 0o040000 | 0o777 } else { 0o100000 | 0o666 },
            is_dir,
            mtime: (le_u64(raw, 48).unwrap_or(0) / 1_000_000_000) as i64,
        }
    }

    fn mkdir(&self, path: &[u8]) -> SysRet {
        path_call(path, path_create_directory)
    }

    fn rmdir(&self, path: &[u8]) -> SysRet {
        path_call(path, path_remove_directory)
    }

    fn unlink(&self, path: &[u8]) -> SysRet {
        path_call(path, path_unlink_file)
    }

    /// Relative paths already resolve against the preopened root.
    fn getcwd(&self, buf: &mut [u8]) -> SysRet {
        match buf.first_mut() {
            Some(b) => {
                *b = b'/';
                SysRet::ok(1)
            }
            None => SysRet::err(EINVAL),
        }
    }

    fn chmod(&self, _path: &[u8], _mode: u32) -> SysRet {
        SysRet::err(ENOTSUP)
    }

    fn map_anon(&self, len: usize) -> SysRet {
        let pages = len.div_ceil(PAGE);
        let prev = core::arch::wasm32::memory_grow(0, pages);
        if prev == usize::MAX {
            return SysRet::err(ENOSYS);
        }
        SysRet::ok(prev * PAGE)
    }

    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet {
        let r = open_at(path, OFLAGS_DIRECTORY, RIGHT_FD_READDIR | RIGHT_PATH_FILESTAT_GET, 0);
        if r.is_ok() {
            dir.handle = r.r0 as Handle;
            dir.cursor = 0;
            dir.done = false;
        }
        r
    }

    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet {
        if dir.done {
            return SysRet::ok(0);
        }
        let mut used = 0usize;
        let e = unsafe {
            fd_readdir(
                dir.handle as u32,
                buf.as_mut_ptr(),
                buf.len(),
                dir.cursor,
                &mut used,
            )
        };
        if e != 0 {
            return SysRet::err(e as i32);
        }
        // A short fill means the stream ended inside this buffer.
        if used < buf.len() {
            dir.done = true;
        }
        let (whole, cookie) = whole_records(&buf[..used]);
        if whole == 0 && used > 0 {
            return SysRet::err(EINVAL);
        }
        if let Some(c) = cookie {
            dir.cursor = c;
        }
        SysRet::ok(whole)
    }

    fn dir_close(&self, dir: &mut DirStream) -> SysRet {
        let r = self.close(dir.handle);
        dir.handle = super::INVALID_HANDLE;
        r
    }

    fn environ(&self) -> Result<RawBlock, i32> {
        read_vector(environ_sizes_get, environ_get)
    }

    fn argv(&self) -> Result<RawBlock, i32> {
        read_vector(args_sizes_get, args_get)
    }

    fn stdio(&self, slot: u8) -> Handle {
        slot as Handle
    }

    fn exit(&self, code: i32) -> ! {
        unsafe { proc_exit(code as u32) }
    }

    fn classify(&self, code: i32) -> ErrorKind {
        match code {
            ENOENT => ErrorKind::NotFound,
            EEXIST => ErrorKind::AlreadyExists,
            EACCES | EPERM => ErrorKind::PermissionDenied,
            EINTR => ErrorKind::Interrupted,
            ENOSYS | ENOTSUP => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(next: u64, name: &[u8]) -> Vec<u8> {
        let mut r = vec![0u8; DIRENT_HEADER];
        r[0..8].copy_from_slice(&next.to_le_bytes());
        r[16..20].copy_from_slice(&(name.len() as u32).to_le_bytes());
        r[20] = 4;
        r.extend_from_slice(name);
        r
    }

    #[test]
    fn whole_records_drops_a_truncated_tail() {
        let mut buf = record(1, b"a.txt");
        buf.extend(record(2, b"sub"));
        let whole = buf.len();
        buf.extend(&record(3, b"cut-off")[..DIRENT_HEADER + 2]);
        assert_eq!(whole_records(&buf), (whole, Some(2)));
    }

    #[test]
    fn leading_slashes_resolve_to_the_preopen() {
        assert_eq!(rel(b"/a/b"), b"a/b");
        assert_eq!(rel(b"//"), b".");
        assert_eq!(rel(b"x"), b"x");
    }
}
