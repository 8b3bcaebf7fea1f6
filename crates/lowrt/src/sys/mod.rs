//! Per-target system call shim.
//!
//! One [`Platform`] implementation per target family binds the uniform
//! operation set to that target's kernel-call numbers, argument order and
//! record layouts. Nothing target-independent lives here: every call returns
//! the raw `{r0, r1, err}` triple and leaves interpretation to the OS layer.
//!
//! Backends:
//! - `linux`: raw `syscall`/`svc`/`int 0x80` on x86_64, aarch64 and x86.
//! - `portable`: other unix hosts and the portable-dialect targets, through
//!   the platform library.
//! - `windows`: kernel32 entry points, declared by hand.
//! - `wasi`: `wasi_snapshot_preview1` imports.

use lowrt_targets::DirentFormat;

use crate::error::{Error, ErrorKind, Result};

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")
))]
mod linux;
#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")
))]
pub use linux::Linux as Native;

#[cfg(all(
    unix,
    not(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")
    ))
))]
mod portable;
#[cfg(all(
    unix,
    not(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "x86")
    ))
))]
pub use portable::Portable as Native;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::Windows as Native;

#[cfg(all(target_arch = "wasm32", target_os = "wasi"))]
mod wasi;
#[cfg(all(target_arch = "wasm32", target_os = "wasi"))]
pub use wasi::Wasi as Native;

#[cfg(not(any(unix, windows, all(target_arch = "wasm32", target_os = "wasi"))))]
compile_error!("lowrt: no syscall backend for this target");

/// Native descriptor (POSIX fd, WASI fd) or handle (Windows `HANDLE`).
pub type Handle = isize;

pub const INVALID_HANDLE: Handle = -1;

/// Upper bound on any backend's raw stat record.
pub const STAT_BUF_MAX: usize = 256;

/// Result triple shared by every shim call; `err == 0` means success.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SysRet {
    pub r0: usize,
    pub r1: usize,
    pub err: i32,
}

impl SysRet {
    pub const fn ok(r0: usize) -> Self {
        SysRet { r0, r1: 0, err: 0 }
    }

    pub const fn ok2(r0: usize, r1: usize) -> Self {
        SysRet { r0, r1, err: 0 }
    }

    pub const fn err(code: i32) -> Self {
        SysRet {
            r0: 0,
            r1: 0,
            err: code,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.err == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    /// Create or append.
    Append,
}

/// Target-independent view of a raw stat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub size: u64,
    pub mode: u32,
    pub is_dir: bool,
    pub mtime: i64,
}

/// Cursor state for a directory being enumerated.
///
/// `handle` is the open descriptor (or find handle); `cursor` is the resume
/// cookie on targets that need one; `pattern` and `started` carry the search
/// pattern on targets whose first read is also the open.
#[derive(Debug)]
pub struct DirStream {
    pub handle: Handle,
    pub cursor: u64,
    pub pattern: Vec<u8>,
    pub started: bool,
    pub done: bool,
}

impl Default for DirStream {
    fn default() -> Self {
        DirStream {
            handle: INVALID_HANDLE,
            cursor: 0,
            pattern: Vec::new(),
            started: false,
            done: false,
        }
    }
}

/// Environment or argument block in whatever shape the target hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawBlock {
    NulSeparated(Vec<u8>),
    DoubleNul(Vec<u8>),
    Indexed(Vec<Vec<u8>>),
}

pub trait Platform {
    /// Shape of the records `dir_read` produces.
    const DIRENT: DirentFormat;
    /// Size of the raw record `stat` fills.
    const STAT_LEN: usize;

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet;
    fn write(&self, h: Handle, buf: &[u8]) -> SysRet;
    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet;
    fn close(&self, h: Handle) -> SysRet;
    fn stat(&self, path: &[u8], raw: &mut [u8]) -> SysRet;
    fn decode_stat(raw: &[u8]) -> Stat;
    fn mkdir(&self, path: &[u8]) -> SysRet;
    fn rmdir(&self, path: &[u8]) -> SysRet;
    fn unlink(&self, path: &[u8]) -> SysRet;
    /// `r0` = length of the path written to `buf` (no terminator).
    fn getcwd(&self, buf: &mut [u8]) -> SysRet;
    fn chmod(&self, path: &[u8], mode: u32) -> SysRet;
    /// Zero-filled, read-write, never returned. `r0` = base address.
    fn map_anon(&self, len: usize) -> SysRet;
    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet;
    /// `r0` = bytes of whole records written to `buf`; 0 at end of stream.
    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet;
    fn dir_close(&self, dir: &mut DirStream) -> SysRet;
    fn environ(&self) -> std::result::Result<RawBlock, i32>;
    fn argv(&self) -> std::result::Result<RawBlock, i32>;
    /// Native handle of standard stream 0, 1 or 2.
    fn stdio(&self, slot: u8) -> Handle;
    fn exit(&self, code: i32) -> !;
    fn classify(&self, code: i32) -> ErrorKind;

    fn check(&self, r: SysRet) -> Result<SysRet> {
        if r.err == 0 {
            Ok(r)
        } else {
            Err(self.error(r.err))
        }
    }

    fn error(&self, code: i32) -> Error {
        Error::os(self.classify(code), code)
    }

    /// `read`, reissued while the call is interrupted by a signal.
    fn read_retrying(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        loop {
            let r = self.read(h, buf);
            if r.is_ok() || self.classify(r.err) != ErrorKind::Interrupted {
                return r;
            }
        }
    }
}

/// Fork/exec process primitives of the POSIX family.
pub trait PosixProcess: Platform {
    /// `r0` = read end, `r1` = write end; both close-on-exec.
    fn pipe(&self) -> SysRet;
    /// `r0` = child pid in the parent, 0 in the child.
    fn fork(&self) -> SysRet;
    /// # Safety
    /// `path` is NUL-terminated; `argv` and `envp` are null-terminated arrays
    /// of NUL-terminated strings, all alive for the duration of the call.
    unsafe fn execve(&self, path: *const u8, argv: *const *const u8, envp: *const *const u8)
        -> SysRet;
    /// Duplicate `from` into slot `to`, clearing close-on-exec.
    fn dup_to(&self, from: Handle, to: Handle) -> SysRet;
    /// Duplicate `from` onto the lowest free descriptor at or above `min`,
    /// close-on-exec. `r0` = the new descriptor.
    fn dup_above(&self, from: Handle, min: Handle) -> SysRet;
    /// `r0` = pid, `r1` = packed status word.
    fn wait(&self, pid: usize) -> SysRet;
}

/// Create-process primitives of the Windows family.
pub trait Win32Process: Platform {
    /// `r0` = read end (not inheritable), `r1` = write end (inheritable).
    fn create_pipe(&self) -> SysRet;
    /// `app` is NUL-terminated; `cmdline` is NUL-terminated and may be
    /// modified in place by the kernel. `r0` = process handle, `r1` = thread handle.
    fn create_process(
        &self,
        app: &[u8],
        cmdline: &mut [u8],
        env_block: Option<&[u8]>,
        stdio: Option<[Handle; 3]>,
    ) -> SysRet;
    /// Block until the process ends. `r0` = exit code.
    fn wait_process(&self, process: Handle) -> SysRet;
}

/// Copy `path` with a trailing NUL; `None` when it already contains one.
pub(crate) fn cpath(path: &[u8]) -> Option<Vec<u8>> {
    if path.contains(&0) {
        return None;
    }
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(0);
    Some(out)
}

pub(crate) fn le_u16(b: &[u8], off: usize) -> Option<u16> {
    let s = b.get(off..off + 2)?;
    Some(u16::from_le_bytes([s[0], s[1]]))
}

pub(crate) fn le_u32(b: &[u8], off: usize) -> Option<u32> {
    let s = b.get(off..off + 4)?;
    Some(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

pub(crate) fn le_u64(b: &[u8], off: usize) -> Option<u64> {
    let s = b.get(off..off + 8)?;
    let mut w = [0u8; 8];
    w.copy_from_slice(s);
    Some(u64::from_le_bytes(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpath_terminates_and_rejects_interior_nul() {
        assert_eq!(cpath(b"a/b").as_deref(), Some(&b"a/b\0"[..]));
        assert_eq!(cpath(b""), Some(vec![0]));
        assert_eq!(cpath(b"a\0b"), None);
    }

    #[test]
    fn little_endian_readers_bounds_check() {
        let b = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(le_u16(&b, 0), Some(0x0201));
        assert_eq!(le_u32(&b, 4), Some(0x0807_0605));
        assert_eq!(le_u64(&b, 0), Some(0x0807_0605_0403_0201));
        assert_eq!(le_u32(&b, 6), None);
    }

    #[test]
    fn native_stat_record_fits_the_shared_buffer() {
        assert!(<Native as Platform>::STAT_LEN <= STAT_BUF_MAX);
    }
}
