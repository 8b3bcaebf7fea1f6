//! Linux backend: kernel calls issued directly, no platform library.

use lowrt_targets::DirentFormat;

use super::{cpath, DirStream, Handle, OpenMode, Platform, PosixProcess, RawBlock, Stat, SysRet};
use crate::error::ErrorKind;

#[cfg_attr(target_arch = "x86_64", path = "x86_64.rs")]
#[cfg_attr(target_arch = "aarch64", path = "aarch64.rs")]
#[cfg_attr(target_arch = "x86", path = "x86.rs")]
mod arch;

/// Kernel-call numbers. Only the `*at` forms are used so the same table
/// shape works on architectures without the legacy path calls.
pub(crate) struct Numbers {
    pub read: usize,
    pub write: usize,
    pub openat: usize,
    pub close: usize,
    pub fstatat: usize,
    pub mkdirat: usize,
    pub unlinkat: usize,
    pub getcwd: usize,
    pub fchmodat: usize,
    pub getdents64: usize,
    pub pipe2: usize,
    pub clone: usize,
    pub execve: usize,
    pub wait4: usize,
    pub dup3: usize,
    pub fcntl: usize,
    pub exit_group: usize,
}

const AT_FDCWD: isize = -100;
const AT_REMOVEDIR: usize = 0x200;

const O_RDONLY: usize = 0;
const O_WRONLY: usize = 0o1;
const O_CREAT: usize = 0o100;
const O_TRUNC: usize = 0o1000;
const O_APPEND: usize = 0o2000;
const O_CLOEXEC: usize = 0o2000000;

const SIGCHLD: usize = 17;

const F_DUPFD_CLOEXEC: usize = 1030;

const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const EINTR: i32 = 4;
const EACCES: i32 = 13;
const EEXIST: i32 = 17;
const EINVAL: i32 = 22;
const ENOSYS: i32 = 38;
const EOPNOTSUPP: i32 = 95;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

#[derive(Debug, Clone, Copy, Default)]
pub struct Linux;

fn ret(r: isize) -> SysRet {
    if (-4095..0).contains(&r) {
        SysRet::err((-r) as i32)
    } else {
        SysRet::ok(r as usize)
    }
}

unsafe fn call(nr: usize, args: [usize; 6]) -> SysRet {
    ret(arch::syscall(nr, args))
}

fn at_fdcwd() -> usize {
    AT_FDCWD as usize
}

fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

impl Linux {
    fn openat(&self, path: &[u8], flags: usize) -> SysRet {
        let Some(c) = cpath(path) else {
            return SysRet::err(EINVAL);
        };
        unsafe {
            call(
                arch::NR.openat,
                [
                    at_fdcwd(),
                    c.as_ptr() as usize,
                    flags | O_CLOEXEC | arch::O_LARGEFILE,
                    0o666,
                    0,
                    0,
                ],
            )
        }
    }

    fn path_call(&self, nr: usize, path: &[u8], a2: usize) -> SysRet {
        let Some(c) = cpath(path) else {
            return SysRet::err(EINVAL);
        };
        unsafe { call(nr, [at_fdcwd(), c.as_ptr() as usize, a2, 0, 0, 0]) }
    }

    fn read_whole(&self, path: &[u8]) -> Result<Vec<u8>, i32> {
        let r = self.open(path, OpenMode::Read);
        if !r.is_ok() {
            return Err(r.err);
        }
        let fd = r.r0 as Handle;
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let r = self.read(fd, &mut chunk);
            if r.err == EINTR {
                continue;
            }
            if !r.is_ok() {
                self.close(fd);
                return Err(r.err);
            }
            if r.r0 == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..r.r0]);
        }
        self.close(fd);
        Ok(out)
    }
}

impl Platform for Linux {
    const DIRENT: DirentFormat = DirentFormat::LinuxDirent64;
    const STAT_LEN: usize = arch::STAT_LEN;

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        unsafe {
            call(
                arch::NR.read,
                [h as usize, buf.as_mut_ptr() as usize, buf.len(), 0, 0, 0],
            )
        }
    }

    fn write(&self, h: Handle, buf: &[u8]) -> SysRet {
        unsafe {
            call(
                arch::NR.write,
                [h as usize, buf.as_ptr() as usize, buf.len(), 0, 0, 0],
            )
        }
    }

    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet {
        let flags = match mode {
            OpenMode::Read => O_RDONLY,
            OpenMode::Write => O_WRONLY | O_CREAT | O_TRUNC,
            OpenMode::Append => O_WRONLY | O_CREAT | O_APPEND,
        };
        self.openat(path, flags)
    }

    fn close(&self, h: Handle) -> SysRet {
        unsafe { call(arch::NR.close, [h as usize, 0, 0, 0, 0, 0]) }
    }

    fn stat(&self, path: &[u8], raw: &mut [u8]) -> SysRet {
        if raw.len() < arch::STAT_LEN {
            return SysRet::err(EINVAL);
        }
        let Some(c) = cpath(path) else {
            return SysRet::err(EINVAL);
        };
        let r = unsafe {
            call(
                arch::NR.fstatat,
                [
                    at_fdcwd(),
                    c.as_ptr() as usize,
                    raw.as_mut_ptr() as usize,
                    0,
                    0,
                    0,
                ],
            )
        };
        if r.is_ok() {
            SysRet::ok(arch::STAT_LEN)
        } else {
            r
        }
    }

    fn decode_stat(raw: &[u8]) -> Stat {
        let mut st = arch::decode_stat(raw);
        st.is_dir = is_dir_mode(st.mode);
        st
    }

    fn mkdir(&self, path: &[u8]) -> SysRet {
        self.path_call(arch::NR.mkdirat, path, 0o777)
    }

    fn rmdir(&self, path: &[u8]) -> SysRet {
        self.path_call(arch::NR.unlinkat, path, AT_REMOVEDIR)
    }

    fn unlink(&self, path: &[u8]) -> SysRet {
        self.path_call(arch::NR.unlinkat, path, 0)
    }

    fn getcwd(&self, buf: &mut [u8]) -> SysRet {
        let r = unsafe {
            call(
                arch::NR.getcwd,
                [buf.as_mut_ptr() as usize, buf.len(), 0, 0, 0, 0],
            )
        };
        if r.is_ok() {
            // The kernel counts the terminator.
            SysRet::ok(r.r0.saturating_sub(1))
        } else {
            r
        }
    }

    fn chmod(&self, path: &[u8], mode: u32) -> SysRet {
        self.path_call(arch::NR.fchmodat, path, mode as usize)
    }

    fn map_anon(&self, len: usize) -> SysRet {
        ret(unsafe { arch::map_anon(len) })
    }

    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet {
        let r = self.openat(path, O_RDONLY | arch::O_DIRECTORY);
        if r.is_ok() {
            dir.handle = r.r0 as Handle;
        }
        r
    }

    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet {
        unsafe {
            call(
                arch::NR.getdents64,
                [
                    dir.handle as usize,
                    buf.as_mut_ptr() as usize,
                    buf.len(),
                    0,
                    0,
                    0,
                ],
            )
        }
    }

    fn dir_close(&self, dir: &mut DirStream) -> SysRet {
        let r = self.close(dir.handle);
        dir.handle = super::INVALID_HANDLE;
        r
    }

    fn environ(&self) -> Result<RawBlock, i32> {
        self.read_whole(b"/proc/self/environ")
            .map(RawBlock::NulSeparated)
    }

    fn argv(&self) -> Result<RawBlock, i32> {
        self.read_whole(b"/proc/self/cmdline")
            .map(RawBlock::NulSeparated)
    }

    fn stdio(&self, slot: u8) -> Handle {
        slot as Handle
    }

    fn exit(&self, code: i32) -> ! {
        loop {
            unsafe {
                arch::syscall(arch::NR.exit_group, [code as usize, 0, 0, 0, 0, 0]);
            }
        }
    }

    fn classify(&self, code: i32) -> ErrorKind {
        match code {
            ENOENT => ErrorKind::NotFound,
            EEXIST => ErrorKind::AlreadyExists,
            EACCES | EPERM => ErrorKind::PermissionDenied,
            EINTR => ErrorKind::Interrupted,
            ENOSYS | EOPNOTSUPP => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

impl PosixProcess for Linux {
    fn pipe(&self) -> SysRet {
        let mut fds = [0i32; 2];
        let r = unsafe {
            call(
                arch::NR.pipe2,
                [fds.as_mut_ptr() as usize, O_CLOEXEC, 0, 0, 0, 0],
            )
        };
        if r.is_ok() {
            SysRet::ok2(fds[0] as usize, fds[1] as usize)
        } else {
            r
        }
    }

    fn fork(&self) -> SysRet {
        unsafe { call(arch::NR.clone, [SIGCHLD, 0, 0, 0, 0, 0]) }
    }

    unsafe fn execve(
        &self,
        path: *const u8,
        argv: *const *const u8,
        envp: *const *const u8,
    ) -> SysRet {
        call(
            arch::NR.execve,
            [path as usize, argv as usize, envp as usize, 0, 0, 0],
        )
    }

    fn dup_to(&self, from: Handle, to: Handle) -> SysRet {
        unsafe { call(arch::NR.dup3, [from as usize, to as usize, 0, 0, 0, 0]) }
    }

    fn dup_above(&self, from: Handle, min: Handle) -> SysRet {
        unsafe {
            call(
                arch::NR.fcntl,
                [from as usize, F_DUPFD_CLOEXEC, min as usize, 0, 0, 0],
            )
        }
    }

    fn wait(&self, pid: usize) -> SysRet {
        let mut status: i32 = 0;
        loop {
            let r = unsafe {
                call(
                    arch::NR.wait4,
                    [pid, &mut status as *mut i32 as usize, 0, 0, 0, 0],
                )
            };
            if r.err == EINTR {
                continue;
            }
            if !r.is_ok() {
                return r;
            }
            return SysRet::ok2(r.r0, status as u32 as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_returns_in_errno_range_become_errors() {
        assert_eq!(ret(-2), SysRet::err(2));
        assert_eq!(ret(-4095), SysRet::err(4095));
        assert_eq!(ret(3), SysRet::ok(3));
        // Addresses in the top page of the address space are never handed out,
        // anything below that is a plain value.
        assert!(ret(-4096).is_ok());
    }

    #[test]
    fn cwd_matches_std() {
        let mut buf = [0u8; 4096];
        let r = Linux.getcwd(&mut buf);
        assert!(r.is_ok(), "getcwd err={}", r.err);
        let expected = std::env::current_dir().expect("current_dir");
        assert_eq!(
            &buf[..r.r0],
            expected.as_os_str().as_encoded_bytes(),
        );
    }

    #[test]
    fn anonymous_mapping_is_zeroed_and_writable() {
        let r = Linux.map_anon(8192);
        assert!(r.is_ok(), "mmap err={}", r.err);
        let p = r.r0 as *mut u8;
        unsafe {
            let s = core::slice::from_raw_parts_mut(p, 8192);
            assert!(s.iter().all(|&b| b == 0));
            s[8191] = 7;
            assert_eq!(s[8191], 7);
        }
    }

    #[test]
    fn stat_reports_directories_and_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("f.bin");
        std::fs::write(&file, [1u8; 37]).expect("write");

        let mut raw = [0u8; super::super::STAT_BUF_MAX];
        let r = Linux.stat(file.as_os_str().as_encoded_bytes(), &mut raw);
        assert!(r.is_ok(), "stat err={}", r.err);
        let st = Linux::decode_stat(&raw[..r.r0]);
        assert_eq!(st.size, 37);
        assert!(!st.is_dir);

        let r = Linux.stat(dir.path().as_os_str().as_encoded_bytes(), &mut raw);
        assert!(r.is_ok());
        assert!(Linux::decode_stat(&raw[..r.r0]).is_dir);

        let r = Linux.stat(b"/definitely/not/here", &mut raw);
        assert_eq!(Linux.classify(r.err), ErrorKind::NotFound);
    }
}
