//! Portable backend: other unix hosts and the portable-dialect targets,
//! bound through the platform library.
//!
//! Directory entries are re-encoded as `linux_dirent64` records so the OS
//! layer parses a single shape.

use lowrt_targets::DirentFormat;

use super::{cpath, DirStream, Handle, OpenMode, Platform, PosixProcess, RawBlock, Stat, SysRet};
use crate::error::ErrorKind;

extern "C" {
    static environ: *const *const libc::c_char;
}

const DIRENT_HEADER: usize = 19;
const DT_UNKNOWN: u8 = 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Portable;

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn ret_int(r: libc::c_int) -> SysRet {
    if r < 0 {
        SysRet::err(errno())
    } else {
        SysRet::ok(r as usize)
    }
}

fn ret_size(r: libc::ssize_t) -> SysRet {
    if r < 0 {
        SysRet::err(errno())
    } else {
        SysRet::ok(r as usize)
    }
}

fn with_cpath(path: &[u8], f: impl FnOnce(*const libc::c_char) -> SysRet) -> SysRet {
    match cpath(path) {
        Some(c) => f(c.as_ptr() as *const libc::c_char),
        None => SysRet::err(libc::EINVAL),
    }
}

fn read_c_strings(mut p: *const *const libc::c_char) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    if p.is_null() {
        return out;
    }
    unsafe {
        while !(*p).is_null() {
            out.push(std::ffi::CStr::from_ptr(*p).to_bytes().to_vec());
            p = p.add(1);
        }
    }
    out
}

impl Platform for Portable {
    const DIRENT: DirentFormat = DirentFormat::LinuxDirent64;
    const STAT_LEN: usize = std::mem::size_of::<libc::stat>();

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        ret_size(unsafe { libc::read(h as libc::c_int, buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn write(&self, h: Handle, buf: &[u8]) -> SysRet {
        ret_size(unsafe { libc::write(h as libc::c_int, buf.as_ptr().cast(), buf.len()) })
    }

    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet {
        let flags = match mode {
            OpenMode::Read => libc::O_RDONLY,
            OpenMode::Write => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        } | libc::O_CLOEXEC;
        with_cpath(path, |c| ret_int(unsafe { libc::open(c, flags, 0o666 as libc::c_uint) }))
    }

    fn close(&self, h: Handle) -> SysRet {
        ret_int(unsafe { libc::close(h as libc::c_int) })
    }

    fn stat(&self, path: &[u8], raw: &mut [u8]) -> SysRet {
        if raw.len() < Self::STAT_LEN {
            return SysRet::err(libc::EINVAL);
        }
        with_cpath(path, |c| {
            let mut st = std::mem::MaybeUninit::<libc::stat>::zeroed();
            let r = unsafe { libc::stat(c, st.as_mut_ptr()) };
            if r < 0 {
                return SysRet::err(errno());
            }
            unsafe {
                core::ptr::copy_nonoverlapping(
                    st.as_ptr() as *const u8,
                    raw.as_mut_ptr(),
                    Self::STAT_LEN,
                );
            }
            SysRet::ok(Self::STAT_LEN)
        })
    }

    fn decode_stat(raw: &[u8]) -> Stat {
        if raw.len() < Self::STAT_LEN {
            return Stat::default();
        }
        let st: libc::stat = unsafe { core::ptr::read_unaligned(raw.as_ptr().cast()) };
        let mode = st.st_mode as u32;
        Stat {
            size: st.st_size as u64,
            mode,
            is_dir: mode & (libc::S_IFMT as u32) == libc::S_IFDIR as u32,
            mtime: st.st_mtime as i64,
        }
    }

    fn mkdir(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| ret_int(unsafe { libc::mkdir(c, 0o777) }))
    }

    fn rmdir(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| ret_int(unsafe { libc::rmdir(c) }))
    }

    fn unlink(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| ret_int(unsafe { libc::unlink(c) }))
    }

    fn getcwd(&self, buf: &mut [u8]) -> SysRet {
        let p = unsafe { libc::getcwd(buf.as_mut_ptr().cast(), buf.len()) };
        if p.is_null() {
            return SysRet::err(errno());
        }
        SysRet::ok(buf.iter().position(|&b| b == 0).unwrap_or(buf.len()))
    }

    fn chmod(&self, path: &[u8], mode: u32) -> SysRet {
        with_cpath(path, |c| ret_int(unsafe { libc::chmod(c, mode as libc::mode_t) }))
    }

    fn map_anon(&self, len: usize) -> SysRet {
        let p = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            SysRet::err(errno())
        } else {
            SysRet::ok(p as usize)
        }
    }

    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet {
        with_cpath(path, |c| {
            let d = unsafe { libc::opendir(c) };
            if d.is_null() {
                return SysRet::err(errno());
            }
            dir.handle = d as Handle;
            SysRet::ok(dir.handle as usize)
        })
    }

    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet {
        let d = dir.handle as *mut libc::DIR;
        let mut used = 0usize;
        loop {
            let pos = unsafe { libc::telldir(d) };
            let ent = unsafe { libc::readdir(d) };
            if ent.is_null() {
                break;
            }
            let (name, kind) = unsafe {
                let e = &*ent;
                (std::ffi::CStr::from_ptr(e.d_name.as_ptr()).to_bytes(), e.d_type)
            };
            let reclen = (DIRENT_HEADER + name.len() + 1 + 7) & !7;
            if used + reclen > buf.len() {
                if used == 0 {
                    return SysRet::err(libc::EINVAL);
                }
                unsafe { libc::seekdir(d, pos) };
                break;
            }
            let rec = &mut buf[used..used + reclen];
            rec.fill(0);
            rec[16..18].copy_from_slice(&(reclen as u16).to_le_bytes());
            rec[18] = if kind == libc::DT_DIR || kind == libc::DT_REG {
                kind
            } else if kind == libc::DT_LNK {
                libc::DT_LNK
            } else {
                DT_UNKNOWN
            };
            rec[DIRENT_HEADER..DIRENT_HEADER + name.len()].copy_from_slice(name);
            used += reclen;
        }
        SysRet::ok(used)
    }

    fn dir_close(&self, dir: &mut DirStream) -> SysRet {
        let r = ret_int(unsafe { libc::closedir(dir.handle as *mut libc::DIR) });
        dir.handle = super::INVALID_HANDLE;
        r
    }

    fn environ(&self) -> Result<RawBlock, i32> {
        Ok(RawBlock::Indexed(read_c_strings(unsafe { environ })))
    }

    fn argv(&self) -> Result<RawBlock, i32> {
        use std::os::unix::ffi::OsStrExt as _;
        Ok(RawBlock::Indexed(
            std::env::args_os()
                .map(|a| a.as_bytes().to_vec())
                .collect(),
        ))
    }

    fn stdio(&self, slot: u8) -> Handle {
        slot as Handle
    }

    fn exit(&self, code: i32) -> ! {
        unsafe { libc::_exit(code) }
    }

    fn classify(&self, code: i32) -> ErrorKind {
        match code {
            libc::ENOENT => ErrorKind::NotFound,
            libc::EEXIST => ErrorKind::AlreadyExists,
            libc::EACCES | libc::EPERM => ErrorKind::PermissionDenied,
            libc::EINTR => ErrorKind::Interrupted,
            libc::ENOSYS | libc::ENOTSUP => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

impl PosixProcess for Portable {
    fn pipe(&self) -> SysRet {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return SysRet::err(errno());
        }
        for fd in fds {
            unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
        }
        SysRet::ok2(fds[0] as usize, fds[1] as usize)
    }

    fn fork(&self) -> SysRet {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            SysRet::err(errno())
        } else {
            SysRet::ok(pid as usize)
        }
    }

    unsafe fn execve(
        &self,
        path: *const u8,
        argv: *const *const u8,
        envp: *const *const u8,
    ) -> SysRet {
        libc::execve(path.cast(), argv.cast(), envp.cast());
        SysRet::err(errno())
    }

    fn dup_to(&self, from: Handle, to: Handle) -> SysRet {
        ret_int(unsafe { libc::dup2(from as libc::c_int, to as libc::c_int) })
    }

    fn dup_above(&self, from: Handle, min: Handle) -> SysRet {
        ret_int(unsafe {
            libc::fcntl(
                from as libc::c_int,
                libc::F_DUPFD_CLOEXEC,
                min as libc::c_int,
            )
        })
    }

    fn wait(&self, pid: usize) -> SysRet {
        let mut status: libc::c_int = 0;
        loop {
            let r = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, 0) };
            if r < 0 {
                let e = errno();
                if e == libc::EINTR {
                    continue;
                }
                return SysRet::err(e);
            }
            return SysRet::ok2(r as usize, status as u32 as usize);
        }
    }
}
