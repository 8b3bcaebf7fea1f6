//! Windows backend: kernel32 entry points (ANSI forms), declared by hand.
//!
//! Directory reads hand out raw `WIN32_FIND_DATAA` records; the first read
//! of a stream issues `FindFirstFileA` with the pattern stored at open time.

use core::ffi::c_void;

use lowrt_targets::DirentFormat;

use super::{
    cpath, le_u32, DirStream, Handle, OpenMode, Platform, RawBlock, Stat, SysRet, Win32Process,
    INVALID_HANDLE,
};
use crate::error::ErrorKind;

type Bool = i32;
type Dword = u32;
type RawHandle = *mut c_void;

const GENERIC_READ: Dword = 0x8000_0000;
const GENERIC_WRITE: Dword = 0x4000_0000;
const FILE_APPEND_DATA: Dword = 0x0004;
const FILE_SHARE_READ: Dword = 0x1;
const FILE_SHARE_WRITE: Dword = 0x2;
const FILE_SHARE_DELETE: Dword = 0x4;
const CREATE_ALWAYS: Dword = 2;
const OPEN_EXISTING: Dword = 3;
const OPEN_ALWAYS: Dword = 4;
const FILE_ATTRIBUTE_NORMAL: Dword = 0x80;
const FILE_ATTRIBUTE_READONLY: Dword = 0x1;
const FILE_ATTRIBUTE_DIRECTORY: Dword = 0x10;
const INVALID_FILE_ATTRIBUTES: Dword = 0xFFFF_FFFF;
const FILE_END: Dword = 2;

const MEM_COMMIT: Dword = 0x1000;
const MEM_RESERVE: Dword = 0x2000;
const PAGE_READWRITE: Dword = 0x04;

const STD_INPUT_HANDLE: Dword = -10i32 as Dword;
const STD_OUTPUT_HANDLE: Dword = -11i32 as Dword;
const STD_ERROR_HANDLE: Dword = -12i32 as Dword;

const HANDLE_FLAG_INHERIT: Dword = 0x1;
const STARTF_USESTDHANDLES: Dword = 0x100;
const INFINITE: Dword = 0xFFFF_FFFF;
const WAIT_FAILED: Dword = 0xFFFF_FFFF;

const ERROR_FILE_NOT_FOUND: i32 = 2;
const ERROR_PATH_NOT_FOUND: i32 = 3;
const ERROR_ACCESS_DENIED: i32 = 5;
const ERROR_NO_MORE_FILES: i32 = 18;
const ERROR_FILE_EXISTS: i32 = 80;
const ERROR_INVALID_PARAMETER: i32 = 87;
const ERROR_BROKEN_PIPE: i32 = 109;
const ERROR_CALL_NOT_IMPLEMENTED: i32 = 120;
const ERROR_ALREADY_EXISTS: i32 = 183;
const ERROR_OPERATION_ABORTED: i32 = 995;

/// `WIN32_FILE_ATTRIBUTE_DATA`: attrs, three FILETIMEs, size high/low.
const ATTR_DATA_LEN: usize = 36;
/// `WIN32_FIND_DATAA` including the trailing alternate name.
const FIND_DATA_LEN: usize = 320;

const UNIX_EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

#[repr(C)]
struct SecurityAttributes {
    length: Dword,
    descriptor: *mut c_void,
    inherit: Bool,
}

#[repr(C)]
struct StartupInfoA {
    cb: Dword,
    reserved: *mut u8,
    desktop: *mut u8,
    title: *mut u8,
    x: Dword,
    y: Dword,
    x_size: Dword,
    y_size: Dword,
    x_count_chars: Dword,
    y_count_chars: Dword,
    fill_attribute: Dword,
    flags: Dword,
    show_window: u16,
    reserved2_len: u16,
    reserved2: *mut u8,
    std_input: RawHandle,
    std_output: RawHandle,
    std_error: RawHandle,
}

#[repr(C)]
struct ProcessInformation {
    process: RawHandle,
    thread: RawHandle,
    process_id: Dword,
    thread_id: Dword,
}

#[link(name = "kernel32")]
extern "system" {
    fn CreateFileA(
        name: *const u8,
        access: Dword,
        share: Dword,
        security: *mut SecurityAttributes,
        disposition: Dword,
        flags: Dword,
        template: RawHandle,
    ) -> RawHandle;
    fn ReadFile(
        h: RawHandle,
        buf: *mut u8,
        len: Dword,
        read: *mut Dword,
        overlapped: *mut c_void,
    ) -> Bool;
    fn WriteFile(
        h: RawHandle,
        buf: *const u8,
        len: Dword,
        written: *mut Dword,
        overlapped: *mut c_void,
    ) -> Bool;
    fn SetFilePointer(h: RawHandle, low: i32, high: *mut i32, method: Dword) -> Dword;
    fn CloseHandle(h: RawHandle) -> Bool;
    fn GetFileAttributesExA(name: *const u8, level: i32, info: *mut u8) -> Bool;
    fn GetFileAttributesA(name: *const u8) -> Dword;
    fn SetFileAttributesA(name: *const u8, attrs: Dword) -> Bool;
    fn CreateDirectoryA(name: *const u8, security: *mut SecurityAttributes) -> Bool;
    fn RemoveDirectoryA(name: *const u8) -> Bool;
    fn DeleteFileA(name: *const u8) -> Bool;
    fn GetCurrentDirectoryA(len: Dword, buf: *mut u8) -> Dword;
    fn VirtualAlloc(addr: *mut c_void, size: usize, kind: Dword, protect: Dword) -> *mut c_void;
    fn FindFirstFileA(pattern: *const u8, data: *mut u8) -> RawHandle;
    fn FindNextFileA(h: RawHandle, data: *mut u8) -> Bool;
    fn FindClose(h: RawHandle) -> Bool;
    fn GetEnvironmentStringsA() -> *mut u8;
    fn FreeEnvironmentStringsA(block: *mut u8) -> Bool;
    fn GetCommandLineA() -> *const u8;
    fn GetStdHandle(which: Dword) -> RawHandle;
    fn GetLastError() -> Dword;
    fn ExitProcess(code: u32) -> !;
    fn CreatePipe(
        read: *mut RawHandle,
        write: *mut RawHandle,
        security: *mut SecurityAttributes,
        size: Dword,
    ) -> Bool;
    fn SetHandleInformation(h: RawHandle, mask: Dword, flags: Dword) -> Bool;
    fn CreateProcessA(
        app: *const u8,
        cmdline: *mut u8,
        process_security: *mut SecurityAttributes,
        thread_security: *mut SecurityAttributes,
        inherit: Bool,
        flags: Dword,
        env: *mut c_void,
        cwd: *const u8,
        startup: *mut StartupInfoA,
        info: *mut ProcessInformation,
    ) -> Bool;
    fn WaitForSingleObject(h: RawHandle, millis: Dword) -> Dword;
    fn GetExitCodeProcess(h: RawHandle, code: *mut Dword) -> Bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

fn last_error() -> SysRet {
    SysRet::err(unsafe { GetLastError() } as i32)
}

fn bool_ret(ok: Bool) -> SysRet {
    if ok != 0 {
        SysRet::ok(0)
    } else {
        last_error()
    }
}

fn raw(h: Handle) -> RawHandle {
    h as RawHandle
}

fn is_invalid(h: RawHandle) -> bool {
    h.is_null() || h as isize == INVALID_HANDLE
}

fn with_cpath(path: &[u8], f: impl FnOnce(*const u8) -> SysRet) -> SysRet {
    match cpath(path) {
        Some(c) => f(c.as_ptr()),
        None => SysRet::err(ERROR_INVALID_PARAMETER),
    }
}

/// Search pattern for a directory: `dir\*`, keeping an existing separator.
fn find_pattern(path: &[u8]) -> Vec<u8> {
    let mut p = path.to_vec();
    if !matches!(p.last(), Some(b'\\') | Some(b'/') | None) {
        p.push(b'\\');
    }
    p.push(b'*');
    p
}

fn c_str_len(mut p: *const u8) -> usize {
    let mut n = 0;
    unsafe {
        while *p != 0 {
            n += 1;
            p = p.add(1);
        }
    }
    n
}

impl Platform for Windows {
    const DIRENT: DirentFormat = DirentFormat::Win32FindDataA;
    const STAT_LEN: usize = ATTR_DATA_LEN;

    fn read(&self, h: Handle, buf: &mut [u8]) -> SysRet {
        let mut n: Dword = 0;
        let len = buf.len().min(Dword::MAX as usize) as Dword;
        let ok = unsafe { ReadFile(raw(h), buf.as_mut_ptr(), len, &mut n, core::ptr::null_mut()) };
        if ok != 0 {
            return SysRet::ok(n as usize);
        }
        let r = last_error();
        // A pipe whose writers have all closed reads as end of stream.
        if r.err == ERROR_BROKEN_PIPE {
            SysRet::ok(0)
        } else {
            r
        }
    }

    fn write(&self, h: Handle, buf: &[u8]) -> SysRet {
        let mut n: Dword = 0;
        let len = buf.len().min(Dword::MAX as usize) as Dword;
        let ok = unsafe { WriteFile(raw(h), buf.as_ptr(), len, &mut n, core::ptr::null_mut()) };
        if ok != 0 {
            SysRet::ok(n as usize)
        } else {
            last_error()
        }
    }

    fn open(&self, path: &[u8], mode: OpenMode) -> SysRet {
        let (access, disposition) = match mode {
            OpenMode::Read => (GENERIC_READ, OPEN_EXISTING),
            OpenMode::Write => (GENERIC_WRITE, CREATE_ALWAYS),
            OpenMode::Append => (FILE_APPEND_DATA, OPEN_ALWAYS),
        };
        with_cpath(path, |c| {
            let h = unsafe {
                CreateFileA(
                    c,
                    access,
                    FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                    core::ptr::null_mut(),
                    disposition,
                    FILE_ATTRIBUTE_NORMAL,
                    core::ptr::null_mut(),
                )
            };
            if is_invalid(h) {
                return last_error();
            }
            if mode == OpenMode::Append {
                unsafe { SetFilePointer(h, 0, core::ptr::null_mut(), FILE_END) };
            }
            SysRet::ok(h as usize)
        })
    }

    fn close(&self, h: Handle) -> SysRet {
        bool_ret(unsafe { CloseHandle(raw(h)) })
    }

    fn stat(&self, path: &[u8], raw_out: &mut [u8]) -> SysRet {
        if raw_out.len() < ATTR_DATA_LEN {
            return SysRet::err(ERROR_INVALID_PARAMETER);
        }
        with_cpath(path, |c| {
            let ok = unsafe { GetFileAttributesExA(c, 0, raw_out.as_mut_ptr()) };
            if ok != 0 {
                SysRet::ok(ATTR_DATA_LEN)
            } else {
                last_error()
            }
        })
    }

    fn decode_stat(raw: &[u8]) -> Stat {
        let attrs = le_u32(raw, 0).unwrap_or(0);
        let write_lo = le_u32(raw, 20).unwrap_or(0) as u64;
        let write_hi = le_u32(raw, 24).unwrap_or(0) as u64;
        let size_hi = le_u32(raw, 28).unwrap_or(0) as u64;
        let size_lo = le_u32(raw, 32).unwrap_or(0) as u64;
        let filetime = (write_hi << 32) | write_lo;
        let is_dir = attrs & FILE_ATTRIBUTE_DIRECTORY != 0;
        let mut mode = if is_dir { 0o040000 | 0o777 } else { 0o100000 | 0o666 };
        if attrs & FILE_ATTRIBUTE_READONLY != 0 {
            mode &= !0o222;
        }
        Stat {
            size: (size_hi << 32) | size_lo,
            mode,
            is_dir,
            mtime: (filetime.saturating_sub(UNIX_EPOCH_AS_FILETIME) / 10_000_000) as i64,
        }
    }

    fn mkdir(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| bool_ret(unsafe { CreateDirectoryA(c, core::ptr::null_mut()) }))
    }

    fn rmdir(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| bool_ret(unsafe { RemoveDirectoryA(c) }))
    }

    fn unlink(&self, path: &[u8]) -> SysRet {
        with_cpath(path, |c| bool_ret(unsafe { DeleteFileA(c) }))
    }

    fn getcwd(&self, buf: &mut [u8]) -> SysRet {
        let len = buf.len().min(Dword::MAX as usize) as Dword;
        let n = unsafe { GetCurrentDirectoryA(len, buf.as_mut_ptr()) };
        if n == 0 {
            last_error()
        } else if n >= len {
            SysRet::err(ERROR_INVALID_PARAMETER)
        } else {
            SysRet::ok(n as usize)
        }
    }

    /// Only the owner-write bit maps onto anything: it clears or sets the
    /// read-only attribute.
    fn chmod(&self, path: &[u8], mode: u32) -> SysRet {
        with_cpath(path, |c| {
            let attrs = unsafe { GetFileAttributesA(c) };
            if attrs == INVALID_FILE_ATTRIBUTES {
                return last_error();
            }
            let attrs = if mode & 0o200 != 0 {
                attrs & !FILE_ATTRIBUTE_READONLY
            } else {
                attrs | FILE_ATTRIBUTE_READONLY
            };
            bool_ret(unsafe { SetFileAttributesA(c, attrs) })
        })
    }

    fn map_anon(&self, len: usize) -> SysRet {
        let p = unsafe {
            VirtualAlloc(
                core::ptr::null_mut(),
                len,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_READWRITE,
            )
        };
        if p.is_null() {
            last_error()
        } else {
            SysRet::ok(p as usize)
        }
    }

    fn dir_open(&self, path: &[u8], dir: &mut DirStream) -> SysRet {
        let attrs = match cpath(path) {
            Some(c) => unsafe { GetFileAttributesA(c.as_ptr()) },
            None => return SysRet::err(ERROR_INVALID_PARAMETER),
        };
        if attrs == INVALID_FILE_ATTRIBUTES {
            return last_error();
        }
        if attrs & FILE_ATTRIBUTE_DIRECTORY == 0 {
            return SysRet::err(ERROR_PATH_NOT_FOUND);
        }
        dir.pattern = find_pattern(path);
        dir.pattern.push(0);
        dir.started = false;
        dir.done = false;
        dir.handle = INVALID_HANDLE;
        SysRet::ok(0)
    }

    fn dir_read(&self, dir: &mut DirStream, buf: &mut [u8]) -> SysRet {
        let mut used = 0usize;
        while !dir.done && used + FIND_DATA_LEN <= buf.len() {
            let rec = buf[used..used + FIND_DATA_LEN].as_mut_ptr();
            if !dir.started {
                dir.started = true;
                let h = unsafe { FindFirstFileA(dir.pattern.as_ptr(), rec) };
                if is_invalid(h) {
                    let r = last_error();
                    if r.err == ERROR_FILE_NOT_FOUND {
                        dir.done = true;
                        break;
                    }
                    return r;
                }
                dir.handle = h as Handle;
            } else if unsafe { FindNextFileA(raw(dir.handle), rec) } == 0 {
                let r = last_error();
                if r.err == ERROR_NO_MORE_FILES {
                    dir.done = true;
                    break;
                }
                return r;
            }
            used += FIND_DATA_LEN;
        }
        if used == 0 && !dir.done {
            return SysRet::err(ERROR_INVALID_PARAMETER);
        }
        SysRet::ok(used)
    }

    fn dir_close(&self, dir: &mut DirStream) -> SysRet {
        let r = if dir.handle != INVALID_HANDLE {
            bool_ret(unsafe { FindClose(raw(dir.handle)) })
        } else {
            SysRet::ok(0)
        };
        dir.handle = INVALID_HANDLE;
        r
    }

    fn environ(&self) -> Result<RawBlock, i32> {
        let p = unsafe { GetEnvironmentStringsA() };
        if p.is_null() {
            return Err(unsafe { GetLastError() } as i32);
        }
        let mut len = 0usize;
        unsafe {
            while !(*p.add(len) == 0 && *p.add(len + 1) == 0) {
                len += 1;
            }
        }
        let block = unsafe { core::slice::from_raw_parts(p, len + 2) }.to_vec();
        unsafe { FreeEnvironmentStringsA(p) };
        Ok(RawBlock::DoubleNul(block))
    }

    fn argv(&self) -> Result<RawBlock, i32> {
        let p = unsafe { GetCommandLineA() };
        if p.is_null() {
            return Ok(RawBlock::Indexed(Vec::new()));
        }
        let line = unsafe { core::slice::from_raw_parts(p, c_str_len(p)) };
        Ok(RawBlock::Indexed(crate::process::cmdline::split_command_line(line)))
    }

    fn stdio(&self, slot: u8) -> Handle {
        let which = match slot {
            0 => STD_INPUT_HANDLE,
            1 => STD_OUTPUT_HANDLE,
            _ => STD_ERROR_HANDLE,
        };
        unsafe { GetStdHandle(which) as Handle }
    }

    fn exit(&self, code: i32) -> ! {
        unsafe { ExitProcess(code as u32) }
    }

    fn classify(&self, code: i32) -> ErrorKind {
        match code {
            ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => ErrorKind::NotFound,
            ERROR_ALREADY_EXISTS | ERROR_FILE_EXISTS => ErrorKind::AlreadyExists,
            ERROR_ACCESS_DENIED => ErrorKind::PermissionDenied,
            ERROR_OPERATION_ABORTED => ErrorKind::Interrupted,
            ERROR_CALL_NOT_IMPLEMENTED => ErrorKind::Unsupported,
            _ => ErrorKind::Other,
        }
    }
}

impl Win32Process for Windows {
    fn create_pipe(&self) -> SysRet {
        let mut sa = SecurityAttributes {
            length: core::mem::size_of::<SecurityAttributes>() as Dword,
            descriptor: core::ptr::null_mut(),
            inherit: 1,
        };
        let mut r: RawHandle = core::ptr::null_mut();
        let mut w: RawHandle = core::ptr::null_mut();
        if unsafe { CreatePipe(&mut r, &mut w, &mut sa, 0) } == 0 {
            return last_error();
        }
        // Only the child's end stays inheritable.
        if unsafe { SetHandleInformation(r, HANDLE_FLAG_INHERIT, 0) } == 0 {
            let e = last_error();
            unsafe {
                CloseHandle(r);
                CloseHandle(w);
            }
            return e;
        }
        SysRet::ok2(r as usize, w as usize)
    }

    fn create_process(
        &self,
        app: &[u8],
        cmdline: &mut [u8],
        env_block: Option<&[u8]>,
        stdio: Option<[Handle; 3]>,
    ) -> SysRet {
        let mut si: StartupInfoA = unsafe { core::mem::zeroed() };
        si.cb = core::mem::size_of::<StartupInfoA>() as Dword;
        if let Some([i, o, e]) = stdio {
            si.flags = STARTF_USESTDHANDLES;
            si.std_input = raw(i);
            si.std_output = raw(o);
            si.std_error = raw(e);
        }
        let mut pi: ProcessInformation = unsafe { core::mem::zeroed() };
        let env = env_block.map_or(core::ptr::null_mut(), |b| b.as_ptr() as *mut c_void);
        let ok = unsafe {
            CreateProcessA(
                app.as_ptr(),
                cmdline.as_mut_ptr(),
                core::ptr::null_mut(),
                core::ptr::null_mut(),
                stdio.is_some() as Bool,
                0,
                env,
                core::ptr::null(),
                &mut si,
                &mut pi,
            )
        };
        if ok == 0 {
            return last_error();
        }
        SysRet::ok2(pi.process as usize, pi.thread as usize)
    }

    fn wait_process(&self, process: Handle) -> SysRet {
        if unsafe { WaitForSingleObject(raw(process), INFINITE) } == WAIT_FAILED {
            return last_error();
        }
        let mut code: Dword = 0;
        if unsafe { GetExitCodeProcess(raw(process), &mut code) } == 0 {
            return last_error();
        }
        SysRet::ok(code as usize)
    }
}
