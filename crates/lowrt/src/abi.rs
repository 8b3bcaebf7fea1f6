//! C ABI exported to compiled programs.
//!
//! Every address crossing this boundary is a native pointer-width word that
//! generated code obtained from the arena, from static data, or is null.
//! Invariant violations trap; OS failures come back as the `{r0, r1, err}`
//! triple with the raw code in `err`.

#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::arena::with_global;
use crate::array::{
    array_append, array_copy, array_data, array_elem_size, array_from_bytes, array_len,
    array_new, array_push, array_slice, element_addr,
};
use crate::error::Error;
use crate::layout::KeyKind;
use crate::mem::{self, trap, Addr, Fault, Memory, NativeMemory, NULL};
use crate::os::{env, Fs};
use crate::process::{native_launcher, Command, Launcher};
use crate::sys::{Native, Platform, SysRet};
use crate::table::{table_delete, table_get, table_new, table_set, Key};
use crate::text::{text_bytes, text_eq, text_load, text_new, text_store, Text};

/// `err` value of a child that exited nonzero; `r1` holds its code.
pub const LOWRT_ERR_EXIT: i32 = -1;
/// `err` value of a child ended by a signal; `r1` holds the signal.
pub const LOWRT_ERR_SIGNAL: i32 = -2;

/// Inline text value as generated code passes it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct rt_text {
    pub data: *const u8,
    pub len: usize,
}

impl rt_text {
    fn from_static(b: &'static [u8]) -> Self {
        rt_text {
            data: b.as_ptr(),
            len: b.len(),
        }
    }

    fn text(self) -> Text {
        Text::from_raw(self.data as Addr, self.len as u64)
    }

    unsafe fn as_bytes<'a>(self) -> &'a [u8] {
        if self.len == 0 {
            return &[];
        }
        if self.data.is_null() {
            fault(Fault::Null {
                len: self.len as u64,
            });
        }
        std::slice::from_raw_parts(self.data, self.len)
    }
}

fn fault(f: Fault) -> ! {
    trap(&f.to_string())
}

fn checked<T>(r: Result<T, Fault>) -> T {
    r.unwrap_or_else(|f| fault(f))
}

fn guarded<R>(f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| trap("internal panic"))
}

fn with_memory<R>(f: impl FnOnce(&mut NativeMemory<'_>) -> R) -> R {
    with_global(|arena| {
        let mut m = unsafe { NativeMemory::new(arena) };
        f(&mut m)
    })
}

fn failure(err: &Error) -> SysRet {
    match *err {
        Error::Os { code, .. } => SysRet::err(code),
        Error::Exit { code } => SysRet {
            r0: 0,
            r1: code as usize,
            err: LOWRT_ERR_EXIT,
        },
        Error::Signaled { signal } => SysRet {
            r0: 0,
            r1: signal as usize,
            err: LOWRT_ERR_SIGNAL,
        },
    }
}

fn key_kind(word: usize) -> KeyKind {
    KeyKind::from_word(word as u64)
        .unwrap_or_else(|| trap(&format!("invalid table key kind {word}")))
}

fn word_checked(addr: usize) {
    if addr == 0 {
        fault(Fault::Null {
            len: std::mem::size_of::<usize>() as u64,
        });
    }
}

/// Texts held by a header of inline `{data, len}` elements.
fn text_elements<M: Memory + ?Sized>(m: &M, hdr: Addr) -> Result<Vec<Vec<u8>>, Fault> {
    let l = m.layout();
    if hdr != NULL && array_elem_size(m, hdr) != l.text_size() {
        return Err(Fault::ElemSize {
            header: array_elem_size(m, hdr),
            given: l.text_size(),
        });
    }
    (0..array_len(m, hdr))
        .map(|i| text_bytes(m, text_load(m, element_addr(m, hdr, i)?)))
        .collect()
}

// -------------------------
// Memory primitives
// -------------------------

#[no_mangle]
pub extern "C" fn lowrt_alloc(size: usize) -> *mut u8 {
    guarded(|| with_global(|arena| arena.alloc(size)) as *mut u8)
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_mem_copy(dst: *mut u8, src: *const u8, n: usize) {
    guarded(|| with_memory(|m| checked(mem::copy(m, dst as Addr, src as Addr, n as u64))))
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_mem_zero(dst: *mut u8, n: usize) {
    guarded(|| with_memory(|m| checked(mem::zero(m, dst as Addr, n as u64))))
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_read_word(addr: usize) -> usize {
    word_checked(addr);
    (addr as *const usize).read_unaligned()
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_write_word(addr: usize, value: usize) {
    word_checked(addr);
    (addr as *mut usize).write_unaligned(value);
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_write_byte(addr: usize, value: u8) {
    if addr == 0 {
        fault(Fault::Null { len: 1 });
    }
    *(addr as *mut u8) = value;
}

// -------------------------
// Arrays and text
// -------------------------

#[no_mangle]
pub unsafe extern "C" fn lowrt_array_new(len: usize, elem_size: usize) -> usize {
    guarded(|| with_memory(|m| checked(array_new(m, len as u64, elem_size as u64)) as usize))
}

/// Push the `elem_size` bytes at `elem`; returns the (possibly new) header.
#[no_mangle]
pub unsafe extern "C" fn lowrt_array_push(hdr: usize, elem: *const u8, elem_size: usize) -> usize {
    guarded(|| {
        let bytes = rt_text {
            data: elem,
            len: elem_size,
        }
        .as_bytes()
        .to_vec();
        with_memory(|m| checked(array_push(m, hdr as Addr, &bytes)) as usize)
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_array_append(hdr: usize, src: usize) -> usize {
    guarded(|| with_memory(|m| checked(array_append(m, hdr as Addr, src as Addr)) as usize))
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_array_slice(hdr: usize, low: usize, high: usize) -> usize {
    guarded(|| {
        with_memory(|m| checked(array_slice(m, hdr as Addr, low as u64, high as u64)) as usize)
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_array_copy(dst: usize, src: usize) -> usize {
    guarded(|| with_memory(|m| checked(array_copy(m, dst as Addr, src as Addr)) as usize))
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_text_eq(a: rt_text, b: rt_text) -> bool {
    guarded(|| with_memory(|m| checked(text_eq(m, a.text(), b.text()))))
}

// -------------------------
// Tables
// -------------------------

#[no_mangle]
pub unsafe extern "C" fn lowrt_table_new(kind: usize) -> usize {
    guarded(|| with_memory(|m| table_new(m, key_kind(kind)) as usize))
}

/// `r0` = value, `r1` = 1 when the key was present.
#[no_mangle]
pub unsafe extern "C" fn lowrt_table_get(hdr: usize, kind: usize, k0: usize, k1: usize) -> SysRet {
    guarded(|| {
        let key = Key::from_words(key_kind(kind), k0 as u64, k1 as u64);
        match with_memory(|m| checked(table_get(m, hdr as Addr, key))) {
            Some(v) => SysRet::ok2(v as usize, 1),
            None => SysRet::ok2(0, 0),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_table_set(
    hdr: usize,
    kind: usize,
    k0: usize,
    k1: usize,
    value: usize,
) -> usize {
    guarded(|| {
        let key = Key::from_words(key_kind(kind), k0 as u64, k1 as u64);
        with_memory(|m| checked(table_set(m, hdr as Addr, key, value as u64)) as usize)
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_table_delete(hdr: usize, kind: usize, k0: usize, k1: usize) -> bool {
    guarded(|| {
        let key = Key::from_words(key_kind(kind), k0 as u64, k1 as u64);
        with_memory(|m| checked(table_delete(m, hdr as Addr, key)))
    })
}

// -------------------------
// Files and directories
// -------------------------

/// `r0` = byte-array header, `r1` = length.
#[no_mangle]
pub unsafe extern "C" fn lowrt_read_file(path: rt_text) -> SysRet {
    guarded(|| match Fs::native().read_file(path.as_bytes()) {
        Ok(data) => {
            let hdr = with_memory(|m| checked(array_from_bytes(m, &data, 1)));
            SysRet::ok2(hdr as usize, data.len())
        }
        Err(e) => failure(&e),
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_write_file(path: rt_text, data: rt_text) -> SysRet {
    guarded(|| match Fs::native().write_file(path.as_bytes(), data.as_bytes()) {
        Ok(()) => SysRet::ok(data.len),
        Err(e) => failure(&e),
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_mkdir_all(path: rt_text) -> SysRet {
    guarded(|| match Fs::native().mkdir_all(path.as_bytes()) {
        Ok(()) => SysRet::ok(0),
        Err(e) => failure(&e),
    })
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_remove_all(path: rt_text) -> SysRet {
    guarded(|| match Fs::native().remove_all(path.as_bytes()) {
        Ok(()) => SysRet::ok(0),
        Err(e) => failure(&e),
    })
}

/// `r0` = array of `{name: text, is_dir: word}` entries, `r1` = count.
#[no_mangle]
pub unsafe extern "C" fn lowrt_list_dir(path: rt_text) -> SysRet {
    guarded(|| {
        let entries = match Fs::native().list_dir(path.as_bytes()) {
            Ok(entries) => entries,
            Err(e) => return failure(&e),
        };
        let hdr = with_memory(|m| {
            let l = m.layout();
            let hdr = checked(array_new(m, entries.len() as u64, l.dir_entry_size()));
            for (i, e) in entries.iter().enumerate() {
                let at = checked(element_addr(m, hdr, i as u64));
                let name = text_new(m, &e.name);
                text_store(m, at, name);
                m.write_word(at + l.text_size(), e.is_dir as u64);
            }
            hdr
        });
        SysRet::ok2(hdr as usize, entries.len())
    })
}

// -------------------------
// Environment and arguments
// -------------------------

/// On success `out` points into the process-lifetime environment cache.
#[no_mangle]
pub unsafe extern "C" fn lowrt_env_get(key: rt_text, out: *mut rt_text) -> bool {
    guarded(|| match env::var(key.as_bytes()) {
        Some(v) => {
            if !out.is_null() {
                *out = rt_text::from_static(v);
            }
            true
        }
        None => false,
    })
}

#[no_mangle]
pub extern "C" fn lowrt_arg_count() -> usize {
    guarded(|| env::args().len())
}

#[no_mangle]
pub unsafe extern "C" fn lowrt_arg(index: usize, out: *mut rt_text) -> bool {
    guarded(|| match env::args().get(index) {
        Some(a) => {
            if !out.is_null() {
                *out = rt_text::from_static(a);
            }
            true
        }
        None => false,
    })
}

// -------------------------
// Processes
// -------------------------

/// Run `program` with the texts in array `args` as arguments after argv[0].
///
/// `vars` is null to inherit, or an array of `KEY=VALUE` texts. With
/// `capture`, `r0` holds a byte array of the child's standard output, also
/// when the child exits nonzero (`err == LOWRT_ERR_EXIT`, code in `r1`).
#[no_mangle]
pub unsafe extern "C" fn lowrt_spawn(
    program: rt_text,
    args: usize,
    vars: usize,
    capture: bool,
) -> SysRet {
    guarded(|| {
        let mut cmd = Command::new(program.as_bytes());
        let (args, vars) = with_memory(|m| {
            let args = checked(text_elements(m, args as Addr));
            let vars = (vars != 0).then(|| checked(text_elements(m, vars as Addr)));
            (args, vars)
        });
        cmd.args(&args);
        if let Some(vars) = vars {
            cmd.env_clear();
            for entry in &vars {
                if let Some((k, v)) = env::split_entry(entry) {
                    cmd.env(k, v);
                }
            }
        }

        let out = match native_launcher().launch(&cmd, capture) {
            Ok(out) => out,
            Err(e) => return failure(&e),
        };
        let hdr = if capture {
            with_memory(|m| checked(array_from_bytes(m, &out.stdout, 1))) as usize
        } else {
            0
        };
        match out.status() {
            Ok(()) => SysRet::ok(hdr),
            Err(e) => SysRet {
                r0: hdr,
                ..failure(&e)
            },
        }
    })
}

#[no_mangle]
pub extern "C" fn lowrt_exit(code: i32) -> ! {
    Native.exit(code)
}

/// Data pointer of an array header, for generated code that indexes directly.
#[no_mangle]
pub unsafe extern "C" fn lowrt_array_data(hdr: usize) -> usize {
    guarded(|| with_memory(|m| array_data(m, hdr as Addr) as usize))
}
