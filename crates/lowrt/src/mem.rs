//! Raw memory primitives and the address-space abstraction containers are
//! written against.

use lowrt_targets::WordWidth;

use crate::arena::{Arena, OsRegions, RegionSource};
use crate::layout::{KeyKind, Layout};
use crate::sys::{Native, Platform};

/// Address within a [`Memory`]. Zero is null.
pub type Addr = u64;

pub const NULL: Addr = 0;

/// Process exit status after a trap.
pub const TRAP_EXIT_CODE: i32 = 1;

/// Invariant violation in generated code's use of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("null address with length {len}")]
    Null { len: u64 },
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: u64, len: u64 },
    #[error("element size {given} does not match array element size {header}")]
    ElemSize { header: u64, given: u64 },
    #[error("{} key used on a table keyed by {}", .given.as_str(), .table.as_str())]
    KeyKind { table: KeyKind, given: KeyKind },
    #[error("value {value} does not fit in a {bytes}-byte word")]
    WordOverflow { value: u64, bytes: u64 },
}

/// `value` unchanged if it fits in one word of `width`.
pub fn fit_word(width: WordWidth, value: u64) -> Result<u64, Fault> {
    if value > width.max_value() {
        return Err(Fault::WordOverflow {
            value,
            bytes: width.bytes(),
        });
    }
    Ok(value)
}

/// A flat, byte-addressed, zero-initialised address space of one word width.
///
/// Methods take addresses on trust: callers guarantee every range they
/// touch was handed out by [`Memory::alloc`] or is otherwise valid.
pub trait Memory {
    fn width(&self) -> WordWidth;

    /// Zero-filled block, aligned to 8. Never returned.
    fn alloc(&mut self, size: u64) -> Addr;

    fn load(&self, addr: Addr, out: &mut [u8]);
    fn store(&mut self, addr: Addr, bytes: &[u8]);
    /// Overlap-safe move of `n` bytes.
    fn move_bytes(&mut self, dst: Addr, src: Addr, n: u64);
    fn fill_zero(&mut self, addr: Addr, n: u64);

    fn read_word(&self, addr: Addr) -> u64;
    fn write_word(&mut self, addr: Addr, value: u64);

    fn layout(&self) -> Layout {
        Layout::new(self.width())
    }

    fn word(&self) -> u64 {
        self.width().bytes()
    }

    fn read_byte(&self, addr: Addr) -> u8 {
        let mut b = [0u8; 1];
        self.load(addr, &mut b);
        b[0]
    }

    fn write_byte(&mut self, addr: Addr, value: u8) {
        self.store(addr, &[value]);
    }

    fn read_vec(&self, addr: Addr, len: u64) -> Vec<u8> {
        let mut out = vec![0u8; len as usize];
        if len != 0 {
            self.load(addr, &mut out);
        }
        out
    }
}

/// Copy `n` bytes; a null address with nonzero `n` is a fault.
pub fn copy<M: Memory + ?Sized>(m: &mut M, dst: Addr, src: Addr, n: u64) -> Result<(), Fault> {
    if n == 0 {
        return Ok(());
    }
    if dst == NULL || src == NULL {
        return Err(Fault::Null { len: n });
    }
    m.move_bytes(dst, src, n);
    Ok(())
}

/// Zero `n` bytes; a null address with nonzero `n` is a fault.
pub fn zero<M: Memory + ?Sized>(m: &mut M, addr: Addr, n: u64) -> Result<(), Fault> {
    if n == 0 {
        return Ok(());
    }
    if addr == NULL {
        return Err(Fault::Null { len: n });
    }
    m.fill_zero(addr, n);
    Ok(())
}

/// Write a diagnostic to the error stream and end the process with
/// [`TRAP_EXIT_CODE`].
pub fn trap(msg: &str) -> ! {
    let line = format!("lowrt: fatal: {msg}\n");
    let err = Native.stdio(2);
    let mut rest = line.as_bytes();
    while !rest.is_empty() {
        let r = Native.write(err, rest);
        if !r.is_ok() || r.r0 == 0 {
            break;
        }
        rest = &rest[r.r0.min(rest.len())..];
    }
    Native.exit(TRAP_EXIT_CODE)
}

/// The host's own address space, allocating from an [`Arena`].
pub struct NativeMemory<'a, S: RegionSource = OsRegions> {
    arena: &'a mut Arena<S>,
}

impl<'a, S: RegionSource> NativeMemory<'a, S> {
    /// # Safety
    /// Every address later passed to this value's [`Memory`] methods must be
    /// valid for the access, exactly as for the raw pointer it is cast to.
    pub unsafe fn new(arena: &'a mut Arena<S>) -> Self {
        NativeMemory { arena }
    }

    pub fn arena(&self) -> &Arena<S> {
        self.arena
    }
}

impl<S: RegionSource> Memory for NativeMemory<'_, S> {
    fn width(&self) -> WordWidth {
        WordWidth::host()
    }

    fn alloc(&mut self, size: u64) -> Addr {
        let size = usize::try_from(size)
            .unwrap_or_else(|_| trap("allocation size exceeds the address space"));
        self.arena.alloc(size) as Addr
    }

    fn load(&self, addr: Addr, out: &mut [u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(addr as usize as *const u8, out.as_mut_ptr(), out.len())
        }
    }

    fn store(&mut self, addr: Addr, bytes: &[u8]) {
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as usize as *mut u8, bytes.len())
        }
    }

    fn move_bytes(&mut self, dst: Addr, src: Addr, n: u64) {
        unsafe {
            core::ptr::copy(
                src as usize as *const u8,
                dst as usize as *mut u8,
                n as usize,
            )
        }
    }

    fn fill_zero(&mut self, addr: Addr, n: u64) {
        unsafe { core::ptr::write_bytes(addr as usize as *mut u8, 0, n as usize) }
    }

    fn read_word(&self, addr: Addr) -> u64 {
        unsafe { core::ptr::read_unaligned(addr as usize as *const usize) as u64 }
    }

    fn write_word(&mut self, addr: Addr, value: u64) {
        unsafe { core::ptr::write_unaligned(addr as usize as *mut usize, value as usize) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::HeapRegions;

    #[test]
    fn null_with_nonzero_length_faults() {
        let mut arena = Arena::with_min_region(HeapRegions, 4096);
        let mut m = unsafe { NativeMemory::new(&mut arena) };
        let a = m.alloc(16);
        assert_eq!(copy(&mut m, NULL, a, 4), Err(Fault::Null { len: 4 }));
        assert_eq!(copy(&mut m, a, NULL, 1), Err(Fault::Null { len: 1 }));
        assert_eq!(zero(&mut m, NULL, 2), Err(Fault::Null { len: 2 }));
        assert_eq!(copy(&mut m, NULL, NULL, 0), Ok(()));
        assert_eq!(zero(&mut m, NULL, 0), Ok(()));
    }

    #[test]
    fn native_words_and_overlapping_moves() {
        let mut arena = Arena::with_min_region(HeapRegions, 4096);
        let mut m = unsafe { NativeMemory::new(&mut arena) };
        let a = m.alloc(32);
        m.write_word(a, 0x1234);
        assert_eq!(m.read_word(a), 0x1234);

        m.store(a, b"abcdefgh");
        copy(&mut m, a + 2, a, 6).expect("copy");
        assert_eq!(m.read_vec(a, 8), b"ababcdef");

        zero(&mut m, a, 3).expect("zero");
        assert_eq!(m.read_byte(a + 2), 0);
        assert_eq!(m.read_byte(a + 3), b'b');
    }

    #[test]
    fn fault_messages_name_the_violation() {
        let f = Fault::KeyKind {
            table: KeyKind::Int,
            given: KeyKind::Text,
        };
        assert_eq!(f.to_string(), "text key used on a table keyed by int");
    }
}
