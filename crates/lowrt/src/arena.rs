//! Bump allocator over coarse, never-returned regions.
//!
//! Regions come from a [`RegionSource`]; blocks are carved sequentially and
//! never freed. Regions that are no longer current stay mapped for the life
//! of the process.

use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::config;
use crate::sys::{Native, Platform};

/// Allocation granularity and alignment of every block.
pub const ALIGN: u64 = 8;

pub fn align_up(n: u64) -> Option<u64> {
    n.checked_add(ALIGN - 1).map(|v| v & !(ALIGN - 1))
}

/// Free-pointer / region-end pair. Invariant: `next <= end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bump {
    next: u64,
    end: u64,
}

impl Bump {
    /// Carve `size` bytes from the current region, if they fit.
    pub fn carve(&mut self, size: u64) -> Option<u64> {
        if self.end == 0 || size > self.end - self.next {
            return None;
        }
        let at = self.next;
        self.next += size;
        Some(at)
    }

    /// Make `[base, base + len)` the current region.
    pub fn restart(&mut self, base: u64, len: u64) {
        self.next = base;
        self.end = base + len;
    }

    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }
}

/// Supplier of zero-filled regions that are never given back.
pub trait RegionSource {
    /// Base address of a fresh zero-filled region of at least `len` bytes.
    fn acquire(&mut self, len: usize) -> Option<usize>;
}

/// Regions from the platform's anonymous mapping call.
#[derive(Debug, Default)]
pub struct OsRegions;

impl RegionSource for OsRegions {
    fn acquire(&mut self, len: usize) -> Option<usize> {
        let r = Native.map_anon(len);
        if r.is_ok() && r.r0 != 0 {
            Some(r.r0)
        } else {
            tracing::debug!(len, err = r.err, "anonymous mapping failed");
            None
        }
    }
}

/// Zeroed heap pages, leaked on purpose.
#[derive(Debug, Default)]
pub struct HeapRegions;

impl RegionSource for HeapRegions {
    fn acquire(&mut self, len: usize) -> Option<usize> {
        let layout = std::alloc::Layout::from_size_align(len.max(1), 16).ok()?;
        let p = unsafe { std::alloc::alloc_zeroed(layout) };
        if p.is_null() {
            None
        } else {
            Some(p as usize)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub regions: u64,
    pub reserved: u64,
    pub allocated: u64,
}

#[derive(Debug)]
pub struct Arena<S: RegionSource = OsRegions> {
    source: S,
    bump: Bump,
    min_region: usize,
    stats: ArenaStats,
}

impl<S: RegionSource> Arena<S> {
    pub fn new(source: S) -> Self {
        Self::with_min_region(source, config::config().arena_min_region)
    }

    pub fn with_min_region(source: S, min_region: usize) -> Self {
        Arena {
            source,
            bump: Bump::default(),
            min_region: min_region.max(ALIGN as usize),
            stats: ArenaStats::default(),
        }
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    /// Zero-filled block of `size` bytes (rounded up to [`ALIGN`]), or `None`
    /// when the region source fails.
    pub fn try_alloc(&mut self, size: usize) -> Option<usize> {
        let size = align_up(size as u64)?;
        if let Some(at) = self.bump.carve(size) {
            self.stats.allocated += size;
            return Some(at as usize);
        }
        let len = (size as usize).max(self.min_region);
        let base = self.source.acquire(len)?;
        tracing::debug!(len, base, "arena acquired region");
        self.stats.regions += 1;
        self.stats.reserved += len as u64;
        self.bump.restart(base as u64, len as u64);
        let at = self.bump.carve(size)?;
        self.stats.allocated += size;
        Some(at as usize)
    }

    /// Like [`Arena::try_alloc`], but a failed region acquisition ends the
    /// process.
    pub fn alloc(&mut self, size: usize) -> usize {
        match self.try_alloc(size) {
            Some(at) => at,
            None => crate::mem::trap("arena: region acquisition failed"),
        }
    }
}

static GLOBAL: OnceCell<Mutex<Arena<OsRegions>>> = OnceCell::new();

/// Run `f` against the process-wide arena, creating it on first use.
pub fn with_global<R>(f: impl FnOnce(&mut Arena<OsRegions>) -> R) -> R {
    let cell = GLOBAL.get_or_init(|| Mutex::new(Arena::new(OsRegions)));
    let mut guard = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap_arena(min_region: usize) -> Arena<HeapRegions> {
        Arena::with_min_region(HeapRegions, min_region)
    }

    #[test]
    fn blocks_are_aligned_disjoint_and_zeroed() {
        let mut arena = heap_arena(4096);
        let mut prev: Option<(usize, usize)> = None;
        for size in [1usize, 7, 8, 9, 100, 3] {
            let at = arena.alloc(size);
            assert_eq!(at % ALIGN as usize, 0);
            let block = unsafe { std::slice::from_raw_parts(at as *const u8, size) };
            assert!(block.iter().all(|&b| b == 0));
            if let Some((p, psize)) = prev {
                assert!(at >= p + psize || at + size <= p, "blocks overlap");
            }
            unsafe { std::ptr::write_bytes(at as *mut u8, 0xAB, size) };
            prev = Some((at, size));
        }
    }

    #[test]
    fn oversized_request_gets_its_own_region() {
        let mut arena = heap_arena(4096);
        arena.alloc(16);
        arena.alloc(10_000);
        let stats = arena.stats();
        assert_eq!(stats.regions, 2);
        assert_eq!(stats.reserved, 4096 + 10_000);
        assert_eq!(stats.allocated, 16 + 10_000);
    }

    #[test]
    fn exhausted_region_is_replaced_not_extended() {
        let mut arena = heap_arena(64);
        let a = arena.alloc(48);
        let b = arena.alloc(24);
        assert_ne!(a + 48, b, "second block cannot fit in the first region");
        assert_eq!(arena.stats().regions, 2);
    }

    #[test]
    fn failing_source_reports_none() {
        struct Dry;
        impl RegionSource for Dry {
            fn acquire(&mut self, _len: usize) -> Option<usize> {
                None
            }
        }
        let mut arena = Arena::with_min_region(Dry, 4096);
        assert_eq!(arena.try_alloc(8), None);
        assert_eq!(arena.stats(), ArenaStats::default());
    }

    #[test]
    fn global_arena_serves_os_memory() {
        let (a, b) = with_global(|arena| (arena.alloc(24), arena.alloc(24)));
        assert_ne!(a, b);
        assert_eq!(a % 8, 0);
        let zeroed = unsafe { std::slice::from_raw_parts(b as *const u8, 24) };
        assert!(zeroed.iter().all(|&x| x == 0));
    }
}
