//! Little-endian target images for a word width other than the host's.
//!
//! An image is one flat address space starting at 0 (reserved as null) and
//! growing region by region, carved with the same bump rule as the arena.
//! Running out of addresses is the image's unrecoverable condition.

use lowrt_targets::WordWidth;

use crate::arena::{align_up, Bump, ALIGN};
use crate::mem::{Addr, Memory};

#[derive(Debug, Clone)]
pub struct ImageMemory {
    width: WordWidth,
    bytes: Vec<u8>,
    bump: Bump,
    min_region: u64,
    regions: u64,
}

impl ImageMemory {
    pub fn new(width: WordWidth) -> Self {
        let span = width.max_value().saturating_add(1);
        Self::with_min_region(width, (span / 16).clamp(256, 1 << 20))
    }

    pub fn with_min_region(width: WordWidth, min_region: u64) -> Self {
        ImageMemory {
            width,
            // The first word-aligned slot stays unused so no block sits at null.
            bytes: vec![0u8; ALIGN as usize],
            bump: Bump::default(),
            min_region: min_region.max(ALIGN),
            regions: 0,
        }
    }

    /// Image contents; offset equals address.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn regions(&self) -> u64 {
        self.regions
    }

    fn range(&self, addr: Addr, len: usize) -> std::ops::Range<usize> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() && addr != 0 => start..end,
            _ => panic!(
                "image access {addr:#x}+{len} outside the {}-byte image",
                self.bytes.len()
            ),
        }
    }
}

impl Memory for ImageMemory {
    fn width(&self) -> WordWidth {
        self.width
    }

    fn alloc(&mut self, size: u64) -> Addr {
        let Some(size) = align_up(size) else {
            panic!("image allocation of {size} bytes overflows");
        };
        if let Some(at) = self.bump.carve(size) {
            return at;
        }
        let base = self.bytes.len() as u64;
        let len = size.max(self.min_region);
        let limit = self.width.max_value();
        if base.checked_add(len).map_or(true, |end| end - 1 > limit) {
            panic!(
                "{}-bit image address space exhausted ({len} bytes requested at {base:#x})",
                self.width.bytes() * 8
            );
        }
        self.bytes.resize((base + len) as usize, 0);
        self.bump.restart(base, len);
        self.regions += 1;
        match self.bump.carve(size) {
            Some(at) => at,
            None => unreachable!("fresh region holds the request"),
        }
    }

    fn load(&self, addr: Addr, out: &mut [u8]) {
        let r = self.range(addr, out.len());
        out.copy_from_slice(&self.bytes[r]);
    }

    fn store(&mut self, addr: Addr, bytes: &[u8]) {
        let r = self.range(addr, bytes.len());
        self.bytes[r].copy_from_slice(bytes);
    }

    fn move_bytes(&mut self, dst: Addr, src: Addr, n: u64) {
        let s = self.range(src, n as usize);
        let d = self.range(dst, n as usize);
        self.bytes.copy_within(s, d.start);
    }

    fn fill_zero(&mut self, addr: Addr, n: u64) {
        let r = self.range(addr, n as usize);
        self.bytes[r].fill(0);
    }

    fn read_word(&self, addr: Addr) -> u64 {
        let w = self.width.bytes() as usize;
        let mut buf = [0u8; 8];
        buf[..w].copy_from_slice(&self.bytes[self.range(addr, w)]);
        u64::from_le_bytes(buf)
    }

    fn write_word(&mut self, addr: Addr, value: u64) {
        let w = self.width.bytes() as usize;
        let r = self.range(addr, w);
        self.bytes[r].copy_from_slice(&value.to_le_bytes()[..w]);
    }
}
