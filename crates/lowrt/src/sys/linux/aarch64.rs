use super::Numbers;
use crate::sys::{le_u32, le_u64, Stat};

pub(super) const NR: Numbers = Numbers {
    read: 63,
    write: 64,
    openat: 56,
    close: 57,
    fstatat: 79,
    mkdirat: 34,
    unlinkat: 35,
    getcwd: 17,
    fchmodat: 53,
    getdents64: 61,
    pipe2: 59,
    clone: 220,
    execve: 221,
    wait4: 260,
    dup3: 24,
    fcntl: 25,
    exit_group: 94,
};

const NR_MMAP: usize = 222;

pub(super) const O_DIRECTORY: usize = 0o40000;
pub(super) const O_LARGEFILE: usize = 0;

/// Generic `struct stat`: st_mode u32 @16, st_size i64 @48, st_mtime i64 @88.
pub(super) const STAT_LEN: usize = 128;

pub(super) fn decode_stat(raw: &[u8]) -> Stat {
    Stat {
        size: le_u64(raw, 48).unwrap_or(0),
        mode: le_u32(raw, 16).unwrap_or(0),
        is_dir: false,
        mtime: le_u64(raw, 88).unwrap_or(0) as i64,
    }
}

#[inline(always)]
pub(super) unsafe fn syscall(nr: usize, a: [usize; 6]) -> isize {
    let ret: isize;
    core::arch::asm!(
        "svc 0",
        in("x8") nr,
        inlateout("x0") a[0] as isize => ret,
        in("x1") a[1],
        in("x2") a[2],
        in("x3") a[3],
        in("x4") a[4],
        in("x5") a[5],
        options(nostack),
    );
    ret
}

pub(super) unsafe fn map_anon(len: usize) -> isize {
    const PROT_READ_WRITE: usize = 0x3;
    const MAP_PRIVATE_ANONYMOUS: usize = 0x22;
    syscall(
        NR_MMAP,
        [0, len, PROT_READ_WRITE, MAP_PRIVATE_ANONYMOUS, usize::MAX, 0],
    )
}
