use super::Numbers;
use crate::sys::{le_u32, le_u64, Stat};

pub(super) const NR: Numbers = Numbers {
    read: 0,
    write: 1,
    openat: 257,
    close: 3,
    fstatat: 262,
    mkdirat: 258,
    unlinkat: 263,
    getcwd: 79,
    fchmodat: 268,
    getdents64: 217,
    pipe2: 293,
    clone: 56,
    execve: 59,
    wait4: 61,
    dup3: 292,
    fcntl: 72,
    exit_group: 231,
};

const NR_MMAP: usize = 9;

pub(super) const O_DIRECTORY: usize = 0o200000;
pub(super) const O_LARGEFILE: usize = 0;

/// `struct stat`: st_mode u32 @24, st_size i64 @48, st_mtime i64 @88.
pub(super) const STAT_LEN: usize = 144;

pub(super) fn decode_stat(raw: &[u8]) -> Stat {
    Stat {
        size: le_u64(raw, 48).unwrap_or(0),
        mode: le_u32(raw, 24).unwrap_or(0),
        is_dir: false,
        mtime: le_u64(raw, 88).unwrap_or(0) as i64,
    }
}

#[inline(always)]
pub(super) unsafe fn syscall(nr: usize, a: [usize; 6]) -> isize {
    let ret: isize;
    core::arch::asm!(
        "syscall",
        inlateout("rax") nr as isize => ret,
        in("rdi") a[0],
        in("rsi") a[1],
        in("rdx") a[2],
        in("r10") a[3],
        in("r8") a[4],
        in("r9") a[5],
        lateout("rcx") _,
        lateout("r11") _,
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
