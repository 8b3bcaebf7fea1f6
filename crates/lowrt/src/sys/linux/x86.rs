use super::Numbers;
use crate::sys::{le_u32, le_u64, Stat};

pub(super) const NR: Numbers = Numbers {
    read: 3,
    write: 4,
    openat: 295,
    close: 6,
    fstatat: 300,
    mkdirat: 296,
    unlinkat: 301,
    getcwd: 183,
    fchmodat: 306,
    getdents64: 220,
    pipe2: 331,
    clone: 120,
    execve: 11,
    wait4: 114,
    dup3: 330,
    fcntl: 55,
    exit_group: 252,
};

/// `old_mmap`: one argument, a pointer to the six-word argument block.
const NR_OLD_MMAP: usize = 90;

pub(super) const O_DIRECTORY: usize = 0o200000;
pub(super) const O_LARGEFILE: usize = 0o100000;

/// `struct stat64` (4-byte aligned): st_mode u32 @16, st_size i64 @44, st_mtime u32 @72.
pub(super) const STAT_LEN: usize = 96;

pub(super) fn decode_stat(raw: &[u8]) -> Stat {
    Stat {
        size: le_u64(raw, 44).unwrap_or(0),
        mode: le_u32(raw, 16).unwrap_or(0),
        is_dir: false,
        mtime: le_u32(raw, 72).unwrap_or(0) as i32 as i64,
    }
}

/// `int 0x80` with at most four arguments. `esi` is reserved by the
/// compiler, so the fourth argument rides in `edi` and is swapped in.
#[inline(always)]
pub(super) unsafe fn syscall(nr: usize, a: [usize; 6]) -> isize {
    let ret: isize;
    core::arch::asm!(
        "xchg esi, edi",
        "int 0x80",
        "xchg esi, edi",
        inlateout("eax") nr as isize => ret,
        in("ebx") a[0],
        in("ecx") a[1],
        in("edx") a[2],
        in("edi") a[3],
        options(nostack),
    );
    ret
}

pub(super) unsafe fn map_anon(len: usize) -> isize {
    const PROT_READ_WRITE: usize = 0x3;
    const MAP_PRIVATE_ANONYMOUS: usize = 0x22;
    let block: [usize; 6] = [0, len, PROT_READ_WRITE, MAP_PRIVATE_ANONYMOUS, usize::MAX, 0];
    syscall(NR_OLD_MMAP, [block.as_ptr() as usize, 0, 0, 0, 0, 0])
}
