//! Shared target registry.
//!
//! This crate exists so both:
//! - the runtime core (container layouts, syscall backends)
//! - tooling (the probe CLI, compiler-side layout emitters)
//!
//! can share an authoritative list of compilation targets and the binary
//! conventions each one fixes.

use std::fmt;
use std::str::FromStr;

/// Pointer width of a compilation target. Fixes every container header layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WordWidth {
    W16,
    W32,
    W64,
}

impl WordWidth {
    pub fn bytes(self) -> u64 {
        match self {
            WordWidth::W16 => 2,
            WordWidth::W32 => 4,
            WordWidth::W64 => 8,
        }
    }

    pub fn from_bytes(n: u64) -> Option<Self> {
        match n {
            2 => Some(WordWidth::W16),
            4 => Some(WordWidth::W32),
            8 => Some(WordWidth::W64),
            _ => None,
        }
    }

    /// Largest value a word of this width can hold.
    pub fn max_value(self) -> u64 {
        match self {
            WordWidth::W16 => u16::MAX as u64,
            WordWidth::W32 => u32::MAX as u64,
            WordWidth::W64 => u64::MAX,
        }
    }

    /// Width of the machine this crate was compiled for.
    pub fn host() -> Self {
        match std::mem::size_of::<usize>() {
            2 => WordWidth::W16,
            4 => WordWidth::W32,
            _ => WordWidth::W64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Posix,
    Windows,
    Wasi,
    /// Transpiled to a portable low-level dialect and linked against its library.
    Portable,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Posix => "posix",
            Family::Windows => "windows",
            Family::Wasi => "wasi",
            Family::Portable => "portable",
        }
    }
}

/// Shape of the raw records a directory-read call fills its buffer with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirentFormat {
    /// `linux_dirent64`: reclen u16 @16, d_type u8 @18, NUL-terminated name @19.
    LinuxDirent64,
    /// WASI `dirent`: 24-byte header (namlen u32 @16, filetype u8 @20), name not terminated.
    WasiDirent,
    /// `WIN32_FIND_DATAA`: fixed 320-byte records, attributes @0, name @44.
    Win32FindDataA,
}

/// Shape in which a target exposes the environment (and argument) block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnvFormat {
    /// Flat blob of `KEY=VALUE` entries, each NUL-terminated.
    NulSeparated,
    /// `KEY=VALUE\0...\0\0`.
    DoubleNul,
    /// Runtime-provided pointer array, read one entry at a time.
    Indexed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetId {
    LinuxX86,
    LinuxX86_64,
    LinuxAarch64,
    WindowsX86,
    WindowsX86_64,
    WasiWasm32,
    Portable16,
    Portable32,
    Portable64,
}

impl TargetId {
    pub const ALL: [TargetId; 9] = [
        TargetId::LinuxX86,
        TargetId::LinuxX86_64,
        TargetId::LinuxAarch64,
        TargetId::WindowsX86,
        TargetId::WindowsX86_64,
        TargetId::WasiWasm32,
        TargetId::Portable16,
        TargetId::Portable32,
        TargetId::Portable64,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetId::LinuxX86 => "linux-x86",
            TargetId::LinuxX86_64 => "linux-x86_64",
            TargetId::LinuxAarch64 => "linux-aarch64",
            TargetId::WindowsX86 => "windows-x86",
            TargetId::WindowsX86_64 => "windows-x86_64",
            TargetId::WasiWasm32 => "wasi-wasm32",
            TargetId::Portable16 => "portable-16",
            TargetId::Portable32 => "portable-32",
            TargetId::Portable64 => "portable-64",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        TargetId::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn word_width(self) -> WordWidth {
        match self {
            TargetId::Portable16 => WordWidth::W16,
            TargetId::LinuxX86
            | TargetId::WindowsX86
            | TargetId::WasiWasm32
            | TargetId::Portable32 => WordWidth::W32,
            TargetId::LinuxX86_64
            | TargetId::LinuxAarch64
            | TargetId::WindowsX86_64
            | TargetId::Portable64 => WordWidth::W64,
        }
    }

    pub fn family(self) -> Family {
        match self {
            TargetId::LinuxX86 | TargetId::LinuxX86_64 | TargetId::LinuxAarch64 => Family::Posix,
            TargetId::WindowsX86 | TargetId::WindowsX86_64 => Family::Windows,
            TargetId::WasiWasm32 => Family::Wasi,
            TargetId::Portable16 | TargetId::Portable32 | TargetId::Portable64 => {
                Family::Portable
            }
        }
    }

    /// Portable targets read directories through their library and re-encode
    /// the entries as `linux_dirent64` records.
    pub fn dirent_format(self) -> DirentFormat {
        match self.family() {
            Family::Posix | Family::Portable => DirentFormat::LinuxDirent64,
            Family::Windows => DirentFormat::Win32FindDataA,
            Family::Wasi => DirentFormat::WasiDirent,
        }
    }

    pub fn env_format(self) -> EnvFormat {
        match self.family() {
            Family::Posix => EnvFormat::NulSeparated,
            Family::Windows => EnvFormat::DoubleNul,
            Family::Wasi | Family::Portable => EnvFormat::Indexed,
        }
    }

    /// The target this build is running on, if it is one of the known ones.
    pub fn host() -> Option<Self> {
        if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
            Some(TargetId::LinuxX86_64)
        } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
            Some(TargetId::LinuxAarch64)
        } else if cfg!(all(target_os = "linux", target_arch = "x86")) {
            Some(TargetId::LinuxX86)
        } else if cfg!(all(windows, target_arch = "x86_64")) {
            Some(TargetId::WindowsX86_64)
        } else if cfg!(all(windows, target_arch = "x86")) {
            Some(TargetId::WindowsX86)
        } else if cfg!(all(target_arch = "wasm32", target_os = "wasi")) {
            Some(TargetId::WasiWasm32)
        } else if cfg!(unix) {
            Some(match WordWidth::host() {
                WordWidth::W16 => TargetId::Portable16,
                WordWidth::W32 => TargetId::Portable32,
                WordWidth::W64 => TargetId::Portable64,
            })
        } else {
            None
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TargetParseError {
    value: String,
}

impl fmt::Display for TargetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = TargetId::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "invalid target {:?} (expected one of: {known})",
            self.value
        )
    }
}

impl std::error::Error for TargetParseError {}

impl FromStr for TargetId {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetId::parse(&s.to_ascii_lowercase()).ok_or_else(|| TargetParseError {
            value: s.to_string(),
        })
    }
}

#[cfg(feature = "clap")]
impl clap::ValueEnum for TargetId {
    fn value_variants<'a>() -> &'a [Self] {
        &TargetId::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}
