//! Runtime core linked into every compiled program.
//!
//! - [`arena`]: bump allocation over OS-mapped regions, never freed.
//! - [`mem`], [`array`], [`text`], [`table`]: container encodings that
//!   generated code reads and writes by address, written once against the
//!   [`Memory`] trait so the same code lays out data for any word width.
//! - [`sys`]: the per-target system call shim.
//! - [`os`]: files, directories, environment and arguments over the shim.
//! - [`process`]: spawn, redirect, capture, wait.
//! - [`abi`]: the C entry points generated code calls.

pub mod abi;
pub mod arena;
pub mod array;
pub mod config;
pub mod error;
pub mod image;
pub mod layout;
pub mod mem;
pub mod os;
pub mod process;
pub mod sys;
pub mod table;
pub mod text;

pub use arena::{Arena, ArenaStats};
pub use error::{Error, ErrorKind, Result};
pub use image::ImageMemory;
pub use layout::{KeyKind, Layout};
pub use mem::{Addr, Fault, Memory, NativeMemory, NULL, TRAP_EXIT_CODE};
pub use os::{DirEntry, File, Fs};
pub use process::{Command, ExitStatus, Output};
pub use table::Key;
pub use text::Text;

pub use lowrt_targets::{TargetId, WordWidth};
