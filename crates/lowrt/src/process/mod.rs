//! Subprocess launching: spawn, optional standard-stream redirection,
//! optional stdout capture, wait.
//!
//! One [`Launcher`] per platform family satisfies the same contract, so
//! callers never branch on the target.

pub mod cmdline;
#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use posix::PosixLauncher;
#[cfg(windows)]
pub use windows::WindowsLauncher;

use crate::error::{Error, Result};
use crate::os::env::{self, Vars};
use crate::sys::Handle;

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i32),
    Signal(i32),
}

impl ExitStatus {
    /// Decode a POSIX wait status word: low seven bits carry the terminating
    /// signal, bits 8..16 the exit code.
    pub fn from_wait_status(status: u32) -> Self {
        let signal = (status & 0x7f) as i32;
        if signal != 0 {
            ExitStatus::Signal(signal)
        } else {
            ExitStatus::Code(((status >> 8) & 0xff) as i32)
        }
    }

    pub fn success(&self) -> bool {
        *self == ExitStatus::Code(0)
    }

    pub fn into_result(self) -> Result<()> {
        match self {
            ExitStatus::Code(0) => Ok(()),
            ExitStatus::Code(code) => Err(Error::Exit { code }),
            ExitStatus::Signal(signal) => Err(Error::Signaled { signal }),
        }
    }
}

/// Result of a completed child. A nonzero exit still carries what was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub stdout: Vec<u8>,
    pub status: ExitStatus,
}

impl Output {
    pub fn status(&self) -> Result<()> {
        self.status.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: Vec<u8>,
    args: Vec<Vec<u8>>,
    env: Option<Vars>,
    stdio: [Option<Handle>; 3],
}

impl Command {
    /// `program` is a path; no search is made.
    pub fn new(program: impl AsRef<[u8]>) -> Self {
        Command {
            program: program.as_ref().to_vec(),
            args: Vec::new(),
            env: None,
            stdio: [None; 3],
        }
    }

    pub fn arg(&mut self, arg: impl AsRef<[u8]>) -> &mut Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for a in args {
            self.arg(a);
        }
        self
    }

    /// Set one variable, starting from the inherited environment on first use.
    pub fn env(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        let vars = self.env.get_or_insert_with(|| env::vars().clone());
        let (key, value) = (key.as_ref(), value.as_ref());
        match vars.iter_mut().find(|(k, _)| k.as_slice() == key) {
            Some((_, v)) => *v = value.to_vec(),
            None => vars.push((key.to_vec(), value.to_vec())),
        }
        self
    }

    /// Start the child with an empty environment plus whatever `env` adds.
    pub fn env_clear(&mut self) -> &mut Self {
        self.env = Some(Vec::new());
        self
    }

    pub fn stdin(&mut self, h: Handle) -> &mut Self {
        self.stdio[0] = Some(h);
        self
    }

    pub fn stdout(&mut self, h: Handle) -> &mut Self {
        self.stdio[1] = Some(h);
        self
    }

    pub fn stderr(&mut self, h: Handle) -> &mut Self {
        self.stdio[2] = Some(h);
        self
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    pub fn get_args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// The override environment, `None` when the child inherits.
    pub fn get_env(&self) -> Option<&Vars> {
        self.env.as_ref()
    }

    pub fn get_stdio(&self) -> [Option<Handle>; 3] {
        self.stdio
    }

    /// Run to completion; a nonzero exit becomes [`Error::Exit`].
    pub fn run(&self) -> Result<()> {
        native_launcher().launch(self, false)?.status()
    }

    /// Run to completion capturing standard output. Only launch and wait
    /// failures are errors here; inspect [`Output::status`] for the exit.
    pub fn output(&self) -> Result<Output> {
        native_launcher().launch(self, true)
    }
}

pub trait Launcher {
    fn launch(&self, cmd: &Command, capture: bool) -> Result<Output>;
}

#[cfg(unix)]
pub type NativeLauncher = PosixLauncher<crate::sys::Native>;
#[cfg(windows)]
pub type NativeLauncher = WindowsLauncher<crate::sys::Native>;
#[cfg(not(any(unix, windows)))]
pub type NativeLauncher = Unsupported;

pub fn native_launcher() -> NativeLauncher {
    NativeLauncher::default()
}

/// Launcher for targets without a process model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

/// Raw code reported by [`Unsupported`].
pub const UNSUPPORTED_CODE: i32 = 52;

impl Launcher for Unsupported {
    fn launch(&self, cmd: &Command, _capture: bool) -> Result<Output> {
        tracing::debug!(
            program = %String::from_utf8_lossy(cmd.program()),
            "process launch unsupported on this target"
        );
        Err(Error::os(crate::error::ErrorKind::Unsupported, UNSUPPORTED_CODE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_status_decoding() {
        assert_eq!(ExitStatus::from_wait_status(0), ExitStatus::Code(0));
        assert_eq!(ExitStatus::from_wait_status(3 << 8), ExitStatus::Code(3));
        assert_eq!(ExitStatus::from_wait_status(127 << 8), ExitStatus::Code(127));
        assert_eq!(ExitStatus::from_wait_status(9), ExitStatus::Signal(9));
        assert_eq!(ExitStatus::from_wait_status(0x80 | 11), ExitStatus::Signal(11));
    }

    #[test]
    fn nonzero_exit_keeps_its_code() {
        assert_eq!(
            ExitStatus::Code(3).into_result(),
            Err(Error::Exit { code: 3 })
        );
        assert!(ExitStatus::Code(0).success());
        assert_eq!(
            ExitStatus::Signal(15).into_result(),
            Err(Error::Signaled { signal: 15 })
        );
    }

    #[test]
    fn env_override_starts_from_the_inherited_set() {
        let mut cmd = Command::new("/bin/true");
        cmd.env("LOWRT_TEST_KEY", "1").env("LOWRT_TEST_KEY", "2");
        let vars = cmd.get_env().expect("override");
        assert_eq!(env::lookup(vars, b"LOWRT_TEST_KEY"), Some(&b"2"[..]));
        assert_eq!(vars.len(), env::vars().len() + 1);

        let mut clean = Command::new("/bin/true");
        clean.env_clear().env("ONLY", "x");
        assert_eq!(clean.get_env().map(Vec::len), Some(1));
    }

    #[test]
    fn unsupported_launcher_reports_unsupported() {
        let err = Unsupported
            .launch(&Command::new("x"), true)
            .expect_err("no process model");
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::Unsupported));
    }
}
