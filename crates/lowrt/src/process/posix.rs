//! Fork/exec launcher. Everything the child touches is built before the
//! fork; between fork and exec the child only duplicates descriptors, calls
//! exec and, if that fails, exits.

use crate::config;
use crate::error::Result;
use crate::os::env;
use crate::sys::{cpath, Handle, PosixProcess, SysRet};

use super::{Command, ExitStatus, Launcher, Output};

/// Exit status of a child whose exec failed.
pub const EXEC_FAILED: i32 = 127;

/// Lowest descriptor used for staging stdio sources in the child.
const STAGING_FLOOR: Handle = 3;

#[derive(Debug, Clone)]
pub struct PosixLauncher<P: PosixProcess> {
    platform: P,
    io_chunk_bytes: usize,
}

impl<P: PosixProcess + Default> Default for PosixLauncher<P> {
    fn default() -> Self {
        PosixLauncher::new(P::default(), config::config().io_chunk_bytes)
    }
}

/// NUL-terminated strings plus the null-terminated pointer array over them.
struct CStrings {
    _owned: Vec<Vec<u8>>,
    ptrs: Vec<*const u8>,
}

impl CStrings {
    fn new(items: impl IntoIterator<Item = Vec<u8>>) -> Option<Self> {
        let owned = items
            .into_iter()
            .map(|s| cpath(&s))
            .collect::<Option<Vec<_>>>()?;
        let mut ptrs: Vec<*const u8> = owned.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(core::ptr::null());
        Some(CStrings {
            _owned: owned,
            ptrs,
        })
    }
}

impl<P: PosixProcess> PosixLauncher<P> {
    pub fn new(platform: P, io_chunk_bytes: usize) -> Self {
        PosixLauncher {
            platform,
            io_chunk_bytes: io_chunk_bytes.max(1),
        }
    }

    fn close(&self, h: Handle) {
        self.platform.close(h);
    }

    /// Child side of the fork. Never returns.
    ///
    /// Every source handle is first copied above the standard slots, so a
    /// source that is itself one of slots 0..3 survives the earlier dups.
    fn exec_child(
        &self,
        path: &[u8],
        argv: &CStrings,
        envp: &CStrings,
        stdio: [Option<Handle>; 3],
    ) -> ! {
        let mut staged: [Option<Handle>; 3] = [None; 3];
        for (slot, h) in stdio.iter().enumerate() {
            let Some(h) = *h else { continue };
            let r = self.platform.dup_above(h, STAGING_FLOOR);
            if !r.is_ok() {
                self.platform.exit(EXEC_FAILED);
            }
            staged[slot] = Some(r.r0 as Handle);
        }
        for (slot, h) in staged.iter().enumerate() {
            let Some(h) = *h else { continue };
            if !self.platform.dup_to(h, slot as Handle).is_ok() {
                self.platform.exit(EXEC_FAILED);
            }
            self.platform.close(h);
        }
        unsafe {
            self.platform
                .execve(path.as_ptr(), argv.ptrs.as_ptr(), envp.ptrs.as_ptr());
        }
        self.platform.exit(EXEC_FAILED)
    }

    fn drain(&self, fd: Handle) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; self.io_chunk_bytes];
        loop {
            let r = self.platform.check(self.platform.read_retrying(fd, &mut buf))?;
            if r.r0 == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..r.r0]);
        }
    }
}

impl<P: PosixProcess> Launcher for PosixLauncher<P> {
    fn launch(&self, cmd: &Command, capture: bool) -> Result<Output> {
        let p = &self.platform;
        let invalid = || p.error(libc::EINVAL);

        let path = cpath(cmd.program()).ok_or_else(invalid)?;
        let argv = CStrings::new(
            std::iter::once(cmd.program().to_vec()).chain(cmd.get_args().iter().cloned()),
        )
        .ok_or_else(invalid)?;
        let vars = match cmd.get_env() {
            Some(vars) => vars,
            None => env::vars(),
        };
        let envp = CStrings::new(vars.iter().map(|(k, v)| {
            let mut e = Vec::with_capacity(k.len() + 1 + v.len());
            e.extend_from_slice(k);
            e.push(b'=');
            e.extend_from_slice(v);
            e
        }))
        .ok_or_else(invalid)?;

        let mut stdio = cmd.get_stdio();
        let pipe = if capture {
            let r = p.check(p.pipe())?;
            let (rd, wr) = (r.r0 as Handle, r.r1 as Handle);
            stdio[1] = Some(wr);
            Some((rd, wr))
        } else {
            None
        };

        let forked: SysRet = p.fork();
        if !forked.is_ok() {
            if let Some((rd, wr)) = pipe {
                self.close(rd);
                self.close(wr);
            }
            return Err(p.error(forked.err));
        }
        if forked.r0 == 0 {
            self.exec_child(&path, &argv, &envp, stdio);
        }
        let pid = forked.r0;
        tracing::debug!(
            pid,
            program = %String::from_utf8_lossy(cmd.program()),
            capture,
            "spawned child"
        );

        let captured = match pipe {
            Some((rd, wr)) => {
                // The parent's write end must go before draining, or the
                // read never sees end of stream.
                self.close(wr);
                let res = self.drain(rd);
                self.close(rd);
                Some(res)
            }
            None => None,
        };

        let waited = p.check(p.wait(pid))?;
        let status = ExitStatus::from_wait_status(waited.r1 as u32);
        tracing::debug!(pid, ?status, "child exited");

        let stdout = match captured {
            Some(res) => res?,
            None => Vec::new(),
        };
        Ok(Output { stdout, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::sys::Native;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", script]);
        cmd
    }

    fn launcher() -> PosixLauncher<Native> {
        PosixLauncher::new(Native, 7)
    }

    #[test]
    fn capture_reads_until_end_of_stream() {
        let out = launcher()
            .launch(&sh("printf 'hello world\\n'"), true)
            .expect("launch");
        assert_eq!(out.stdout, b"hello world\n");
        assert_eq!(out.status(), Ok(()));
    }

    #[test]
    fn nonzero_exit_still_returns_the_capture() {
        let out = launcher()
            .launch(&sh("printf partial; exit 3"), true)
            .expect("launch");
        assert_eq!(out.stdout, b"partial");
        assert_eq!(out.status(), Err(Error::Exit { code: 3 }));
    }

    #[test]
    fn failed_exec_exits_127() {
        let out = launcher()
            .launch(&Command::new("/nonexistent/program"), false)
            .expect("fork succeeds");
        assert_eq!(out.status, ExitStatus::Code(EXEC_FAILED));
    }

    #[test]
    fn signal_termination_is_reported() {
        let out = launcher()
            .launch(&sh("kill -9 $$"), false)
            .expect("launch");
        assert_eq!(out.status, ExitStatus::Signal(9));
    }

    #[test]
    fn environment_override_reaches_the_child() {
        let mut cmd = sh("printf %s \"$LOWRT_CHILD_VALUE\"");
        cmd.env_clear().env("LOWRT_CHILD_VALUE", "from-parent");
        let out = launcher().launch(&cmd, true).expect("launch");
        assert_eq!(out.stdout, b"from-parent");
    }

    #[test]
    fn stdout_redirect_to_a_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");
        let fs = crate::os::Fs::native();
        let p = path.as_os_str().as_encoded_bytes();
        let f = fs.open(p, crate::sys::OpenMode::Write).expect("open");
        let mut cmd = sh("echo redirected");
        cmd.stdout(f.handle());
        launcher().launch(&cmd, false).expect("launch").status().expect("exit 0");
        f.close().expect("close");
        assert_eq!(std::fs::read(&path).expect("read"), b"redirected\n");
    }
}
