//! CreateProcess launcher.

use crate::config;
use crate::error::Result;
use crate::sys::{cpath, Handle, Win32Process};

use super::{cmdline, Command, ExitStatus, Launcher, Output};

/// Raw code reported for a program path with an interior NUL.
const ERROR_INVALID_PARAMETER: i32 = 87;

#[derive(Debug, Clone)]
pub struct WindowsLauncher<P: Win32Process> {
    platform: P,
    io_chunk_bytes: usize,
}

impl<P: Win32Process + Default> Default for WindowsLauncher<P> {
    fn default() -> Self {
        WindowsLauncher::new(P::default(), config::config().io_chunk_bytes)
    }
}

impl<P: Win32Process> WindowsLauncher<P> {
    pub fn new(platform: P, io_chunk_bytes: usize) -> Self {
        WindowsLauncher {
            platform,
            io_chunk_bytes: io_chunk_bytes.max(1),
        }
    }

    fn drain(&self, h: Handle) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; self.io_chunk_bytes];
        loop {
            let r = self.platform.check(self.platform.read_retrying(h, &mut buf))?;
            if r.r0 == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..r.r0]);
        }
    }
}

impl<P: Win32Process> Launcher for WindowsLauncher<P> {
    fn launch(&self, cmd: &Command, capture: bool) -> Result<Output> {
        let p = &self.platform;
        let invalid = || p.error(ERROR_INVALID_PARAMETER);

        let app = cpath(cmd.program()).ok_or_else(invalid)?;
        let mut line = cmdline::build_command_line(cmd.program(), cmd.get_args());
        if line.contains(&0) {
            return Err(invalid());
        }
        line.push(0);
        let env = cmd.get_env().map(cmdline::env_block);

        let pipe = if capture {
            let r = p.check(p.create_pipe())?;
            Some((r.r0 as Handle, r.r1 as Handle))
        } else {
            None
        };

        let overrides = cmd.get_stdio();
        let stdio = if capture || overrides.iter().any(Option::is_some) {
            let out = pipe.map(|(_, wr)| wr).or(overrides[1]);
            Some([
                overrides[0].unwrap_or_else(|| p.stdio(0)),
                out.unwrap_or_else(|| p.stdio(1)),
                overrides[2].unwrap_or_else(|| p.stdio(2)),
            ])
        } else {
            None
        };

        let created = p.create_process(&app, &mut line, env.as_deref(), stdio);
        if !created.is_ok() {
            if let Some((rd, wr)) = pipe {
                p.close(rd);
                p.close(wr);
            }
            return Err(p.error(created.err));
        }
        let (process, thread) = (created.r0 as Handle, created.r1 as Handle);
        tracing::debug!(
            program = %String::from_utf8_lossy(cmd.program()),
            capture,
            "spawned child"
        );

        let captured = pipe.map(|(rd, wr)| {
            p.close(wr);
            let res = self.drain(rd);
            p.close(rd);
            res
        });

        let waited = p.check(p.wait_process(process));
        p.close(thread);
        p.close(process);
        let status = ExitStatus::Code(waited?.r0 as u32 as i32);
        tracing::debug!(?status, "child exited");

        let stdout = match captured {
            Some(res) => res?,
            None => Vec::new(),
        };
        Ok(Output { stdout, status })
    }
}
