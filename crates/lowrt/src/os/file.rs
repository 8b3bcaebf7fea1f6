use crate::error::{Error, ErrorKind, Result};
use crate::sys::{Handle, OpenMode, Platform};

use super::Fs;

/// Raw code for a write that made no progress.
const NO_PROGRESS: i32 = -1;

/// An open descriptor. Not closed on drop: call [`File::close`] exactly once.
#[derive(Debug)]
pub struct File<'p, P: Platform> {
    platform: &'p P,
    handle: Handle,
}

impl<'p, P: Platform> File<'p, P> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// One read, reissued if interrupted; 0 means end of stream.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.platform.check(self.platform.read_retrying(self.handle, buf))?.r0)
    }

    /// One write call; may write fewer bytes than offered.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.platform.check(self.platform.write(self.handle, buf))?.r0)
    }

    pub fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::os(ErrorKind::Other, NO_PROGRESS));
            }
            buf = &buf[n.min(buf.len())..];
        }
        Ok(())
    }

    /// Read until a zero-length read, in `chunk`-sized calls.
    pub fn read_to_end(&self, out: &mut Vec<u8>, chunk: usize) -> Result<usize> {
        let start = out.len();
        let mut buf = vec![0u8; chunk.max(1)];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(out.len() - start);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    pub fn close(self) -> Result<()> {
        self.platform.check(self.platform.close(self.handle))?;
        Ok(())
    }
}

impl<P: Platform> Fs<P> {
    pub fn open(&self, path: &[u8], mode: OpenMode) -> Result<File<'_, P>> {
        let r = self.platform.check(self.platform.open(path, mode))?;
        Ok(self.wrap(r.r0 as Handle))
    }

    /// Adopt a descriptor obtained elsewhere.
    pub fn wrap(&self, handle: Handle) -> File<'_, P> {
        File {
            platform: &self.platform,
            handle,
        }
    }

    pub fn read_file(&self, path: &[u8]) -> Result<Vec<u8>> {
        let f = self.open(path, OpenMode::Read)?;
        let mut out = Vec::new();
        let res = f.read_to_end(&mut out, self.io_chunk_bytes);
        let closed = f.close();
        res?;
        closed?;
        Ok(out)
    }

    pub fn write_file(&self, path: &[u8], data: &[u8]) -> Result<()> {
        self.put(path, data, OpenMode::Write)
    }

    pub fn append_file(&self, path: &[u8], data: &[u8]) -> Result<()> {
        self.put(path, data, OpenMode::Append)
    }

    fn put(&self, path: &[u8], data: &[u8], mode: OpenMode) -> Result<()> {
        let f = self.open(path, mode)?;
        let res = f.write_all(data);
        let closed = f.close();
        res?;
        closed
    }
}
