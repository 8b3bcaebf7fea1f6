use crate::error::Result;
use crate::sys::{DirStream, Platform};

use super::dirent::{self, EntryType};
use super::{join, Fs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub is_dir: bool,
}

impl<P: Platform> Fs<P> {
    /// Direct children of `path`, without `.` and `..`, in the order the
    /// platform returns them.
    pub fn list_dir(&self, path: &[u8]) -> Result<Vec<DirEntry>> {
        let mut stream = DirStream::default();
        self.platform.check(self.platform.dir_open(path, &mut stream))?;
        let res = self.drain_dir(path, &mut stream);
        let closed = self.platform.check(self.platform.dir_close(&mut stream));
        let entries = res?;
        closed?;
        Ok(entries)
    }

    fn drain_dir(&self, path: &[u8], stream: &mut DirStream) -> Result<Vec<DirEntry>> {
        let mut buf = vec![0u8; self.dir_buf_bytes];
        let mut out = Vec::new();
        loop {
            let r = self.platform.check(self.platform.dir_read(stream, &mut buf))?;
            if r.r0 == 0 {
                return Ok(out);
            }
            for e in dirent::parse(P::DIRENT, &buf[..r.r0.min(buf.len())]) {
                if e.name.is_empty() || e.name == b"." || e.name == b".." {
                    continue;
                }
                let is_dir = match e.kind {
                    EntryType::Dir => true,
                    EntryType::File => false,
                    EntryType::Unknown => self
                        .stat(&join(path, e.name))
                        .map(|st| st.is_dir)
                        .unwrap_or(false),
                };
                out.push(DirEntry {
                    name: e.name.to_vec(),
                    is_dir,
                });
            }
        }
    }
}
