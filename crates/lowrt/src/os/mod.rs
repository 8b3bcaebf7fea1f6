//! OS resource layer: files, directories, recursive tree operations and the
//! process environment, over a [`Platform`] backend.

mod dir;
pub mod dirent;
pub mod env;
mod file;
mod tree;

#[cfg(test)]
pub(crate) mod mock;

pub use dir::DirEntry;
pub use file::File;

use crate::config::{self, RuntimeConfig};
use crate::error::Result;
use crate::sys::{Handle, Native, Platform, Stat, STAT_BUF_MAX};

/// Filesystem access through one platform backend.
#[derive(Debug, Clone)]
pub struct Fs<P: Platform = Native> {
    platform: P,
    dir_buf_bytes: usize,
    io_chunk_bytes: usize,
}

impl Fs<Native> {
    pub fn native() -> Self {
        Fs::new(Native)
    }
}

impl Default for Fs<Native> {
    fn default() -> Self {
        Fs::native()
    }
}

impl<P: Platform> Fs<P> {
    pub fn new(platform: P) -> Self {
        Self::with_config(platform, config::config())
    }

    pub fn with_config(platform: P, cfg: &RuntimeConfig) -> Self {
        Fs {
            platform,
            dir_buf_bytes: cfg.dir_buf_bytes,
            io_chunk_bytes: cfg.io_chunk_bytes,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn stat(&self, path: &[u8]) -> Result<Stat> {
        let mut raw = [0u8; STAT_BUF_MAX];
        let r = self.platform.check(self.platform.stat(path, &mut raw))?;
        Ok(P::decode_stat(&raw[..r.r0.min(raw.len())]))
    }

    pub fn exists(&self, path: &[u8]) -> bool {
        self.stat(path).is_ok()
    }

    pub fn getcwd(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; 4096];
        let r = self.platform.check(self.platform.getcwd(&mut buf))?;
        buf.truncate(r.r0);
        Ok(buf)
    }

    pub fn chmod(&self, path: &[u8], mode: u32) -> Result<()> {
        self.platform.check(self.platform.chmod(path, mode))?;
        Ok(())
    }

    pub fn mkdir(&self, path: &[u8]) -> Result<()> {
        self.platform.check(self.platform.mkdir(path))?;
        Ok(())
    }

    pub fn rmdir(&self, path: &[u8]) -> Result<()> {
        self.platform.check(self.platform.rmdir(path))?;
        Ok(())
    }

    pub fn unlink(&self, path: &[u8]) -> Result<()> {
        self.platform.check(self.platform.unlink(path))?;
        Ok(())
    }

    /// Native handle of standard stream 0, 1 or 2.
    pub fn stdio(&self, slot: u8) -> Handle {
        self.platform.stdio(slot)
    }
}

/// `dir` joined with `name`, adding a separator unless `dir` ends in one.
pub fn join(dir: &[u8], name: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(dir.len() + 1 + name.len());
    out.extend_from_slice(dir);
    if !matches!(dir.last(), Some(b'/') | Some(b'\\') | None) {
        out.push(b'/');
    }
    out.extend_from_slice(name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_adds_one_separator() {
        assert_eq!(join(b"a", b"b"), b"a/b");
        assert_eq!(join(b"a/", b"b"), b"a/b");
        assert_eq!(join(b"C:\\x\\", b"y"), b"C:\\x\\y");
        assert_eq!(join(b"", b"y"), b"y");
    }

    #[cfg(unix)]
    #[test]
    fn native_stat_and_cwd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs = Fs::native();
        let p = dir.path().as_os_str().as_encoded_bytes();
        let st = fs.stat(p).expect("stat");
        assert!(st.is_dir);
        assert!(fs.exists(p));
        assert!(!fs.exists(&join(p, b"missing")));
        assert!(!fs.getcwd().expect("cwd").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn chmod_changes_permission_bits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").expect("write");
        let fs = Fs::native();
        let p = path.as_os_str().as_encoded_bytes();
        fs.chmod(p, 0o600).expect("chmod");
        assert_eq!(fs.stat(p).expect("stat").mode & 0o777, 0o600);
    }
}
