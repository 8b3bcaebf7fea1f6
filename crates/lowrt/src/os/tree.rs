use crate::error::{ErrorKind, Result};
use crate::sys::Platform;

use super::{join, Fs};

fn is_sep(b: u8) -> bool {
    b == b'/' || b == b'\\'
}

/// Length of a `\\server\share` prefix, which names a network root rather
/// than directories. 0 when `path` has none.
fn unc_root_len(path: &[u8]) -> usize {
    if !path.starts_with(b"\\\\") {
        return 0;
    }
    let mut seps = path
        .iter()
        .enumerate()
        .skip(2)
        .filter(|&(_, &b)| is_sep(b))
        .map(|(i, _)| i);
    match (seps.next(), seps.next()) {
        (Some(_), Some(end)) => end,
        _ => path.len(),
    }
}

impl<P: Platform> Fs<P> {
    /// Create `path` and any missing parents. Existing directories are fine.
    pub fn mkdir_all(&self, path: &[u8]) -> Result<()> {
        if self.mkdir_segment(path).is_ok() {
            return Ok(());
        }
        let root = unc_root_len(path);
        for (i, &b) in path.iter().enumerate() {
            if i <= root || !is_sep(b) {
                continue;
            }
            let prefix = &path[..i];
            // Drive designators (`C:`) and doubled separators are not directories.
            if prefix.ends_with(b":") || prefix.last().copied().is_some_and(is_sep) {
                continue;
            }
            self.mkdir_segment(prefix)?;
        }
        self.mkdir_segment(path)
    }

    fn mkdir_segment(&self, path: &[u8]) -> Result<()> {
        let r = self.platform.mkdir(path);
        if r.is_ok() || self.platform.classify(r.err) == ErrorKind::AlreadyExists {
            return Ok(());
        }
        Err(self.platform.error(r.err))
    }

    /// Remove `path` and everything beneath it. A path that cannot be
    /// listed counts as already gone.
    pub fn remove_all(&self, path: &[u8]) -> Result<()> {
        if self.platform.unlink(path).is_ok() {
            return Ok(());
        }
        let entries = match self.list_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                if !err.is_not_found() {
                    tracing::debug!(
                        path = %String::from_utf8_lossy(path),
                        kind = ?err.kind(),
                        code = ?err.raw_code(),
                        "remove_all: listing failed, treating path as absent"
                    );
                }
                return Ok(());
            }
        };
        for e in entries {
            self.remove_all(&join(path, &e.name))?;
        }
        self.rmdir(path)
    }
}
