//! Locking to make sure that multiple runs against the same project root don't clobber each
//! other (§5: the project root is owned exclusively by one run at a time).

use std::{fs, io, path::{Path, PathBuf}};

/// A lock on a directory. This just generates a sibling file to the directory which indicates that
/// the directory is locked. 
pub struct DirLock {
    path: PathBuf,
    lock_path: PathBuf,
}

impl DirLock {
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = fs::canonicalize(path)?;
        let lock_path = { let mut p = path.clone(); p.set_extension("lock"); p };
        fs::OpenOptions::new().write(true).create_new(true).open(&lock_path).map(|_| DirLock { path, lock_path })
    }

    pub fn release(self) -> io::Result<()> {
        fs::remove_file(&self.lock_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    // Catches the early-return-on-error paths `release`'s explicit call
    // can't; a leftover `.lock` file would otherwise wedge every future run
    // against this root.
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = TempDir::new("lock-test").unwrap();
        let lock = DirLock::acquire(dir.path()).unwrap();
        assert!(DirLock::acquire(dir.path()).is_err());
        lock.release().unwrap();
        assert!(DirLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn drop_releases_without_explicit_release() {
        let dir = TempDir::new("lock-test").unwrap();
        let lock_path = {
            let lock = DirLock::acquire(dir.path()).unwrap();
            lock.path().with_extension("lock")
        };
        assert!(!lock_path.exists());
    }
}