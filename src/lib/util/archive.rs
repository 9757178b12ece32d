//! Tree hashing and archive unpacking (§4.A).

use crate::util::error::{Error, Result};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    path::Path,
};
use walkdir::WalkDir;

const EXCLUDED_SUFFIXES: &[&str] = &[".pyc", ".pyo"];
const EXCLUDED_DIRS: &[&str] = &[".svn", "CVS"];

fn excluded(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if EXCLUDED_DIRS.contains(&name) {
            return true;
        }
        if EXCLUDED_SUFFIXES.iter().any(|suf| name.ends_with(suf)) {
            return true;
        }
    }
    false
}

/// Walk `dir` depth-first, folding sorted sub-directory names, then sorted
/// file names, then each file's bytes into a digest; excludes VCS metadata
/// directories and compiled-bytecode files so edits to derived artifacts
/// never bust a signature. Returns the digest, base64-encoded.
pub fn tree_hash(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(dir, &mut hasher)?;
    Ok(base64::encode(hasher.finalize()))
}

fn hash_dir(dir: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| !excluded(&e.path()))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| {
        e.file_type().map(|t| t.is_dir()).unwrap_or(false)
    });

    for entry in dirs {
        hasher.update(entry.file_name().to_string_lossy().as_bytes());
        hash_dir(&entry.path(), hasher)?;
    }

    for entry in files {
        hasher.update(entry.file_name().to_string_lossy().as_bytes());
        let bytes = fs::read(entry.path())?;
        hasher.update(&bytes);
    }

    Ok(())
}

/// Same traversal as `tree_hash`, exposed for callers that only need a
/// listing (e.g. to confirm a develop dist's tree is non-empty).
pub fn walk_included(dir: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !excluded(e.path()))
}

/// Extract a zip or gzipped-tar archive into `dest`, dispatching on content
/// rather than file extension since find-links entries aren't guaranteed a
/// trustworthy name.
pub fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;

    if is_zip(archive)? {
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|_| Error::BadArchive(archive.display().to_string()))?;
        zip.extract(dest)
            .map_err(|_| Error::BadArchive(archive.display().to_string()))?;
        return Ok(());
    }

    if is_gzip(archive)? {
        let file = File::open(archive)?;
        let decoder = GzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);
        tar.unpack(dest)?;
        return Ok(());
    }

    Err(Error::BadArchive(archive.display().to_string()).into())
}

fn is_zip(p: &Path) -> Result<bool> {
    let mut f = File::open(p)?;
    let mut magic = [0u8; 4];
    use std::io::Read;
    if f.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(&magic == b"PK\x03\x04" || &magic[..2] == b"PK")
}

fn is_gzip(p: &Path) -> Result<bool> {
    let mut f = File::open(p)?;
    let mut magic = [0u8; 2];
    use std::io::Read;
    if f.read_exact(&mut magic).is_err() {
        return Ok(false);
    }
    Ok(magic == [0x1f, 0x8b])
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn hash_stable_across_listing_order() {
        let dir = TempDir::new("archive-test").unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let h1 = tree_hash(dir.path()).unwrap();

        let dir2 = TempDir::new("archive-test").unwrap();
        fs::write(dir2.path().join("a.txt"), b"a").unwrap();
        fs::write(dir2.path().join("b.txt"), b"b").unwrap();
        let h2 = tree_hash(dir2.path()).unwrap();

        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_ignores_bytecode_and_vcs() {
        let dir = TempDir::new("archive-test").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let base = tree_hash(dir.path()).unwrap();

        fs::write(dir.path().join("a.pyc"), b"junk").unwrap();
        fs::create_dir(dir.path().join(".svn")).unwrap();
        fs::write(dir.path().join(".svn").join("entries"), b"junk").unwrap();

        let after = tree_hash(dir.path()).unwrap();
        assert_eq!(base, after);
    }

    #[test]
    fn hash_sensitive_to_content() {
        let dir = TempDir::new("archive-test").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        let before = tree_hash(dir.path()).unwrap();
        fs::write(dir.path().join("a.txt"), b"a-changed").unwrap();
        let after = tree_hash(dir.path()).unwrap();
        assert_ne!(before, after);
    }
}
