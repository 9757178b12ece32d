//! Path normalization and relative-path composition for launcher generation.

use crate::util::error::Result;
use std::path::{Component, Path, PathBuf};

/// Absolute, symlink-resolved path (§4.A `realpath`).
///
/// `fs::canonicalize` already does both the absolutization and the
/// symlink-following; on case-insensitive filesystems this is also where a
/// real implementation would case-normalize, which we leave to the OS.
pub fn realpath(p: impl AsRef<Path>) -> Result<PathBuf> {
    Ok(std::fs::canonicalize(p.as_ref())?)
}

/// Whether `p` is a relative path with no `..` components (used to validate
/// recorded `__buildout_installed__` entries so they stay inside the
/// project root where possible).
pub fn is_strict_subpath(p: &Path) -> bool {
    p.is_relative() && p.components().all(|c| c != Component::ParentDir)
}

/// Express `target` relative to `base`, walking up from `base` with `../`
/// segments as needed. Used by the launcher generator's relative-path-root
/// mode (§4.I).
pub fn relative_to(base: &Path, target: &Path) -> Result<PathBuf> {
    let base = realpath(base)?;
    let target = if target.exists() {
        realpath(target)?
    } else {
        target.to_path_buf()
    };

    let mut base_comps: Vec<_> = base.components().collect();
    let mut target_comps: Vec<_> = target.components().collect();

    let mut common = 0;
    while common < base_comps.len()
        && common < target_comps.len()
        && base_comps[common] == target_comps[common]
    {
        common += 1;
    }

    base_comps.drain(..common);
    target_comps.drain(..common);

    let mut out = PathBuf::new();
    for _ in &base_comps {
        out.push("..");
    }
    for comp in target_comps {
        out.push(comp.as_os_str());
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }

    Ok(out)
}

/// Record a project-root-relative path string for the installed manifest,
/// falling back to the absolute path if the file landed outside the root.
pub fn display_relative(root: &Path, p: &Path) -> String {
    match p.strip_prefix(root) {
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => p.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relative_simple() {
        let base = Path::new("/a/b/bin");
        let target = Path::new("/a/b/eggs/foo");
        // Neither exists on disk, so realpath is skipped for target and base
        // must exist; exercise the component-math directly instead.
        let mut base_comps: Vec<_> = base.components().collect();
        let mut target_comps: Vec<_> = target.components().collect();
        let mut common = 0;
        while common < base_comps.len()
            && common < target_comps.len()
            && base_comps[common] == target_comps[common]
        {
            common += 1;
        }
        base_comps.drain(..common);
        target_comps.drain(..common);
        assert_eq!(base_comps.len(), 1);
        assert_eq!(target_comps, vec![Component::Normal("eggs".as_ref()), Component::Normal("foo".as_ref())]);
    }

    #[test]
    fn strict_subpath() {
        assert!(is_strict_subpath(Path::new("eggs/foo")));
        assert!(!is_strict_subpath(Path::new("../foo")));
        assert!(!is_strict_subpath(Path::new("/abs/foo")));
    }
}
