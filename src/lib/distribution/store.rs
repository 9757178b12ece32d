//! The on-disk distribution store: `eggs/` and `develop-eggs/` under the
//! project root (§4.D).

use crate::distribution::{version::Requirement, Distribution, Kind, WorkingSet};
use crate::util::archive::unpack;
use crate::util::error::Result;
use crate::util::path::realpath;
use semver::Version;
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub struct Store {
    pub eggs_dir: PathBuf,
    pub develop_eggs_dir: PathBuf,
}

impl Store {
    pub fn new(eggs_dir: PathBuf, develop_eggs_dir: PathBuf) -> Self {
        Store {
            eggs_dir,
            develop_eggs_dir,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.eggs_dir)?;
        fs::create_dir_all(&self.develop_eggs_dir)?;
        Ok(())
    }

    /// Parse a directory/archive basename of the form `<project>-<version>`
    /// into its parts.
    fn parse_basename(stem: &str) -> Option<(String, Version)> {
        let idx = stem.rfind('-')?;
        let (name, ver) = (&stem[..idx], &stem[idx + 1..]);
        Version::parse(ver).ok().map(|v| (name.to_string(), v))
    }

    /// Scan both directories and return every distribution found (§4.D
    /// `scan`).
    pub fn scan(&self) -> Result<Vec<Distribution>> {
        let mut found = Vec::new();

        if self.eggs_dir.exists() {
            for entry in fs::read_dir(&self.eggs_dir)? {
                let entry = entry?;
                let path = entry.path();
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if let Some((project, version)) = Self::parse_basename(stem) {
                    found.push(Distribution {
                        project,
                        version,
                        location: path,
                        kind: Kind::Binary,
                    });
                }
            }
        }

        if self.develop_eggs_dir.exists() {
            for entry in fs::read_dir(&self.develop_eggs_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("egg-link") {
                    continue;
                }
                let target = fs::read_to_string(&path)?;
                let target = PathBuf::from(target.trim());
                let project = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                found.push(Distribution {
                    project,
                    version: Version::new(0, 0, 0),
                    location: target,
                    kind: Kind::Develop,
                });
            }
        }

        Ok(found)
    }

    /// Pick the best already-known distribution satisfying `req` (§4.E
    /// steps 1-2): a develop distribution always wins if it satisfies;
    /// otherwise the highest version among binary distributions.
    pub fn best_match(&self, req: &Requirement, ws: &WorkingSet) -> Result<Option<Distribution>> {
        let dists = self.scan()?;

        if let Some(d) = dists
            .iter()
            .find(|d| d.kind == Kind::Develop && d.project == req.project)
        {
            return Ok(Some(d.clone()));
        }

        if let Some(existing) = ws.get(&req.project) {
            if req.matches(&existing.version) {
                return Ok(Some(existing.clone()));
            }
        }

        let best = dists
            .into_iter()
            .filter(|d| d.project == req.project && d.kind == Kind::Binary)
            .filter(|d| req.matches(&d.version))
            .max_by(|a, b| a.version.cmp(&b.version));

        Ok(best)
    }

    /// Install an already-downloaded archive into `eggs/`, unpacking it
    /// when `always_unzip` is set or the archive isn't zip-safe (§4.D).
    pub fn install_archive(
        &self,
        archive: &Path,
        project: &str,
        version: &Version,
        always_unzip: bool,
        zip_safe: bool,
    ) -> Result<Distribution> {
        self.ensure_dirs()?;
        let basename = format!("{}-{}", project, version);

        let location = if always_unzip || !zip_safe {
            let dest = self.eggs_dir.join(&basename);
            unpack(archive, &dest)?;
            dest
        } else {
            let dest = self.eggs_dir.join(format!("{}.zip", basename));
            fs::copy(archive, &dest)?;
            dest
        };

        Ok(Distribution {
            project: project.to_string(),
            version: version.clone(),
            location,
            kind: Kind::Binary,
        })
    }

    /// Register a local source tree as a develop distribution: write a
    /// `<project>.egg-link` pointing at its real path (§4.H step 5).
    pub fn add_develop(&self, source_dir: &Path) -> Result<Distribution> {
        self.ensure_dirs()?;
        let source = realpath(source_dir)?;
        let project = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let link_path = self.develop_eggs_dir.join(format!("{}.egg-link", project));
        let contents = source.to_string_lossy().into_owned();

        // Only rewrite the file if its content changed, so that a rerun
        // with nothing changed leaves mtimes untouched.
        let needs_write = match fs::read_to_string(&link_path) {
            Ok(existing) => existing.trim() != contents,
            Err(_) => true,
        };
        if needs_write {
            fs::write(&link_path, &contents)?;
        }

        Ok(Distribution {
            project,
            version: Version::new(0, 0, 0),
            location: source,
            kind: Kind::Develop,
        })
    }

    pub fn remove_develop(&self, project: &str) -> Result<()> {
        let link_path = self.develop_eggs_dir.join(format!("{}.egg-link", project));
        if link_path.exists() {
            fs::remove_file(link_path)?;
        }
        Ok(())
    }

    /// Content hash contribution of a develop distribution's source tree
    /// (§3 signature: `<project>-<treehash>`).
    pub fn develop_signature(&self, dist: &Distribution) -> Result<String> {
        let hash = crate::util::archive::tree_hash(&dist.location)?;
        Ok(format!("{}-{}", dist.project, hash))
    }

    pub fn is_nonempty_tree(&self, dir: &Path) -> bool {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn parse_basename_splits_name_and_version() {
        let (name, version) = Store::parse_basename("demoneeded-1.0.0").unwrap();
        assert_eq!(name, "demoneeded");
        assert_eq!(version, Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn add_develop_is_idempotent_on_bytes() {
        let root = TempDir::new("store-test").unwrap();
        let store = Store::new(root.path().join("eggs"), root.path().join("develop-eggs"));
        let src = TempDir::new("foo").unwrap();
        fs::write(src.path().join("setup.txt"), b"x").unwrap();

        let dist1 = store.add_develop(src.path()).unwrap();
        let link = store
            .develop_eggs_dir
            .join(format!("{}.egg-link", dist1.project));
        let mtime1 = fs::metadata(&link).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        store.add_develop(src.path()).unwrap();
        let mtime2 = fs::metadata(&link).unwrap().modified().unwrap();

        assert_eq!(mtime1, mtime2);
    }
}
