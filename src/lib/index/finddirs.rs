//! A find-links-directory-backed [`Index`] (§4.B).
//!
//! The wire semantics of a real archive-index server (content negotiation,
//! HTML candidate parsing) are sketched, not designed, in the spec this
//! implements (§1) — deliberately not reinvented here. What *is* a
//! load-bearing collaborator is the on-disk find-links convention real
//! buildout configurations lean on: one or more local directories holding
//! `<project>-<version>.<ext>` archives. This backend scans those; a
//! genuine network index is a second `Index` implementation an embedder can
//! swap in without touching the resolver.

use super::{Index, RemoteDist};
use crate::util::error::Result;
use semver::{Version, VersionReq};
use std::{
    fs,
    path::{Path, PathBuf},
};
use url::Url;

const ARCHIVE_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".zip"];

fn strip_archive_extension(name: &str) -> Option<&str> {
    ARCHIVE_EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
}

fn parse_candidate(path: &Path) -> Option<(String, Version, Url)> {
    let name = path.file_name()?.to_str()?;
    let stem = strip_archive_extension(name)?;
    let idx = stem.rfind('-')?;
    let (project, ver) = (&stem[..idx], &stem[idx + 1..]);
    let version = Version::parse(ver).ok()?;
    let url = Url::from_file_path(path).ok()?;
    Some((project.to_string(), version, url))
}

pub struct FindLinksIndex {
    pub dirs: Vec<PathBuf>,
}

impl FindLinksIndex {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        FindLinksIndex { dirs }
    }

    fn scan(&self, project: &str) -> Vec<RemoteDist> {
        let mut found = Vec::new();
        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.filter_map(|e| e.ok()) {
                if let Some((name, version, url)) = parse_candidate(&entry.path()) {
                    if name == project {
                        found.push(RemoteDist {
                            project: name,
                            version,
                            url,
                            zip_safe: false,
                        });
                    }
                }
            }
        }
        found
    }
}

impl Index for FindLinksIndex {
    fn obtain(&self, project: &str, req: &VersionReq) -> Result<Option<RemoteDist>> {
        let best = self
            .scan(project)
            .into_iter()
            .filter(|d| req.matches(&d.version))
            .max_by(|a, b| a.version.cmp(&b.version));
        Ok(best)
    }

    fn candidates(&self, project: &str) -> Result<Vec<RemoteDist>> {
        Ok(self.scan(project))
    }

    /// `file://` URLs (the only kind `scan` ever produces) are a local
    /// copy; anything else falls through to a plain `reqwest::blocking` GET,
    /// so an embedder handing this backend remote `RemoteDist`s (e.g. from
    /// a richer `Index` decorator) still gets a working download.
    fn download(&self, dist: &RemoteDist, dir: &Path) -> Result<PathBuf> {
        let file_name = dist
            .url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("download")
            .to_string();
        let dest = dir.join(file_name);
        fs::create_dir_all(dir)?;

        if dist.url.scheme() == "file" {
            let source = dist.url.to_file_path().map_err(|_| {
                crate::util::error::Error::MissingDistribution(dist.project.clone())
            })?;
            fs::copy(&source, &dest)?;
            return Ok(dest);
        }

        let mut response = reqwest::blocking::get(dist.url.clone())?;
        let mut out = fs::File::create(&dest)?;
        response.copy_to(&mut out)?;
        Ok(dest)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn finds_best_matching_version() {
        let dir = TempDir::new("finddirs-test").unwrap();
        fs::write(dir.path().join("demo-1.0.0.tar.gz"), b"a").unwrap();
        fs::write(dir.path().join("demo-1.1.0.tar.gz"), b"b").unwrap();

        let index = FindLinksIndex::new(vec![dir.path().to_path_buf()]);
        let best = index
            .obtain("demo", &VersionReq::any())
            .unwrap()
            .unwrap();
        assert_eq!(best.version, Version::parse("1.1.0").unwrap());
    }

    #[test]
    fn download_copies_into_destination() {
        let dir = TempDir::new("finddirs-test").unwrap();
        fs::write(dir.path().join("demo-1.0.0.tar.gz"), b"payload").unwrap();
        let index = FindLinksIndex::new(vec![dir.path().to_path_buf()]);
        let dist = index
            .obtain("demo", &VersionReq::any())
            .unwrap()
            .unwrap();

        let out_dir = TempDir::new("finddirs-out").unwrap();
        let path = index.download(&dist, out_dir.path()).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"payload");
    }
}
