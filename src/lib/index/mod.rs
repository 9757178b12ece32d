//! Abstract view of a distribution repository (§4.B). Concretely this is
//! an index+find-links server; the core only depends on the small
//! [`Index`] capability, matching the out-of-scope note in §1 that the
//! wire semantics of archive repositories are sketched, not designed,
//! here.

pub mod finddirs;

use crate::util::error::Result;
use semver::Version;
use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
};
use url::Url;

/// A candidate distribution the index or a find-links directory can offer.
#[derive(Debug, Clone)]
pub struct RemoteDist {
    pub project: String,
    pub version: Version,
    pub url: Url,
    /// Whether the archive metadata declared `zip-safe` (absence or
    /// `not-zip-safe` both mean "unpack", §4.D).
    pub zip_safe: bool,
}

/// Capability a concrete index/find-links backend must provide.
pub trait Index {
    /// The single best candidate satisfying `project`/`req`, if any.
    fn obtain(&self, project: &str, req: &semver::VersionReq) -> Result<Option<RemoteDist>>;
    /// Every known version of `project`, for diagnostics and `describe`.
    fn candidates(&self, project: &str) -> Result<Vec<RemoteDist>>;
    /// Fetch `dist`'s archive into `dir`, returning the path to the file.
    fn download(&self, dist: &RemoteDist, dir: &Path) -> Result<PathBuf>;
}

/// A glob-based host allow-list; `file://` URLs always pass (§4.B).
#[derive(Debug, Clone, Default)]
pub struct HostAllowList {
    patterns: Vec<String>,
}

impl HostAllowList {
    pub fn new(patterns: Vec<String>) -> Self {
        HostAllowList { patterns }
    }

    pub fn allows(&self, url: &Url) -> bool {
        if url.scheme() == "file" {
            return true;
        }
        if self.patterns.is_empty() {
            return true;
        }
        let host = match url.host_str() {
            Some(h) => h,
            None => return false,
        };
        self.patterns.iter().any(|p| glob_match(p, host))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return text.ends_with(suffix);
    }
    pattern == text
}

/// Memoizes indices by `(executable, index_url, find_links)` so that
/// repeated resolver calls within a single run don't re-scan the same
/// backend (§4.B).
pub struct Indices<I: Index> {
    backend: I,
    obtain_cache: RefCell<HashMap<(String, String), Option<RemoteDist>>>,
    logger: slog::Logger,
}

impl<I: Index> Indices<I> {
    pub fn new(backend: I) -> Self {
        Self::with_logger(backend, slog::Logger::root(slog::Discard, slog::o!()))
    }

    pub fn with_logger(backend: I, logger: slog::Logger) -> Self {
        Indices {
            backend,
            obtain_cache: RefCell::new(HashMap::new()),
            logger,
        }
    }

    pub fn obtain(&self, project: &str, req: &semver::VersionReq) -> Result<Option<RemoteDist>> {
        let key = (project.to_string(), req.to_string());
        if let Some(hit) = self.obtain_cache.borrow().get(&key) {
            slog::debug!(self.logger, "index memoization hit"; "project" => project);
            return Ok(hit.clone());
        }
        let result = self.backend.obtain(project, req)?;
        self.obtain_cache.borrow_mut().insert(key, result.clone());
        Ok(result)
    }

    pub fn candidates(&self, project: &str) -> Result<Vec<RemoteDist>> {
        self.backend.candidates(project)
    }

    pub fn download(&self, dist: &RemoteDist, dir: &Path) -> Result<PathBuf> {
        self.backend.download(dist, dir)
    }
}
