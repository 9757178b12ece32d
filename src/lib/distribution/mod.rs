//! The distribution data model (§3 `Distribution`/`WorkingSet`).

pub mod store;
pub mod version;

use crate::util::error::{Error, Result};
use indexmap::IndexMap;
use semver::Version;
use std::path::PathBuf;

/// Where a distribution's bytes live and how they got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// An unpacked directory, or a zip left intact (`zip-safe`).
    Binary,
    /// A source archive awaiting the external build driver.
    Source,
    /// A link file pointing at a local, unpacked source tree.
    Develop,
}

/// A versioned, named distribution tracked by the store.
#[derive(Debug, Clone)]
pub struct Distribution {
    pub project: String,
    pub version: Version,
    pub location: PathBuf,
    pub kind: Kind,
}

impl Distribution {
    pub fn archive_basename(&self) -> String {
        format!("{}-{}", self.project, self.version)
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.version == other.version && self.kind == other.kind
    }
}
impl Eq for Distribution {}

/// An ordered, conflict-free selection of distributions, used to compute a
/// launcher's search path (§3 `WorkingSet`).
#[derive(Debug, Default)]
pub struct WorkingSet {
    dists: IndexMap<String, Distribution>,
}

impl WorkingSet {
    pub fn new() -> Self {
        WorkingSet::default()
    }

    /// Add `dist`, erroring if a distribution with the same project name is
    /// already present (§3 invariant: unique project names).
    pub fn add(&mut self, dist: Distribution) -> Result<()> {
        if let Some(existing) = self.dists.get(&dist.project) {
            if existing.version != dist.version {
                return Err(Error::VersionConflict {
                    have: format!("{} {}", existing.project, existing.version),
                    requirer: "working set".to_string(),
                    requirement: format!("{} {}", dist.project, dist.version),
                }
                .into());
            }
            return Ok(());
        }
        self.dists.insert(dist.project.clone(), dist);
        Ok(())
    }

    pub fn get(&self, project: &str) -> Option<&Distribution> {
        self.dists.get(project)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Distribution> {
        self.dists.values()
    }

    pub fn len(&self) -> usize {
        self.dists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dist(project: &str, version: &str) -> Distribution {
        Distribution {
            project: project.to_string(),
            version: Version::parse(version).unwrap(),
            location: PathBuf::from("/tmp/x"),
            kind: Kind::Binary,
        }
    }

    #[test]
    fn working_set_rejects_conflicting_add() {
        let mut ws = WorkingSet::new();
        ws.add(dist("foo", "1.0.0")).unwrap();
        let err = ws.add(dist("foo", "2.0.0")).unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }

    #[test]
    fn working_set_allows_same_dist_twice() {
        let mut ws = WorkingSet::new();
        ws.add(dist("foo", "1.0.0")).unwrap();
        ws.add(dist("foo", "1.0.0")).unwrap();
        assert_eq!(ws.len(), 1);
    }
}
