//! Requirement strings and version pinning (§4.E).
//!
//! The teacher's own version grammar (`elba::package::version`) is a
//! hand-rolled `nom` constraint parser, built because Idris's registry
//! needed something stricter than semver's `VersionReq`. This tool's
//! requirement strings are ordinary caret/exact pins, exactly what
//! `VersionReq` already expresses, so we reuse the teacher's `semver`
//! dependency directly instead of reinventing the grammar it was built to
//! avoid.

use crate::util::error::{Error, Result};
use semver::{Version, VersionReq};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Requirement {
    pub project: String,
    pub req: VersionReq,
}

impl Requirement {
    pub fn parse(project: &str, req: &str) -> Result<Self> {
        let req = if req.trim().is_empty() {
            VersionReq::any()
        } else {
            VersionReq::parse(req).map_err(|e| {
                Error::BadConfigValue(project.to_string(), "version".to_string(), e.to_string())
            })?
        };
        Ok(Requirement {
            project: project.to_string(),
            req,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }
}

/// Rewrite `req` to an exact pin if `project` appears in `pins`
/// (`buildout:versions`, §4.E). Fails with `IncompatibleVersion` if the
/// existing requirement disallows the pinned version.
pub fn apply_pin(
    project: &str,
    req: &Requirement,
    pins: &HashMap<String, String>,
) -> Result<Requirement> {
    let pin = match pins.get(project) {
        Some(p) => p,
        None => return Ok(req.clone()),
    };

    let pinned_version = Version::parse(pin)
        .map_err(|e| Error::BadConfigValue("versions".to_string(), project.to_string(), e.to_string()))?;

    if !req.matches(&pinned_version) {
        return Err(Error::IncompatibleVersion {
            project: project.to_string(),
            pin: pin.clone(),
            requirement: req.req.to_string(),
        }
        .into());
    }

    Ok(Requirement {
        project: project.to_string(),
        req: VersionReq::exact(&pinned_version),
    })
}
