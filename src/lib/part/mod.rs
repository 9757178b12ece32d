//! Parts and the recipe capability they're bound to (§3 `Part`, §9 "Dynamically
//! loaded recipe callables").
//!
//! The teacher's own dynamic-dispatch plugin loading isn't reimplemented —
//! actual dynamic loading of third-party code is out of scope (§1: "recipes
//! are third-party code the core merely loads and invokes", sketched not
//! designed). Instead, per the redesign note in §9, the recipe ecosystem is
//! modeled as a small capability (`Recipe`) obtained from a `RecipeRegistry`
//! the embedding application supplies — the controller only ever talks to
//! that capability.

pub mod controller;
pub mod manifest;
pub mod registry;

use crate::distribution::WorkingSet;
use crate::util::error::Result;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// `<distribution>[:<entry-point>]`, entry point defaulting to `default`
/// (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeSpec {
    pub distribution: String,
    pub entry_point: String,
}

impl RecipeSpec {
    pub fn parse(spec: &str) -> Self {
        match spec.find(':') {
            Some(idx) => RecipeSpec {
                distribution: spec[..idx].to_string(),
                entry_point: spec[idx + 1..].to_string(),
            },
            None => RecipeSpec {
                distribution: spec.to_string(),
                entry_point: "default".to_string(),
            },
        }
    }
}

/// Everything a recipe needs to install/update/uninstall one part: its
/// frozen, fully-interpolated options, the project's directory layout, and
/// the working set of distributions its own recipe requirement resolved to.
pub struct PartContext<'a> {
    pub name: &'a str,
    pub options: &'a IndexMap<String, String>,
    pub root: &'a Path,
    pub bin_dir: &'a Path,
    pub parts_dir: &'a Path,
    pub eggs_dir: &'a Path,
    pub develop_eggs_dir: &'a Path,
    pub working_set: &'a WorkingSet,
    /// A child of the controller's logger, scoped to this part (§10).
    pub logger: &'a slog::Logger,
}

impl<'a> PartContext<'a> {
    pub fn get(&self, option: &str) -> Option<&str> {
        self.options.get(option).map(|s| s.as_str())
    }
}

/// Carries whatever a recipe had already created before it failed, so the
/// controller can roll those paths back (§4.H step 9 crash safety).
#[derive(Debug)]
pub struct RecipeFailure {
    pub partial: Vec<PathBuf>,
    pub error: failure::Error,
}

pub type RecipeResult = std::result::Result<Vec<PathBuf>, RecipeFailure>;

/// A plug-in callable bound to an entry point (§GLOSSARY).
pub trait Recipe {
    fn install(&self, ctx: &PartContext) -> RecipeResult;

    /// Falls back to `install` (with a caller-side warning) when a recipe
    /// doesn't define its own update behavior (§4.H step 9).
    fn update(&self, ctx: &PartContext) -> RecipeResult {
        self.install(ctx)
    }

    /// Optional; a no-op default means "nothing beyond deleting recorded
    /// files is needed to uninstall" (§4.H step 8).
    fn uninstall(&self, _ctx: &PartContext) -> Result<()> {
        Ok(())
    }

    /// A one-line summary of the options this recipe accepts, for the
    /// `describe` command.
    fn describe(&self) -> &'static str {
        "(no description available)"
    }
}

/// Loads a `Recipe` instance for a given spec. The registry is how an
/// embedding application wires up compiled-in recipes; it stands in for
/// the teacher's "distribution carries `group -> name -> (module, attr)`
/// metadata" loading step.
pub trait RecipeRegistry {
    fn load(&self, spec: &RecipeSpec) -> Result<Box<dyn Recipe>>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recipe_spec_defaults_entry_point() {
        let spec = RecipeSpec::parse("demo.recipe.foo");
        assert_eq!(spec.distribution, "demo.recipe.foo");
        assert_eq!(spec.entry_point, "default");
    }

    #[test]
    fn recipe_spec_parses_explicit_entry_point() {
        let spec = RecipeSpec::parse("demo.recipe.foo:bar");
        assert_eq!(spec.distribution, "demo.recipe.foo");
        assert_eq!(spec.entry_point, "bar");
    }
}
