//! A small built-in [`RecipeRegistry`] (§9 "Dynamically loaded recipe
//! callables"). Real third-party recipe loading is out of scope (§1); an
//! embedder normally supplies its own registry. This one ships two trivial
//! recipes so the CLI has something to actually install without requiring
//! a plugin ecosystem: a directory-creating recipe and a console-script
//! recipe that delegates to [`crate::launcher`].

use super::{PartContext, Recipe, RecipeFailure, RecipeRegistry, RecipeResult, RecipeSpec};
use crate::launcher::{self, EntryPoint, LauncherSpec, PathRoot};
use crate::util::error::{Error, Result};
use std::collections::HashMap;
use std::fs;

/// Creates (and on uninstall, removes) one directory per part, optionally
/// named by the `path` option (default: the part name under `parts/`).
struct DirectoryRecipe;

impl Recipe for DirectoryRecipe {
    fn install(&self, ctx: &PartContext) -> RecipeResult {
        let target = match ctx.get("path") {
            Some(p) => ctx.root.join(p),
            None => ctx.parts_dir.join(ctx.name),
        };
        fs::create_dir_all(&target).map_err(|e| RecipeFailure {
            partial: vec![],
            error: e.into(),
        })?;
        Ok(vec![target])
    }

    fn uninstall(&self, ctx: &PartContext) -> Result<()> {
        let target = match ctx.get("path") {
            Some(p) => ctx.root.join(p),
            None => ctx.parts_dir.join(ctx.name),
        };
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        "path (optional) - where to create the directory, default parts/<name>"
    }
}

/// Generates a console-script launcher pinned to the part's working set.
/// Required options: `entry-point` (`module:attr`); optional: `scripts`
/// (the display name, default the part name), `interpreter`.
struct ConsoleScriptRecipe;

impl Recipe for ConsoleScriptRecipe {
    fn install(&self, ctx: &PartContext) -> RecipeResult {
        let entry = ctx.get("entry-point").ok_or_else(|| RecipeFailure {
            partial: vec![],
            error: Error::MissingOption(ctx.name.to_string(), "entry-point".to_string()).into(),
        })?;
        let (module, attr) = entry.split_once(':').ok_or_else(|| RecipeFailure {
            partial: vec![],
            error: Error::BadConfigValue(
                ctx.name.to_string(),
                "entry-point".to_string(),
                "expected 'module:attr'".to_string(),
            )
            .into(),
        })?;

        let display_name = ctx.get("scripts").unwrap_or(ctx.name).to_string();
        let spec = LauncherSpec {
            executable: ctx
                .get("executable")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| std::path::PathBuf::from("/usr/bin/env python3")),
            dest_dir: ctx.bin_dir.to_path_buf(),
            entry_points: vec![EntryPoint {
                display_name,
                module: module.to_string(),
                attr: attr.to_string(),
            }],
            interpreter_name: ctx.get("interpreter").map(String::from),
            prelude: None,
            fixed_args: vec![],
            path_root: PathRoot::Absolute,
        };

        launcher::generate(&spec, ctx.working_set).map_err(|error| RecipeFailure {
            partial: vec![],
            error,
        })
    }

    fn describe(&self) -> &'static str {
        "entry-point (required) - 'module:attr'; scripts, interpreter (optional)"
    }
}

pub struct StaticRegistry {
    builders: HashMap<String, fn() -> Box<dyn Recipe>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        StaticRegistry {
            builders: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = StaticRegistry::new();
        registry.register("crucible.recipes.directory", || Box::new(DirectoryRecipe));
        registry.register("crucible.recipes.console-script", || {
            Box::new(ConsoleScriptRecipe)
        });
        registry
    }

    pub fn register(&mut self, distribution: &str, builder: fn() -> Box<dyn Recipe>) {
        self.builders.insert(distribution.to_string(), builder);
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        StaticRegistry::with_builtins()
    }
}

impl RecipeRegistry for StaticRegistry {
    fn load(&self, spec: &RecipeSpec) -> Result<Box<dyn Recipe>> {
        match self.builders.get(&spec.distribution) {
            Some(builder) => Ok(builder()),
            None => Err(Error::MissingDistribution(spec.distribution.clone()).into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_recipe_reports_missing_distribution() {
        let registry = StaticRegistry::with_builtins();
        let err = registry
            .load(&RecipeSpec::parse("not.a.recipe"))
            .unwrap_err();
        assert!(err.downcast_ref::<Error>().is_some());
    }

    #[test]
    fn directory_recipe_is_registered() {
        let registry = StaticRegistry::with_builtins();
        assert!(registry
            .load(&RecipeSpec::parse("crucible.recipes.directory"))
            .is_ok());
    }
}
