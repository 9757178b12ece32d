//! The part lifecycle controller (§4.H): signature computation, the
//! install/update/uninstall state machine, and crash-safe manifest
//! persistence.
//!
//! Grounded on `elba::build::job.rs`'s `JobQueue` (dirty-diffing against a
//! previous run, ordered execution) generalized from a parallel build queue
//! into a single-threaded part installer, per §5's cooperative-scheduling
//! model.

use super::manifest::{InstalledManifest, InstalledPart};
use super::{PartContext, RecipeRegistry, RecipeSpec};
use crate::config::ConfigTree;
use crate::distribution::{store::Store, version::Requirement, Kind, WorkingSet};
use crate::index::Index;
use crate::resolve::Resolver;
use crate::util::error::{Error, Result};
use crate::util::lock::DirLock;
use crate::util::path::display_relative;
use crate::util::shell::{Shell, Status};
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

pub struct Directories {
    pub bin: PathBuf,
    pub parts: PathBuf,
    pub eggs: PathBuf,
    pub develop_eggs: PathBuf,
}

pub struct Controller<'a, I: Index, R: RecipeRegistry> {
    pub root: PathBuf,
    pub config: &'a ConfigTree,
    pub store: &'a Store,
    pub resolver: Resolver<'a, I>,
    pub manifest_path: PathBuf,
    pub registry: &'a R,
    pub shell: &'a Shell,
    pub logger: slog::Logger,
}

impl<'a, I: Index, R: RecipeRegistry> Controller<'a, I, R> {
    pub fn directories(&self) -> Result<Directories> {
        Ok(Directories {
            bin: self.root.join(self.config.buildout("bin-directory")?),
            parts: self.root.join(self.config.buildout("parts-directory")?),
            eggs: self.root.join(self.config.buildout("eggs-directory")?),
            develop_eggs: self
                .root
                .join(self.config.buildout("develop-eggs-directory")?),
        })
    }

    /// The primary operation (§4.H). `explicit_parts`, when non-empty,
    /// restricts both install and the no-uninstall guarantee to just those
    /// parts (step 6).
    pub fn install(&self, explicit_parts: Vec<String>) -> Result<()> {
        // §5: the project root is owned exclusively by one run at a time;
        // held for the whole method and released on return or panic unwind.
        let _lock = DirLock::acquire(&self.root)?;
        let dirs = self.directories()?;
        for d in [&dirs.bin, &dirs.parts, &dirs.eggs, &dirs.develop_eggs].iter() {
            fs::create_dir_all(d)?;
        }
        self.store.ensure_dirs()?;

        let previous = InstalledManifest::load(&self.manifest_path)?.unwrap_or_default();

        let current_develop = self.sync_develop_eggs(&previous)?;

        let conf_parts = self.config.parts()?;
        let (install_order, force_uninstall): (Vec<String>, Vec<String>) = if explicit_parts.is_empty()
        {
            let stale: Vec<String> = previous
                .order
                .iter()
                .filter(|p| !conf_parts.contains(p))
                .cloned()
                .collect();
            (conf_parts, stale)
        } else {
            (explicit_parts, Vec::new())
        };

        let mut target_sig = HashMap::new();
        let mut target_options = HashMap::new();
        let mut target_ws: HashMap<String, WorkingSet> = HashMap::new();

        for name in &install_order {
            let recipe_spec_str = self.config.get(name, "recipe")?;
            let spec = RecipeSpec::parse(&recipe_spec_str);
            let mut ws = WorkingSet::new();
            self.resolver.resolve(
                vec![Requirement::parse(&spec.distribution, "")?],
                &mut ws,
                name,
            )?;
            target_sig.insert(name.clone(), self.compute_signature(&ws));
            target_options.insert(name.clone(), self.part_options(name)?);
            target_ws.insert(name.clone(), ws);
        }

        let mut manifest = InstalledManifest::default();
        manifest.installed_develop_eggs = current_develop;

        // Step 8: reverse-order diff of previously installed parts.
        let mut carried: HashMap<String, InstalledPart> = HashMap::new();
        for name in previous.order.iter().rev() {
            let prev_part = match previous.parts.get(name) {
                Some(p) => p.clone(),
                None => continue,
            };

            let signature_matches = target_sig.get(name) == Some(&prev_part.signature);
            let options_match = target_options.get(name) == Some(&prev_part.options);
            let files_present = prev_part
                .installed
                .iter()
                .all(|f| self.root.join(f).exists());
            let still_wanted = install_order.contains(name) && !force_uninstall.contains(name);

            if still_wanted && signature_matches && options_match && files_present {
                carried.insert(name.clone(), prev_part);
                continue;
            }

            self.shell.status(Status::Uninstalling, name);
            self.uninstall_part(name, &prev_part, &dirs)?;
        }

        // Step 9: install/update in declared order.
        for name in &install_order {
            let recipe_spec_str = self.config.get(name, "recipe")?;
            let spec = RecipeSpec::parse(&recipe_spec_str);
            let recipe = self.registry.load(&spec)?;
            let ws = target_ws.remove(name).unwrap_or_default();
            let options = target_options.remove(name).unwrap_or_default();
            let part_logger = self.logger.new(slog::o!("part" => name.clone()));

            let ctx = PartContext {
                name,
                options: &options,
                root: &self.root,
                bin_dir: &dirs.bin,
                parts_dir: &dirs.parts,
                eggs_dir: &dirs.eggs,
                develop_eggs_dir: &dirs.develop_eggs,
                working_set: &ws,
                logger: &part_logger,
            };

            let was_installed = carried.contains_key(name);
            self.shell.status(
                if was_installed {
                    Status::Updating
                } else {
                    Status::Installing
                },
                name,
            );

            let outcome = if was_installed {
                recipe.update(&ctx)
            } else {
                recipe.install(&ctx)
            };

            let files = match outcome {
                Ok(files) => files,
                Err(recipe_failure) => {
                    for path in &recipe_failure.partial {
                        let _ = remove_path(path);
                    }
                    self.shell.status(Status::Error, name);
                    return Err(
                        Error::RecipeError(name.clone(), recipe_failure.error.to_string()).into(),
                    );
                }
            };

            self.warn_unused_options(name);

            let installed: Vec<String> = files
                .iter()
                .map(|p| display_relative(&self.root, p))
                .collect();

            manifest.order.push(name.clone());
            manifest.parts.insert(
                name.clone(),
                InstalledPart {
                    options,
                    installed,
                    signature: target_sig.remove(name).unwrap_or_default(),
                },
            );
        }

        manifest.save(&self.manifest_path)?;
        Ok(())
    }

    /// Create the directory skeleton and an initial launcher for the tool
    /// itself (§4.H). Idempotent: reruns just regenerate the launcher.
    pub fn bootstrap(&self, tool_executable: &Path, tool_module: &str, tool_attr: &str) -> Result<PathBuf> {
        let _lock = DirLock::acquire(&self.root)?;
        let dirs = self.directories()?;
        for d in [&dirs.bin, &dirs.parts, &dirs.eggs, &dirs.develop_eggs].iter() {
            fs::create_dir_all(d)?;
        }
        self.store.ensure_dirs()?;

        let spec = crate::launcher::LauncherSpec {
            executable: tool_executable.to_path_buf(),
            dest_dir: dirs.bin.clone(),
            entry_points: vec![crate::launcher::EntryPoint {
                display_name: "crucible".to_string(),
                module: tool_module.to_string(),
                attr: tool_attr.to_string(),
            }],
            interpreter_name: None,
            prelude: None,
            fixed_args: vec![],
            path_root: crate::launcher::PathRoot::Absolute,
        };
        let ws = WorkingSet::new();
        let written = crate::launcher::generate(&spec, &ws)?;
        self.shell.status(Status::New, "bootstrapped");
        Ok(written.into_iter().next().unwrap_or_else(|| dirs.bin.join("crucible")))
    }

    /// Create the directory skeleton only, without a launcher (§4.H `init`):
    /// the minimal state a freshly-cloned project needs before its first
    /// `install`.
    pub fn init(&self) -> Result<()> {
        let _lock = DirLock::acquire(&self.root)?;
        let dirs = self.directories()?;
        for d in [&dirs.bin, &dirs.parts, &dirs.eggs, &dirs.develop_eggs].iter() {
            fs::create_dir_all(d)?;
        }
        self.store.ensure_dirs()?;
        self.shell.status(Status::New, "initialized");
        Ok(())
    }

    /// Invoke an external setup script with the support package on its
    /// path (§4.H), communicated the way the original does it: through the
    /// interpreter's library-path environment variable (§6 "Environment
    /// variables").
    pub fn setup(&self, interpreter: &Path, script_path: &Path, extra_args: &[String]) -> Result<()> {
        let dirs = self.directories()?;
        let status = Command::new(interpreter)
            .arg(script_path)
            .args(extra_args)
            .env("CRUCIBLE_SUPPORT_PATH", &dirs.eggs)
            .current_dir(&self.root)
            .status()?;

        if !status.success() {
            return Err(Error::RecipeError(
                script_path.display().to_string(),
                format!("setup script exited with {}", status),
            )
            .into());
        }
        Ok(())
    }

    fn sync_develop_eggs(&self, previous: &InstalledManifest) -> Result<Vec<String>> {
        let develop_dirs: Vec<String> = self
            .config
            .buildout("develop")
            .unwrap_or_default()
            .split_whitespace()
            .map(String::from)
            .collect();

        let mut current = Vec::new();
        let mut created = Vec::new();

        let result: Result<()> = (|| {
            for rel in &develop_dirs {
                let dir = self.root.join(rel);
                let dist = self.store.add_develop(&dir)?;
                created.push(dist.project.clone());
                current.push(dist.project);
            }
            Ok(())
        })();

        if let Err(e) = result {
            for name in &created {
                let _ = self.store.remove_develop(name);
            }
            return Err(e);
        }

        for prev_name in &previous.installed_develop_eggs {
            if !current.contains(prev_name) {
                self.store.remove_develop(prev_name)?;
            }
        }

        Ok(current)
    }

    fn compute_signature(&self, ws: &WorkingSet) -> String {
        let mut contributions: Vec<String> = ws
            .iter()
            .map(|d| match d.kind {
                Kind::Develop => self
                    .store
                    .develop_signature(d)
                    .unwrap_or_else(|_| d.archive_basename()),
                Kind::Binary | Kind::Source => d.archive_basename(),
            })
            .collect();
        contributions.sort();
        let signature = contributions.join(" ");
        slog::debug!(self.logger, "computed signature"; "signature" => &signature);
        signature
    }

    fn part_options(&self, name: &str) -> Result<IndexMap<String, String>> {
        let section = self
            .config
            .sections
            .get(name)
            .ok_or_else(|| Error::MissingSection(name.to_string()))?;
        let mut options = IndexMap::new();
        for key in section.keys() {
            options.insert(key.clone(), self.config.get(name, &key)?);
        }
        Ok(options)
    }

    fn warn_unused_options(&self, name: &str) {
        if let Some(section) = self.config.sections.get(name) {
            for key in section.unused() {
                self.shell
                    .status(Status::Warn, format!("{}: unused option '{}'", name, key));
            }
        }
    }

    /// Best-effort uninstall: load the recipe from the part's own frozen
    /// `recipe` option (the live config section may no longer exist if the
    /// part was dropped entirely), call its optional uninstall hook, then
    /// delete every recorded file/directory (§4.H step 8).
    fn uninstall_part(&self, name: &str, prev: &InstalledPart, dirs: &Directories) -> Result<()> {
        slog::debug!(self.logger, "uninstalling part"; "part" => name);
        if let Some(spec_str) = prev.options.get("recipe") {
            let spec = RecipeSpec::parse(spec_str);
            if let Ok(recipe) = self.registry.load(&spec) {
                let ws = WorkingSet::new();
                let part_logger = self.logger.new(slog::o!("part" => name.to_string()));
                let ctx = PartContext {
                    name,
                    options: &prev.options,
                    root: &self.root,
                    bin_dir: &dirs.bin,
                    parts_dir: &dirs.parts,
                    eggs_dir: &dirs.eggs,
                    develop_eggs_dir: &dirs.develop_eggs,
                    working_set: &ws,
                    logger: &part_logger,
                };
                let _ = recipe.uninstall(&ctx);
            }
        }

        for file in &prev.installed {
            let _ = remove_path(&self.root.join(file));
        }

        Ok(())
    }
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        remove_dir_all::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
