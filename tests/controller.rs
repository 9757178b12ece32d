use crucible::cache::{Cache, CacheConfig};
use crucible::config;
use crucible::index::{Index, Indices, RemoteDist};
use crucible::part::controller::Controller;
use crucible::part::manifest::InstalledManifest;
use crucible::part::registry::StaticRegistry;
use crucible::part::{PartContext, Recipe, RecipeFailure, RecipeRegistry, RecipeResult, RecipeSpec};
use crucible::resolve::{InstallerConfig, Resolver};
use crucible::util::error::Result;
use crucible::util::shell::Shell;
use crucible::config::ConfigTree;
use crucible::distribution::store::Store;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempdir::TempDir;

struct EmptyIndex;
impl Index for EmptyIndex {
    fn obtain(&self, _project: &str, _req: &semver::VersionReq) -> Result<Option<RemoteDist>> {
        Ok(None)
    }
    fn candidates(&self, _project: &str) -> Result<Vec<RemoteDist>> {
        Ok(vec![])
    }
    fn download(&self, _dist: &RemoteDist, _dir: &Path) -> Result<PathBuf> {
        unreachable!("no part in this suite resolves to a remote fetch")
    }
}

fn load_config(root: &Path, text: &str) -> ConfigTree {
    let file = root.join("buildout.cfg");
    fs::write(&file, text).unwrap();
    config::load(root, &file, None, &[]).unwrap()
}

fn fake_recipe_dist(store_eggs: &Path, project: &str) {
    fs::create_dir_all(store_eggs.join(format!("{}-0.0.0", project))).unwrap();
}

fn make_controller<'a, R: RecipeRegistry>(
    root: &Path,
    config: &'a ConfigTree,
    store: &'a Store,
    registry: &'a R,
    shell: &'a Shell,
) -> Controller<'a, EmptyIndex, R> {
    let indices = Indices::new(EmptyIndex);
    let indices: &'a Indices<EmptyIndex> = Box::leak(Box::new(indices));
    let cache = Cache::new(CacheConfig::default(), discard()).unwrap();
    let cache: &'a Cache = Box::leak(Box::new(cache));
    let installer_config: &'a InstallerConfig = Box::leak(Box::new(InstallerConfig::default()));
    let resolver = Resolver::new(store, indices, cache, installer_config, discard());

    Controller {
        root: root.to_path_buf(),
        config,
        store,
        resolver,
        manifest_path: root.join(".installed.cfg"),
        registry,
        shell,
        logger: discard(),
    }
}

fn discard() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

/// S1/S2: a directory part installs through the public `directory` recipe
/// and a no-op rerun leaves the manifest byte-identical (invariant 2).
#[test]
fn install_via_builtin_directory_recipe_is_stable_on_rerun() {
    let root = TempDir::new("controller-it").unwrap();
    let config = load_config(
        root.path(),
        "[buildout]\nparts = a\n[a]\nrecipe = crucible.recipes.directory\n",
    );
    let store = Store::new(
        root.path().join(config.buildout("eggs-directory").unwrap()),
        root.path()
            .join(config.buildout("develop-eggs-directory").unwrap()),
    );
    store.ensure_dirs().unwrap();
    fake_recipe_dist(&store.eggs_dir, "crucible.recipes.directory");

    let registry = StaticRegistry::with_builtins();
    let shell = Shell::default();
    let controller = make_controller(root.path(), &config, &store, &registry, &shell);

    controller.install(vec![]).unwrap();
    assert!(root.path().join("parts").join("a").exists());

    let manifest = InstalledManifest::load(&root.path().join(".installed.cfg"))
        .unwrap()
        .unwrap();
    assert_eq!(manifest.order, vec!["a".to_string()]);
    assert_eq!(
        manifest.parts["a"].installed,
        vec!["parts/a".to_string()]
    );

    let bytes1 = fs::read(root.path().join(".installed.cfg")).unwrap();
    controller.install(vec![]).unwrap();
    let bytes2 = fs::read(root.path().join(".installed.cfg")).unwrap();
    assert_eq!(bytes1, bytes2, "a no-op rerun must not perturb the manifest");
}

/// S7: dropping a part from `parts` uninstalls it and erases its recorded
/// files, while an untouched sibling part survives (invariant 1).
#[test]
fn removing_a_part_uninstalls_it() {
    let root = TempDir::new("controller-it").unwrap();
    let store = Store::new(root.path().join("eggs"), root.path().join("develop-eggs"));
    store.ensure_dirs().unwrap();
    fake_recipe_dist(&store.eggs_dir, "crucible.recipes.directory");

    let registry = StaticRegistry::with_builtins();
    let shell = Shell::default();

    let config = load_config(
        root.path(),
        "[buildout]\nparts = a b\n[a]\nrecipe = crucible.recipes.directory\n[b]\nrecipe = crucible.recipes.directory\n",
    );
    {
        let controller = make_controller(root.path(), &config, &store, &registry, &shell);
        controller.install(vec![]).unwrap();
    }
    assert!(root.path().join("parts").join("a").exists());
    assert!(root.path().join("parts").join("b").exists());

    let config2 = load_config(root.path(), "[buildout]\nparts = a\n[a]\nrecipe = crucible.recipes.directory\n");
    let controller2 = make_controller(root.path(), &config2, &store, &registry, &shell);
    controller2.install(vec![]).unwrap();

    assert!(root.path().join("parts").join("a").exists());
    assert!(
        !root.path().join("parts").join("b").exists(),
        "a part dropped from parts= must be uninstalled"
    );

    let manifest = InstalledManifest::load(&root.path().join(".installed.cfg"))
        .unwrap()
        .unwrap();
    assert!(!manifest.parts.contains_key("b"));
    assert!(manifest.parts.contains_key("a"));
}

/// A recipe that records its own install/uninstall calls (by part name) in
/// a shared log, so an external observer can see the controller's ordering
/// without reaching into its internals.
struct LoggingRecipe {
    log: Rc<RefCell<Vec<String>>>,
}

impl Recipe for LoggingRecipe {
    fn install(&self, ctx: &PartContext) -> RecipeResult {
        self.log.borrow_mut().push(format!("install:{}", ctx.name));
        let target = ctx.parts_dir.join(ctx.name);
        fs::create_dir_all(&target).map_err(|e| RecipeFailure {
            partial: vec![],
            error: e.into(),
        })?;
        Ok(vec![target])
    }

    fn uninstall(&self, ctx: &PartContext) -> crucible::util::error::Result<()> {
        self.log
            .borrow_mut()
            .push(format!("uninstall:{}", ctx.name));
        Ok(())
    }
}

struct LoggingRegistry {
    log: Rc<RefCell<Vec<String>>>,
}

impl RecipeRegistry for LoggingRegistry {
    fn load(&self, _spec: &RecipeSpec) -> Result<Box<dyn Recipe>> {
        Ok(Box::new(LoggingRecipe {
            log: self.log.clone(),
        }))
    }
}

/// Invariant 10: parts install in declared order and, when all are dropped
/// at once, uninstall in the exact reverse order.
#[test]
fn parts_install_forward_and_uninstall_in_reverse() {
    let root = TempDir::new("controller-it").unwrap();
    let store = Store::new(root.path().join("eggs"), root.path().join("develop-eggs"));
    store.ensure_dirs().unwrap();
    fake_recipe_dist(&store.eggs_dir, "demo.logger");

    let log = Rc::new(RefCell::new(Vec::new()));
    let registry = LoggingRegistry { log: log.clone() };
    let shell = Shell::default();

    let config = load_config(
        root.path(),
        "[buildout]\nparts = a b c\n[a]\nrecipe = demo.logger\n[b]\nrecipe = demo.logger\n[c]\nrecipe = demo.logger\n",
    );
    {
        let controller = make_controller(root.path(), &config, &store, &registry, &shell);
        controller.install(vec![]).unwrap();
    }
    assert_eq!(
        *log.borrow(),
        vec!["install:a", "install:b", "install:c"],
        "parts install in the order they're declared"
    );
    log.borrow_mut().clear();

    let config2 = load_config(root.path(), "[buildout]\nparts =\n");
    let controller2 = make_controller(root.path(), &config2, &store, &registry, &shell);
    controller2.install(vec![]).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["uninstall:c", "uninstall:b", "uninstall:a"],
        "dropping every part uninstalls them in reverse install order"
    );

    let manifest = InstalledManifest::load(&root.path().join(".installed.cfg"))
        .unwrap()
        .unwrap();
    assert!(manifest.order.is_empty());
    assert!(manifest.parts.is_empty());
}
