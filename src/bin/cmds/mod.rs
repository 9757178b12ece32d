pub mod bootstrap;
pub mod describe;
pub mod init;
pub mod install;
pub mod setup;

use clap::ArgMatches;
use crucible::cache::{Cache, CacheConfig};
use crucible::config::ConfigTree;
use crucible::distribution::store::Store;
use crucible::index::finddirs::FindLinksIndex;
use crucible::index::Indices;
use crucible::part::controller::Controller;
use crucible::part::registry::StaticRegistry;
use crucible::resolve::{InstallerConfig, Resolver};
use crucible::util::error::{Doing, Error};
use crucible::util::shell::Shell;
use crucible::Result;
use failure::ResultExt;
use std::path::PathBuf;

/// Parse a single `section:option=value` assignment (§6 CLI surface).
pub fn parse_assignment(value: &str) -> Result<(String, String, String)> {
    let colon = value
        .find(':')
        .ok_or_else(|| Error::BadConfigValue("cli".to_string(), value.to_string(), "expected 'section:option=value'".to_string()))?;
    let (section, rest) = (&value[..colon], &value[colon + 1..]);
    let eq = rest.ok_or_eq()?;
    let (option, val) = (&rest[..eq], &rest[eq + 1..]);
    Ok((section.to_string(), option.to_string(), val.to_string()))
}

trait FindEquals {
    fn ok_or_eq(&self) -> Result<usize>;
}

impl FindEquals for str {
    fn ok_or_eq(&self) -> Result<usize> {
        self.find('=').ok_or_else(|| {
            Error::BadConfigValue(
                "cli".to_string(),
                self.to_string(),
                "expected 'section:option=value'".to_string(),
            )
            .into()
        })
    }
}

fn collect_assignments(args: &ArgMatches) -> Result<Vec<(String, String, String)>> {
    args.values_of("assign")
        .unwrap_or_default()
        .map(parse_assignment)
        .collect()
}

/// Everything a command needs once the configuration is loaded: the
/// project root, the loaded tree, and the collaborators the controller is
/// built from (§12).
pub struct Context {
    pub root: PathBuf,
    pub config: ConfigTree,
    pub store: Store,
    pub indices: Indices<FindLinksIndex>,
    pub cache: Cache,
    pub installer_config: InstallerConfig,
    pub registry: StaticRegistry,
    pub manifest_path: PathBuf,
}

pub fn build_context(global: &ArgMatches, logger: &slog::Logger) -> Result<Context> {
    let root = std::env::current_dir().context(Doing("resolving the project root".to_string()))?;
    let project_file = root.join(global.value_of("config").unwrap_or("buildout.cfg"));

    let user_defaults = if global.is_present("skip-user-defaults") {
        None
    } else {
        directories::BaseDirs::new().map(|d| d.home_dir().join(".buildout").join("default.cfg"))
    };

    let overrides = collect_assignments(global)?;

    let config = crucible::config::load(&root, &project_file, user_defaults.as_deref(), &overrides)
        .context(Doing(format!("loading {}", project_file.display())))?;
    slog::debug!(logger, "loaded configuration"; "file" => project_file.display().to_string());

    let eggs_dir = root.join(config.buildout("eggs-directory")?);
    let develop_eggs_dir = root.join(config.buildout("develop-eggs-directory")?);
    let store = Store::new(eggs_dir, develop_eggs_dir);

    let find_links: Vec<PathBuf> = config
        .buildout("find-links")
        .unwrap_or_default()
        .split_whitespace()
        .map(|s| root.join(s))
        .collect();
    let indices = Indices::with_logger(FindLinksIndex::new(find_links), logger.new(slog::o!("component" => "index")));

    let download_cache = config.buildout("download-cache").ok().map(|p| root.join(p));
    let offline = flag(global, "offline", "online", &config, "offline")?;
    let cache_config = CacheConfig {
        directory: download_cache,
        namespace: None,
        offline,
        fallback: false,
        hash_name: false,
    };
    let cache = Cache::new(cache_config, logger.new(slog::o!("component" => "cache")))?;

    let newest = flag(global, "newest", "not-newest", &config, "newest")?;
    let installer_config = InstallerConfig {
        newest,
        prefer_final: bool_option(&config, "prefer-final", true)?,
        always_unzip: false,
        allow_picked_versions: bool_option(&config, "allow-picked-versions", true)?,
        use_dependency_links: bool_option(&config, "use-dependency-links", false)?,
        install_from_cache: bool_option(&config, "install-from-cache", false)?,
        default_versions: Default::default(),
        allowed_hosts: Default::default(),
    };

    let manifest_path = root.join(config.buildout("installed").unwrap_or_else(|_| ".installed.cfg".to_string()));

    Ok(Context {
        root,
        config,
        store,
        indices,
        cache,
        installer_config,
        registry: StaticRegistry::with_builtins(),
        manifest_path,
    })
}

/// `Controller` borrows `ctx.store` directly while also owning a `Resolver`
/// that borrows the same `Store` — so both the resolver and the context it
/// borrows from must outlive the controller built from them.
pub fn build_resolver<'a>(
    ctx: &'a Context,
    logger: &'a slog::Logger,
) -> Resolver<'a, FindLinksIndex> {
    Resolver::new(
        &ctx.store,
        &ctx.indices,
        &ctx.cache,
        &ctx.installer_config,
        logger.new(slog::o!("component" => "resolver")),
    )
}

pub fn build_controller<'a>(
    ctx: &'a Context,
    resolver: Resolver<'a, FindLinksIndex>,
    shell: &'a Shell,
    logger: &slog::Logger,
) -> Controller<'a, FindLinksIndex, StaticRegistry> {
    Controller {
        root: ctx.root.clone(),
        config: &ctx.config,
        store: &ctx.store,
        resolver,
        manifest_path: ctx.manifest_path.clone(),
        registry: &ctx.registry,
        shell,
        logger: logger.new(slog::o!("component" => "controller")),
    }
}

fn flag(
    global: &ArgMatches,
    on_flag: &str,
    off_flag: &str,
    config: &ConfigTree,
    option: &str,
) -> Result<bool> {
    if global.is_present(on_flag) {
        return Ok(true);
    }
    if global.is_present(off_flag) {
        return Ok(false);
    }
    bool_option(config, option, false)
}

fn bool_option(config: &ConfigTree, option: &str, default: bool) -> Result<bool> {
    match config.buildout(option) {
        Ok(v) => Ok(v.trim() == "true"),
        Err(_) => Ok(default),
    }
}
