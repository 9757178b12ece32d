use super::{build_context, build_controller, build_resolver};
use clap::ArgMatches;
use crucible::util::error::Doing;
use crucible::util::shell::Shell;
use failure::ResultExt;

pub fn run(
    global: &ArgMatches,
    _sub: &ArgMatches,
    shell: &Shell,
    logger: &slog::Logger,
) -> crucible::Result<()> {
    let ctx = build_context(global, logger)?;
    let resolver = build_resolver(&ctx, logger);
    let controller = build_controller(&ctx, resolver, shell, logger);

    let this_executable = std::env::current_exe().context(Doing("locating this executable".to_string()))?;
    controller
        .bootstrap(&this_executable, "crucible.bootstrap", "main")
        .context(Doing("bootstrapping the project".to_string()))?;
    Ok(())
}
