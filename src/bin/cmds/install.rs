use super::{build_controller, build_resolver, build_context};
use clap::ArgMatches;
use crucible::util::error::Doing;
use crucible::util::shell::Shell;
use failure::ResultExt;

pub fn run(
    global: &ArgMatches,
    sub: &ArgMatches,
    shell: &Shell,
    logger: &slog::Logger,
) -> crucible::Result<()> {
    let ctx = build_context(global, logger)?;
    let resolver = build_resolver(&ctx, logger);
    let controller = build_controller(&ctx, resolver, shell, logger);

    let parts: Vec<String> = sub
        .values_of("parts")
        .unwrap_or_default()
        .map(String::from)
        .collect();

    controller
        .install(parts)
        .context(Doing("installing parts".to_string()))?;
    Ok(())
}
