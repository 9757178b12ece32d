use super::{build_context, build_controller, build_resolver};
use clap::ArgMatches;
use crucible::util::error::Doing;
use crucible::util::shell::Shell;
use failure::ResultExt;
use std::path::{Path, PathBuf};

pub fn run(
    global: &ArgMatches,
    sub: &ArgMatches,
    shell: &Shell,
    logger: &slog::Logger,
) -> crucible::Result<()> {
    let ctx = build_context(global, logger)?;
    let resolver = build_resolver(&ctx, logger);
    let controller = build_controller(&ctx, resolver, shell, logger);

    let interpreter = PathBuf::from(
        ctx.config
            .buildout("executable")
            .unwrap_or_else(|_| "python3".to_string()),
    );
    let script_path = Path::new(sub.value_of("script").expect("script is required"));
    let extra_args: Vec<String> = sub
        .values_of("args")
        .unwrap_or_default()
        .map(String::from)
        .collect();

    controller
        .setup(&interpreter, script_path, &extra_args)
        .context(Doing(format!("running {}", script_path.display())))?;
    Ok(())
}
