use super::build_context;
use clap::ArgMatches;
use crucible::part::{RecipeRegistry, RecipeSpec};
use crucible::util::error::Doing;
use crucible::util::shell::{Shell, Status};
use failure::ResultExt;

pub fn run(
    global: &ArgMatches,
    sub: &ArgMatches,
    shell: &Shell,
    logger: &slog::Logger,
) -> crucible::Result<()> {
    let ctx = build_context(global, logger)?;
    let spec = RecipeSpec::parse(sub.value_of("recipe").expect("recipe is required"));

    let recipe = ctx
        .registry
        .load(&spec)
        .context(Doing(format!("looking up recipe {}", spec.distribution)))?;

    shell.status(Status::New, format!("{}: {}", spec.distribution, recipe.describe()));
    Ok(())
}
