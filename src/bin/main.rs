mod cmds;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use console::style;
use crucible::util::error::{Doing, Error};
use crucible::util::shell::{Shell, Verbosity};
use slog::Drain;
use std::process::exit;

fn cli() -> App<'static, 'static> {
    App::new("crucible")
        .about("A declarative, reproducible build-and-install orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .takes_value(true)
                .value_name("FILE")
                .help("Configuration file to use (default: buildout.cfg)")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .global(true)
                .conflicts_with("quiet")
                .help("Verbose output"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .global(true)
                .help("Quiet output"),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .takes_value(true)
                .value_name("SECONDS")
                .global(true)
                .help("Socket timeout in seconds"),
        )
        .arg(
            Arg::with_name("skip-user-defaults")
                .short("U")
                .global(true)
                .help("Skip the user-wide defaults file"),
        )
        .arg(
            Arg::with_name("offline")
                .short("o")
                .global(true)
                .conflicts_with("online")
                .help("Force offline mode"),
        )
        .arg(
            Arg::with_name("online")
                .short("O")
                .global(true)
                .help("Force online mode"),
        )
        .arg(
            Arg::with_name("newest")
                .short("n")
                .global(true)
                .conflicts_with("not-newest")
                .help("Always check for the newest available distributions"),
        )
        .arg(
            Arg::with_name("not-newest")
                .short("N")
                .global(true)
                .help("Only use already-installed distributions when they satisfy requirements"),
        )
        .arg(
            Arg::with_name("debug")
                .short("D")
                .global(true)
                .help("Drop into a debugger on an unhandled recipe error"),
        )
        .arg(
            Arg::with_name("assign")
                .value_name("section:option=value")
                .multiple(true)
                .global(true)
                .validator(validate_assignment)
                .help("Override a configuration option before loading"),
        )
        .subcommand(
            SubCommand::with_name("install")
                .about("Install (or update) parts, bringing disk state in line with the config")
                .arg(Arg::with_name("parts").multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("bootstrap")
                .about("Create the directory skeleton and the tool's own launcher"),
        )
        .subcommand(SubCommand::with_name("init").about("Create an empty project skeleton"))
        .subcommand(
            SubCommand::with_name("setup")
                .about("Run an external setup script with the support package on its path")
                .arg(Arg::with_name("script").required(true))
                .arg(Arg::with_name("args").multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("describe")
                .about("Describe a recipe's accepted options")
                .arg(Arg::with_name("recipe").required(true)),
        )
}

fn validate_assignment(value: String) -> Result<(), String> {
    cmds::parse_assignment(&value)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn shell_from_args(args: &ArgMatches) -> Shell {
    if args.is_present("verbose") {
        Shell::new(Verbosity::Verbose)
    } else if args.is_present("quiet") {
        Shell::new(Verbosity::Quiet)
    } else {
        Shell::default()
    }
}

/// `slog-term` + `slog-async`, the debug-level sink `-v` output is drawn
/// from (§10); user-facing progress goes through `Shell` instead.
fn build_logger(verbose: bool) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let min_level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };
    let drain = slog::LevelFilter::new(drain, min_level).fuse();
    slog::Logger::root(drain, slog::o!())
}

fn go() -> crucible::Result<()> {
    let args = cli().get_matches();
    let shell = shell_from_args(&args);
    let logger = build_logger(args.is_present("verbose"));

    match args.subcommand() {
        ("install", Some(sub)) => cmds::install::run(&args, sub, &shell, &logger),
        ("bootstrap", Some(sub)) => cmds::bootstrap::run(&args, sub, &shell, &logger),
        ("init", Some(sub)) => cmds::init::run(&args, sub, &shell, &logger),
        ("setup", Some(sub)) => cmds::setup::run(&args, sub, &shell, &logger),
        ("describe", Some(sub)) => cmds::describe::run(&args, sub, &shell, &logger),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn main() {
    match go() {
        Ok(()) => exit(0),
        Err(e) => {
            for cause in e.iter_chain() {
                if let Some(ctx) = cause.downcast_ref::<failure::Context<Doing>>() {
                    eprintln!("{} {}", style("While:").yellow().bold(), ctx.get_context());
                }
            }
            eprintln!("{} {}", style("Error:").red().bold(), e);

            // §12: 0 success, 1 a named user/recipe error, 2 anything else
            // (I/O failures, panics at the recipe boundary, ...).
            exit(if e.downcast_ref::<Error>().is_some() { 1 } else { 2 });
        }
    }
}
