//! Deals with pretty-printing information to the user (i.e. not logs; those are for debugging
//! purposes, not for the user to see.)

use console::{style, StyledObject};
use std::fmt::Display;

/// The requested verbosity of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Verbose,
    Normal,
    Quiet,
}

/// The bracketed status tag printed before a part transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Installing,
    Updating,
    Uninstalling,
    Skip,
    Warn,
    Error,
}

impl Status {
    fn tag(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Installing => "ins",
            Status::Updating => "upd",
            Status::Uninstalling => "unin",
            Status::Skip => "skip",
            Status::Warn => "warn",
            Status::Error => "xxx",
        }
    }

    fn styled(self) -> StyledObject<&'static str> {
        let tag = self.tag();
        match self {
            Status::New | Status::Installing | Status::Updating => style(tag).green().bold(),
            Status::Uninstalling => style(tag).red().bold(),
            Status::Skip => style(tag).cyan(),
            Status::Warn => style(tag).yellow().bold(),
            Status::Error => style(tag).red().bold(),
        }
    }
}

/// Owns the tool's user-facing output, as distinct from `slog` debug logging.
#[derive(Debug, Clone)]
pub struct Shell {
    verbosity: Verbosity,
}

impl Default for Shell {
    fn default() -> Self {
        Shell {
            verbosity: Verbosity::Normal,
        }
    }
}

impl Shell {
    pub fn new(verbosity: Verbosity) -> Self {
        Shell { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, v: Verbosity) {
        self.verbosity = v;
    }

    /// Print a `[tag] message` line, respecting verbosity.
    pub fn status(&self, status: Status, message: impl Display) {
        if self.verbosity == Verbosity::Quiet && status != Status::Error && status != Status::Warn
        {
            return;
        }
        println!("[{}] {}", status.styled(), message);
    }

    /// A debug-only line, only shown with `-v`.
    pub fn verbose(&self, message: impl Display) {
        if self.verbosity == Verbosity::Verbose {
            println!("  {}", message);
        }
    }
}
