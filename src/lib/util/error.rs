//! Because nothing ever works correctly...

pub use failure::Fail;

pub type Result<T> = std::result::Result<T, failure::Error>;

/// The named, user-facing error kinds the core can raise.
///
/// `InternalError` and `RecipeError` from the propagation policy aren't
/// separate variants here: any other error escaping the core (an `io::Error`,
/// a panic caught at the recipe boundary, ...) is wrapped as `failure::Error`
/// directly and rendered by `main` with its downcast chain instead of a
/// dedicated kind, matching the teacher's "one big enum for named user
/// errors, `failure::Error` for everything else" split.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
    #[fail(display = "section [{}] doesn't exist", _0)]
    MissingSection(String),
    #[fail(display = "option '{}' in section [{}] doesn't exist", _1, _0)]
    MissingOption(String, String),
    #[fail(display = "Circular reference in substitutions.")]
    CircularReference,
    #[fail(display = "the referenced option \"{}\" doesn't exist", _0)]
    BadReferenceSyntax(String),
    #[fail(display = "recursive file include: {}", _0)]
    RecursiveInclude(String),
    #[fail(display = "invalid value for option '{}:{}': {}", _0, _1, _2)]
    BadConfigValue(String, String, String),
    #[fail(display = "Couldn't download '{}' in offline mode.", _0)]
    Offline(String),
    #[fail(display = "checksum mismatch for {}", _0)]
    BadChecksum(String),
    #[fail(display = "Couldn't find a distribution for '{}'.", _0)]
    MissingDistribution(String),
    #[fail(display = "could not download '{}'", _0)]
    CannotDownload(String),
    #[fail(display = "already have: {} but {} requires {}", have, requirer, requirement)]
    VersionConflict {
        have: String,
        requirer: String,
        requirement: String,
    },
    #[fail(
        display = "the requirement for '{}' is pinned to a version ({}) that {} disallows",
        project, pin, requirement
    )]
    IncompatibleVersion {
        project: String,
        pin: String,
        requirement: String,
    },
    #[fail(display = "'{}' is neither a zip nor a gzipped tar archive", _0)]
    BadArchive(String),
    #[fail(display = "recipe '{}' raised: {}", _0, _1)]
    RecipeError(String, String),
}

/// A single human-readable label on the "doing" trail `main` renders above
/// `Error: <message>` (§7 propagation policy).
#[derive(Clone, Debug)]
pub struct Doing(pub String);

impl std::fmt::Display for Doing {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
