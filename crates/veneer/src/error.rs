//! Error types for engine resolution and template rendering.
//!
//! A single [`Error`] enum covers both halves of the crate: the registry's
//! resolution failures (pattern unknown, descriptor malformed, unit missing)
//! and the template contract's compile/evaluation failures. Nothing is logged
//! or swallowed internally; every error surfaces to the direct caller. The
//! only internal recovery is the registry's load-fallback chain, and even that
//! gives up and surfaces the newest candidate's error once all candidates are
//! exhausted.

use thiserror::Error;

/// Formats a message with its best-known source location prefixed.
fn located(path: &Option<String>, line: &Option<usize>, message: &str) -> String {
    match (path, line) {
        (Some(p), Some(l)) => format!("{}:{}: {}", p, l, message),
        (None, Some(l)) => format!("line {}: {}", l, message),
        (Some(p), None) => format!("{}: {}", p, message),
        (None, None) => message.to_string(),
    }
}

fn undefined(path: &Option<String>, line: &Option<usize>, name: &str) -> String {
    located(path, line, &format!("undefined variable `{}`", name))
}

/// Error type for registry resolution and template rendering.
#[derive(Debug, Error)]
pub enum Error {
    /// No engine is registered for the requested pattern.
    #[error("no engine registered for pattern `{0}`")]
    NotFound(String),

    /// A lazily registered symbolic name is not a valid type path.
    /// Permanent; resolution never falls back past it.
    #[error("malformed engine descriptor `{0}`")]
    MalformedDescriptor(String),

    /// The backing unit loaded but does not export the expected symbol.
    #[error("unit `{unit}` loaded but does not export `{symbol}`")]
    SymbolNotFound { unit: String, symbol: String },

    /// The backing unit is absent. Recoverable during the fallback walk;
    /// surfaced in this form once every candidate has been exhausted.
    #[error("unit not found: `{0}`")]
    UnitNotFound(String),

    /// The backing unit exists but failed to load. Permanent.
    #[error("failed to load unit `{unit}`: {message}")]
    LoadFailed { unit: String, message: String },

    /// The template source could not be translated to an executable unit.
    #[error("{}", located(.path, .line, .message))]
    Compile {
        message: String,
        line: Option<usize>,
        path: Option<String>,
    },

    /// The compiled unit raised while evaluating. The location is rewritten
    /// by [`Template`](crate::Template) to the original source position.
    #[error("{}", located(.path, .line, .message))]
    Evaluation {
        message: String,
        line: Option<usize>,
        path: Option<String>,
    },

    /// A name referenced by the template body could not be resolved against
    /// the supplied scope and locals.
    #[error("{}", undefined(.path, .line, .name))]
    UndefinedVariable {
        name: String,
        line: Option<usize>,
        path: Option<String>,
    },

    /// The caller-supplied scope does not serialize to an object.
    #[error("invalid scope: {0}")]
    Scope(String),

    /// A template was constructed without source text or a source provider.
    #[error("template has no source")]
    MissingSource,

    /// A deferred source provider failed.
    #[error("failed to read template source: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Template-relative line this error was raised at, if the raising engine
    /// recorded one. Lines are 1-based and count generated code lines until
    /// the owning template rewrites them through its line map.
    pub fn template_line(&self) -> Option<usize> {
        match self {
            Error::Compile { line, .. }
            | Error::Evaluation { line, .. }
            | Error::UndefinedVariable { line, .. } => *line,
            _ => None,
        }
    }

    /// Reported source path, once a template has attached one.
    pub fn source_path(&self) -> Option<&str> {
        match self {
            Error::Compile { path, .. }
            | Error::Evaluation { path, .. }
            | Error::UndefinedVariable { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Rewrites the reported location of an evaluation-time error. Non-located
    /// variants pass through unchanged.
    pub(crate) fn relocated(self, line: usize, path: Option<&str>) -> Self {
        let path = path.map(str::to_string);
        match self {
            Error::Evaluation { message, .. } => Error::Evaluation {
                message,
                line: Some(line),
                path,
            },
            Error::UndefinedVariable { name, .. } => Error::UndefinedVariable {
                name,
                line: Some(line),
                path,
            },
            other => other,
        }
    }
}
