use std::time::Duration;

use thiserror::Error;

/// Failure of a bounded external command invocation.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command `{program}` timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("command `{program}` produced more than {limit} bytes of output")]
    OutputOverflow { program: String, limit: usize },

    #[error("command `{program}` exited with {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{what} parse failed: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not configured")]
    Unavailable(&'static str),
}

impl GatewayError {
    pub fn parse(what: &'static str, source: serde_json::Error) -> Self {
        Self::Parse { what, source }
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejected request at the API boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid action")]
    InvalidCronAction,

    #[error("invalid session")]
    InvalidSessionName,

    #[error("days must be a positive number")]
    InvalidDays,
}
