use almanac_ical::ParseError;

/// Failures surfaced by a calendar backend.
///
/// Absence on single-object fetches is not an error: those operations
/// return `Ok(None)`. `NotFound` is reserved for operations that need the
/// target to exist (updates, deletes, writes into a missing calendar).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("sync token is unknown or expired")]
    ExpiredToken,
    #[error("too many results, the backend returns at most {limit} entries")]
    TooManyResults { limit: usize },
    #[error("malformed calendar object: {0}")]
    MalformedObject(String),
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::MalformedObject(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
