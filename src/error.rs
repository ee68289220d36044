use std::fmt;

use crate::database::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggerError {
    /// A derived event-collection name failed validation. Indicates a
    /// fingerprint-algorithm bug or a hand-supplied bad template id;
    /// fatal, never retried.
    InvalidTemplateId(String),
    /// The storage layer failed. Logging is best-effort: callers should
    /// surface their original error, not abort on this one.
    Database(DatabaseError),
}

impl fmt::Display for LoggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggerError::InvalidTemplateId(name) => {
                write!(f, "invalid watchdog template id `{}`", name)
            }
            LoggerError::Database(e) => write!(f, "watchdog storage failure: {}", e),
        }
    }
}

impl std::error::Error for LoggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggerError::Database(e) => Some(e),
            LoggerError::InvalidTemplateId(_) => None,
        }
    }
}

impl From<DatabaseError> for LoggerError {
    fn from(error: DatabaseError) -> Self {
        LoggerError::Database(error)
    }
}
