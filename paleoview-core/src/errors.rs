use thiserror::Error;

/// Error type for data access and aggregation failures.
#[derive(Error, Debug)]
pub enum PaleoError {
    /// A flat file, archive, archive record or correction grid could not be found.
    #[error("Could not find {what}. Expected data at: {attempted}")]
    DataNotFound { attempted: String, what: String },
    #[error("Could not open archive file: {path}. {cause}")]
    ArchiveOpenFailed { path: String, cause: String },
    #[error("Unknown parameter '{id}'")]
    UnknownParameter { id: String },
    #[error("The data location for {parameter} has not been defined yet")]
    DataLocationUndefined { parameter: String },
    #[error("Malformed data in {path}: {cause}")]
    MalformedData { path: String, cause: String },
    #[error("Invalid formula: {0}")]
    InvalidFormula(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Operation was cancelled")]
    Cancelled,
    #[error("I/O failure reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl PaleoError {
    pub fn not_found(attempted: impl Into<String>, what: impl Into<String>) -> Self {
        PaleoError::DataNotFound {
            attempted: attempted.into(),
            what: what.into(),
        }
    }

    pub fn malformed(path: impl Into<String>, cause: impl ToString) -> Self {
        PaleoError::MalformedData {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    /// True for errors a caller can recover from by pointing at another data location
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PaleoError::DataNotFound { .. }
                | PaleoError::ArchiveOpenFailed { .. }
                | PaleoError::Io { .. }
        )
    }
}

/// Convenience type for `Result<T, PaleoError>`.
pub type PaleoResult<T> = Result<T, PaleoError>;
