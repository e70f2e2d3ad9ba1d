use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("document not found: {}", .0.display())]
    MissingDocument(PathBuf),

    #[error("could not parse {document}: {message}")]
    Parse { document: String, message: String },

    #[error("lock on {} still held after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown field '{0}': expected one of current_phase, status, plans_complete, last_activity")]
    UnknownField(String),

    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("phase not found: {0}")]
    PhaseNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlanningError>;
