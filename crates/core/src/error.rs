use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Parsing error in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("Invalid object: {0}")]
    InvalidObject(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Cannot plan operation: {0}")]
    Plan(String),
    #[error("Invalid edit: {0}")]
    Edit(String),
    #[error("Another bulk operation is already running")]
    Busy,
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CoreError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for alscope_api::ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(what) => alscope_api::ApiError::NotFound(what),
            CoreError::Plan(reason) => alscope_api::ApiError::InvalidArgument(reason),
            other => alscope_api::ApiError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alscope_api::ApiError;

    #[test]
    fn test_into_api_error() {
        let err: ApiError = CoreError::NotFound("table Customer".into()).into();
        assert!(matches!(err, ApiError::NotFound(ref what) if what == "table Customer"));

        let err: ApiError = CoreError::Plan("no id ranges".into()).into();
        assert!(matches!(err, ApiError::InvalidArgument(_)));

        let err: ApiError = CoreError::Busy.into();
        assert!(matches!(err, ApiError::Internal(ref msg) if msg.contains("already running")));
    }
}
