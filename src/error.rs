use thiserror::Error;

pub type ArmoryResult<T> = Result<T, ArmoryError>;

#[derive(Error, Debug)]
pub enum ArmoryError {
    /// The access token was rejected by the backing API (401).
    #[error("Authentication expired, please sign in again")]
    AuthExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Nothing to show: {0}")]
    EmptyResult(String),

    #[error("Row changed since it was fetched: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ArmoryError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ArmoryError::AuthExpired)
    }

    /// Business-rule rejections and empty reads are reported inline; everything
    /// else is a failure of the triggering action.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ArmoryError::Validation(_) | ArmoryError::EmptyResult(_)
        )
    }
}
