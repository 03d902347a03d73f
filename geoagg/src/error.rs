use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or semantically inconsistent descriptor or filter.
    #[error("Invalid parameter '{field}': {message}")]
    InvalidParameter { field: String, message: String },

    /// Syntactically valid but unsupported parameter combination.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A required token is structurally missing.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The backing engine failed, timed out or returned something unreadable.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidParameter { .. } => "invalid_parameter",
            Error::NotImplemented(_) => "not_implemented",
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) => "bad_request",
            Error::BackendUnavailable(_) | Error::Http(_) => "backend_unavailable",
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Toml(_) => "internal",
        }
    }

    /// True for failures caused by the caller rather than a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidParameter { .. }
                | Error::NotImplemented(_)
                | Error::NotFound(_)
                | Error::BadRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
