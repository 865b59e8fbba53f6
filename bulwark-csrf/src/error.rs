use crate::context::HttpResponse;
use http::StatusCode;
use thiserror::Error;

/// Failure to load or persist the secret.
///
/// Always fatal to the operation that hit it: a secret that could not be
/// persisted would make every later validation silently wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cannot store CSRF secret: response headers have already been sent")]
    HeadersSent,

    #[error("Cannot access CSRF storage: no active session")]
    SessionInactive,

    #[error("Stored CSRF state is corrupted: {0}")]
    Corrupted(String),

    #[error("Cookie lifetime of {0} seconds cannot be represented")]
    InvalidLifetime(i64),
}

#[derive(Error, Debug)]
pub enum CsrfError {
    /// The request required a token and none was valid.
    #[error("Invalid CSRF token")]
    InvalidToken,

    /// The request was rejected; the carried response must be sent as is.
    #[error("Request rejected: invalid CSRF token")]
    Rejected(Box<HttpResponse>),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Random bytes could not be generated securely: {0}")]
    Entropy(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CsrfError {
    /// HTTP status a host should answer with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CsrfError::InvalidToken => StatusCode::BAD_REQUEST,
            CsrfError::Rejected(response) => {
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error stems from the client's request rather than a
    /// server-side fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CsrfError::InvalidToken | CsrfError::Rejected(_))
    }

    /// Convert the error into the response a host should send.
    pub fn into_response(self) -> HttpResponse {
        match self {
            CsrfError::Rejected(response) => *response,
            other => {
                let status = other.status_code();
                HttpResponse::new(status.as_u16())
                    .with_body(status.canonical_reason().unwrap_or("Error").as_bytes().to_vec())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;
