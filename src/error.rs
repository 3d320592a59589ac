use serde::{Deserialize, Serialize};

/// Errors raised at the backend HTTP boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the ambient credential.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Non-success status from the backend.
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    /// Response body did not match any accepted shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Normalized `{statusCode, message}` failure shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFailure {
    pub status_code: u16,
    pub message: String,
}

impl ApiFailure {
    #[must_use]
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status {})", self.message, self.status_code)
    }
}

impl Error {
    /// HTTP status associated with this error. Transport failures report 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Api { status, .. } => *status,
            #[cfg(feature = "http")]
            Self::Http(e) => e.status().map_or(500, |s| s.as_u16()),
            Self::InvalidResponse(_) | Self::Url(_) => 500,
        }
    }

    /// Collapse into the `{statusCode, message}` shape shown to callers.
    #[must_use]
    pub fn normalized(&self) -> ApiFailure {
        let message = match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ApiFailure::new(self.status_code(), message)
    }
}
