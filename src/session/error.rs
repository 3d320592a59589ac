use crate::error::{ApiFailure, Error};

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Backend answered the password login without a profile.
    #[error("Login rejected ({status}): {message}")]
    Login { status: u16, message: String },

    /// Backend round trip failed.
    #[error(transparent)]
    Backend(#[from] Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ApiFailure> for SessionError {
    fn from(failure: ApiFailure) -> Self {
        Self::Login {
            status: failure.status_code,
            message: failure.message,
        }
    }
}

impl SessionError {
    /// Normalized `{statusCode, message}` view for presentation.
    #[must_use]
    pub fn normalized(&self) -> ApiFailure {
        match self {
            Self::Backend(e) => e.normalized(),
            Self::Login { status, message } => ApiFailure::new(*status, message.clone()),
            Self::Config(message) => ApiFailure::new(500, message.clone()),
        }
    }
}
