use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::ApiFailure;

/// Backend user identifier (opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Platform role carried on a [`UserProfile`].
///
/// The backend sends Spanish role names (`profesor`, `alumno`, `recomendador`);
/// English spellings are accepted too. Values outside the known set are kept
/// verbatim in [`Role::Other`] and match no capability predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Tutor,
    Professor,
    Student,
    Recommender,
    /// Default role for principals without a platform role.
    User,
    Other(String),
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Tutor => "tutor",
            Self::Professor => "profesor",
            Self::Student => "alumno",
            Self::Recommender => "recomendador",
            Self::User => "user",
            Self::Other(raw) => raw,
        }
    }

    /// Whether this is one of the platform's known roles.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Pick the application role from an identity-provider role list.
    ///
    /// Priority is admin, then tutor, then student; anything else is [`Role::User`].
    #[must_use]
    pub fn from_provider_roles<S: AsRef<str>>(roles: &[S]) -> Self {
        let has = |name: &str| roles.iter().any(|r| r.as_ref() == name);
        if has("admin") {
            Self::Admin
        } else if has("tutor") {
            Self::Tutor
        } else if has("alumno") || has("student") {
            Self::Student
        } else {
            Self::User
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.as_str() {
            "admin" => Self::Admin,
            "tutor" => Self::Tutor,
            "profesor" | "professor" => Self::Professor,
            "alumno" | "student" => Self::Student,
            "recomendador" | "recommender" => Self::Recommender,
            "user" => Self::User,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(raw) => raw,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated principal as returned by the backend profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserProfile {
    pub id: UserId,
    #[serde(rename = "nombreCompleto", alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "image", alias = "imageUrl", default)]
    pub image_url: String,
    #[serde(rename = "isActive", alias = "active", default)]
    pub active: bool,
    pub role: Role,
}

impl UserProfile {
    #[must_use]
    pub fn new(id: impl Into<UserId>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: String::new(),
            image_url: String::new(),
            active: true,
            role,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    #[must_use]
    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = url.into();
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Password login request body.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
    #[serde(rename = "recaptchaToken")]
    pub anti_automation_token: String,
}

impl std::fmt::Debug for PasswordCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCredentials")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Password login response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LoginResponse {
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<LoginData>,
}

#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
    pub info: UserProfile,
}

impl LoginResponse {
    /// The authenticated profile, if the backend reported success.
    ///
    /// # Errors
    ///
    /// Returns the backend's `{statusCode, message}` when it answered without a
    /// profile. A success status with no profile is reported as 401.
    pub fn into_profile(self) -> Result<UserProfile, ApiFailure> {
        match self.data {
            Some(data) if self.status_code == 200 => Ok(data.info),
            _ => {
                let status = if (200..300).contains(&self.status_code) {
                    401
                } else {
                    self.status_code
                };
                let message = if self.message.is_empty() {
                    "login failed".to_owned()
                } else {
                    self.message
                };
                Err(ApiFailure::new(status, message))
            }
        }
    }
}
