use std::future::Future;

use serde::Deserialize;
use url::Url;

use crate::error::{ApiFailure, Error};
use crate::types::{LoginResponse, PasswordCredentials, UserProfile};

/// Marker the backend puts in `data` when the callback exchange succeeded.
pub const DEFAULT_SUCCESS_MARKER: &str = "Login exitoso";

/// Platform backend endpoints used by the session core.
///
/// Only the API base URL is required; every path has a default.
///
/// ```rust,ignore
/// let config = BackendConfig::new("https://api.example.com/".parse()?)
///     .with_profile_path("/auth/me");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BackendConfig {
    pub(crate) base_url: Url,
    pub(crate) authorization_path: String,
    pub(crate) callback_path: String,
    pub(crate) profile_path: String,
    pub(crate) password_login_path: String,
    pub(crate) logout_path: String,
    pub(crate) success_marker: String,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            authorization_path: "/auth/login".into(),
            callback_path: "/auth/callback".into(),
            profile_path: "/auth/me".into(),
            password_login_path: "/users/login".into(),
            logout_path: "/auth/logout".into(),
            success_marker: DEFAULT_SUCCESS_MARKER.into(),
        }
    }

    /// Override the endpoint that returns the identity provider's authorization URL.
    #[must_use]
    pub fn with_authorization_path(mut self, path: impl Into<String>) -> Self {
        self.authorization_path = path.into();
        self
    }

    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<String>) -> Self {
        self.profile_path = path.into();
        self
    }

    #[must_use]
    pub fn with_password_login_path(mut self, path: impl Into<String>) -> Self {
        self.password_login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_path(mut self, path: impl Into<String>) -> Self {
        self.logout_path = path.into();
        self
    }

    #[must_use]
    pub fn with_success_marker(mut self, marker: impl Into<String>) -> Self {
        self.success_marker = marker.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn success_marker(&self) -> &str {
        &self.success_marker
    }

    /// Resolve an endpoint path against the base URL, keeping any base path prefix.
    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
        url
    }
}

/// Result of redeeming an authorization code at the backend callback endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Backend established the session; fetch the profile next.
    Success,
    /// Backend refused this principal.
    AccessDenied { message: String },
    Failure(ApiFailure),
}

/// Backend operations the session core depends on.
///
/// [`ApiClient`] is the HTTP implementation; tests substitute in-memory fakes.
pub trait AuthBackend: Send + Sync + 'static {
    /// URL of the identity provider's authorization endpoint, without `state`.
    fn authorization_url(&self) -> impl Future<Output = Result<Url, Error>> + Send;

    /// Forward the provider's `code` (and `state`, when present) to the backend.
    ///
    /// Never fails: every error is folded into [`RedeemOutcome::Failure`].
    fn redeem_authorization_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> impl Future<Output = RedeemOutcome> + Send;

    /// Profile of the principal identified by the ambient credential.
    fn fetch_profile(&self) -> impl Future<Output = Result<UserProfile, Error>> + Send;

    fn login(
        &self,
        credentials: &PasswordCredentials,
    ) -> impl Future<Output = Result<LoginResponse, Error>> + Send;

    fn logout(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Body of the authorization-URL endpoint.
///
/// The backend has shipped three shapes over time; this is the only place they
/// are told apart.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorizationUrlPayload {
    Bare(String),
    Wrapped { data: String },
    Nested { data: UrlHolder },
}

#[derive(Debug, Deserialize)]
struct UrlHolder {
    url: String,
}

impl AuthorizationUrlPayload {
    fn into_url(self) -> Result<Url, Error> {
        let raw = match self {
            Self::Bare(url)
            | Self::Wrapped { data: url }
            | Self::Nested {
                data: UrlHolder { url },
            } => url,
        };
        Ok(raw.trim().parse()?)
    }
}

/// Normalize the authorization-URL response body into a URL.
fn parse_authorization_url(body: &str) -> Result<Url, Error> {
    match serde_json::from_str::<AuthorizationUrlPayload>(body) {
        Ok(payload) => payload.into_url(),
        // Plain-text bodies carry the URL directly.
        Err(_) if !body.trim_start().starts_with(['{', '[', '"']) => Ok(body.trim().parse()?),
        Err(e) => Err(Error::InvalidResponse(format!(
            "authorization URL response: {e}"
        ))),
    }
}

/// Callback endpoint response body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallbackBody {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Error body shape shared by all backend endpoints.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

fn classify_callback(status: u16, body: &str, success_marker: &str) -> RedeemOutcome {
    let parsed: CallbackBody = serde_json::from_str(body).unwrap_or_default();
    let effective_status = parsed.status_code.unwrap_or(status);

    if status == 401 || effective_status == 401 {
        let message = parsed
            .message
            .or(parsed.data)
            .unwrap_or_else(|| "access denied".to_owned());
        return RedeemOutcome::AccessDenied { message };
    }

    if (200..300).contains(&status) && parsed.data.as_deref() == Some(success_marker) {
        return RedeemOutcome::Success;
    }

    let message = parsed
        .message
        .or(parsed.data)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "authentication failed".to_owned());
    let status_code = if (200..300).contains(&effective_status) {
        500
    } else {
        effective_status
    };
    RedeemOutcome::Failure(ApiFailure::new(status_code, message))
}

/// HTTP client for the platform backend.
///
/// The underlying `reqwest` client keeps a cookie store: the backend sets its
/// HTTP-only session cookie during the callback exchange and every later request
/// carries it.
#[cfg(feature = "http")]
pub struct ApiClient {
    config: BackendConfig,
    http: reqwest::Client,
}

#[cfg(feature = "http")]
impl ApiClient {
    /// Create a backend client with a cookie-enabled HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be constructed.
    pub fn new(config: BackendConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthenticated);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api {
            status: status.as_u16(),
            message: error_message(&body, &format!("{operation} failed")),
        })
    }

    async fn redeem(&self, code: &str, state: Option<&str>) -> Result<RedeemOutcome, Error> {
        let mut url = self.config.endpoint(&self.config.callback_path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", code);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }

        let response = self.http.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(classify_callback(status, &body, &self.config.success_marker))
    }
}

#[cfg(feature = "http")]
impl AuthBackend for ApiClient {
    async fn authorization_url(&self) -> Result<Url, Error> {
        let url = self.config.endpoint(&self.config.authorization_path);
        let response = self.http.get(url).send().await?;
        let response = Self::ensure_success(response, "authorization URL request").await?;
        parse_authorization_url(&response.text().await?)
    }

    async fn redeem_authorization_code(&self, code: &str, state: Option<&str>) -> RedeemOutcome {
        match self.redeem(code, state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Callback request failed");
                RedeemOutcome::Failure(ApiFailure::new(500, e.to_string()))
            }
        }
    }

    async fn fetch_profile(&self) -> Result<UserProfile, Error> {
        let url = self.config.endpoint(&self.config.profile_path);
        let response = self.http.get(url).send().await?;
        let response = Self::ensure_success(response, "profile request").await?;
        response.json::<UserProfile>().await.map_err(Into::into)
    }

    async fn login(&self, credentials: &PasswordCredentials) -> Result<LoginResponse, Error> {
        let url = self.config.endpoint(&self.config.password_login_path);
        let response = self.http.post(url).json(credentials).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body, "invalid credentials"),
            });
        }
        let response = Self::ensure_success(response, "login").await?;
        response.json::<LoginResponse>().await.map_err(Into::into)
    }

    async fn logout(&self) -> Result<(), Error> {
        let url = self.config.endpoint(&self.config.logout_path);
        let response = self.http.get(url).send().await?;
        Self::ensure_success(response, "logout").await?;
        Ok(())
    }
}
