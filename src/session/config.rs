use std::time::Duration;

use url::Url;

use super::error::SessionError;
use crate::client::BackendConfig;

/// Settings shared by the session store and the redirect handshake.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) state_cookie_name: String,
    pub(crate) state_ttl: time::Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) entry_route: String,
    pub(crate) landing_route: String,
    pub(crate) callback_route: String,
    pub(crate) state_poll_attempts: u32,
    pub(crate) state_poll_interval: Duration,
    pub(crate) failure_redirect_delay: Duration,
}

impl SessionSettings {
    fn defaults() -> Self {
        Self {
            session_cookie_name: "auth_session".into(),
            session_ttl_days: 7,
            state_cookie_name: "keycloak_state".into(),
            state_ttl: time::Duration::hours(1),
            secure_cookies: true,
            entry_route: "/".into(),
            landing_route: "/dashboard".into(),
            callback_route: "/auth/callback".into(),
            state_poll_attempts: 5,
            state_poll_interval: Duration::from_millis(100),
            failure_redirect_delay: Duration::from_secs(2),
        }
    }
}

/// Session core configuration.
///
/// Use [`from_env()`](SessionConfig::from_env) for convention-based setup,
/// or [`new()`](SessionConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) backend: BackendConfig,
    pub(crate) settings: SessionSettings,
}

impl SessionConfig {
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            settings: SessionSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `CAMPUS_API_URL`: platform backend base URL
    ///
    /// # Optional env vars
    /// - `CAMPUS_AUTH_LOGIN_PATH`, `CAMPUS_AUTH_CALLBACK_PATH`, `CAMPUS_PROFILE_PATH`,
    ///   `CAMPUS_PASSWORD_LOGIN_PATH`, `CAMPUS_LOGOUT_PATH`: backend endpoint overrides
    /// - `CAMPUS_CALLBACK_ROUTE`: client route the identity provider returns to
    /// - `CAMPUS_LANDING_ROUTE`: route shown after a successful login
    /// - `CAMPUS_SECURE_COOKIES`: `"0"` or `"false"` disables the `Secure` flag
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if `CAMPUS_API_URL` is missing or invalid.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](SessionConfig::from_env), reading from an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("CAMPUS_API_URL")
            .ok_or_else(|| SessionError::Config("CAMPUS_API_URL is required".into()))?;
        let api_url: Url = api_url
            .parse()
            .map_err(|e| SessionError::Config(format!("CAMPUS_API_URL: {e}")))?;

        let mut backend = BackendConfig::new(api_url);
        if let Some(path) = lookup("CAMPUS_AUTH_LOGIN_PATH") {
            backend = backend.with_authorization_path(path);
        }
        if let Some(path) = lookup("CAMPUS_AUTH_CALLBACK_PATH") {
            backend = backend.with_callback_path(path);
        }
        if let Some(path) = lookup("CAMPUS_PROFILE_PATH") {
            backend = backend.with_profile_path(path);
        }
        if let Some(path) = lookup("CAMPUS_PASSWORD_LOGIN_PATH") {
            backend = backend.with_password_login_path(path);
        }
        if let Some(path) = lookup("CAMPUS_LOGOUT_PATH") {
            backend = backend.with_logout_path(path);
        }

        let secure = !matches!(
            lookup("CAMPUS_SECURE_COOKIES").as_deref(),
            Some("0") | Some("false"),
        );

        let mut config = Self::new(backend).with_secure_cookies(secure);
        if let Some(route) = lookup("CAMPUS_CALLBACK_ROUTE") {
            config = config.with_callback_route(route);
        }
        if let Some(route) = lookup("CAMPUS_LANDING_ROUTE") {
            config = config.with_landing_route(route);
        }
        Ok(config)
    }

    #[must_use]
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_state_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.state_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_state_ttl(mut self, ttl: time::Duration) -> Self {
        self.settings.state_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_entry_route(mut self, path: impl Into<String>) -> Self {
        self.settings.entry_route = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_route(mut self, path: impl Into<String>) -> Self {
        self.settings.landing_route = path.into();
        self
    }

    /// Client route the identity provider returns to. The access-denied view
    /// replaces the location with this route to drop the callback query.
    #[must_use]
    pub fn with_callback_route(mut self, path: impl Into<String>) -> Self {
        self.settings.callback_route = path.into();
        self
    }

    /// Bound the `state` cookie poll: `attempts` re-reads, `interval` apart.
    #[must_use]
    pub fn with_state_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.settings.state_poll_attempts = attempts;
        self.settings.state_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_failure_redirect_delay(mut self, delay: Duration) -> Self {
        self.settings.failure_redirect_delay = delay;
        self
    }
}
