use std::sync::Arc;

use tokio::sync::watch;
use url::Url;

use super::config::{SessionConfig, SessionSettings};
use super::error::SessionError;
use super::handshake;
use super::notify::{Navigator, Notification, Notifier};
use super::state::{Session, SessionStatus};
use crate::client::AuthBackend;
use crate::storage::{self, CookieStore, PersistedSessionRecord, RecordRead};
use crate::types::{PasswordCredentials, UserProfile};

/// Process-wide owner of the current [`Session`].
///
/// Share it behind an `Arc`; consumers read through [`snapshot`](Self::snapshot)
/// or a [`subscribe`](Self::subscribe)d receiver and never mutate directly.
/// Mutations are last-writer-wins: callers must not run `login_with_password`
/// or `complete_token_exchange` concurrently.
pub struct SessionStore<B> {
    backend: B,
    cookies: Arc<dyn CookieStore>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    state: watch::Sender<Session>,
}

impl<B: AuthBackend> SessionStore<B> {
    #[must_use]
    pub fn new(
        backend: B,
        config: &SessionConfig,
        cookies: Arc<dyn CookieStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(Session::initializing());
        Self {
            backend,
            cookies,
            notifier,
            settings: config.settings.clone(),
            state,
        }
    }

    /// Current session.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    /// Receiver that observes every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Restore the session persisted by a previous page load.
    ///
    /// Never fails: any problem settles the session as unauthenticated.
    pub async fn initialize(&self) {
        let record = match storage::read_session_record(
            &*self.cookies,
            &self.settings.session_cookie_name,
        ) {
            RecordRead::Absent => {
                tracing::debug!("No persisted session");
                self.settle(Session::unauthenticated());
                return;
            }
            // The credential cookie may still be valid; the backend decides.
            RecordRead::Corrupt => {
                tracing::debug!("Persisted session unreadable, verifying with backend");
                None
            }
            RecordRead::Present(record) => Some(record),
        };

        match self.backend.fetch_profile().await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Session restored");
                self.establish(user);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = ?record.as_ref().map(|r| &r.user.id),
                    "Persisted session rejected by backend"
                );
                self.clear_record();
                self.settle(Session::unauthenticated());
            }
        }
    }

    /// Email/password login.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Login`] when the backend answers without a
    /// profile, or [`SessionError::Backend`] when the request fails. The prior
    /// authenticated state is kept in both cases.
    pub async fn login_with_password(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
        anti_automation_token: impl Into<String>,
    ) -> Result<UserProfile, SessionError> {
        let credentials = PasswordCredentials {
            email: email.into(),
            password: password.into(),
            anti_automation_token: anti_automation_token.into(),
        };
        self.state.send_modify(|s| s.set_loading(true));

        let result = match self.backend.login(&credentials).await {
            Ok(response) => response.into_profile().map_err(SessionError::from),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "Password login successful");
                self.establish(user.clone());
                self.notifier.notify(Notification::success(
                    "Signed in",
                    format!("Welcome, {}", user.display_name),
                ));
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Password login failed");
                self.state.send_modify(|s| s.set_loading(false));
                Err(e)
            }
        }
    }

    /// Start the identity-provider login; control leaves the application.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if the authorization URL cannot be obtained.
    pub async fn begin_provider_login(
        &self,
        navigator: &dyn Navigator,
    ) -> Result<Url, SessionError> {
        handshake::depart(self, navigator).await
    }

    /// Adopt the session the backend established during the callback exchange.
    ///
    /// The credential travels in an HTTP-only cookie, so this only fetches the
    /// profile it identifies.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if the profile cannot be fetched.
    pub async fn complete_token_exchange(&self) -> Result<UserProfile, SessionError> {
        self.state.send_modify(|s| s.set_loading(true));
        match self.backend.fetch_profile().await {
            Ok(user) => {
                self.establish(user.clone());
                Ok(user)
            }
            Err(e) => {
                tracing::error!(error = %e, "Token exchange failed");
                self.state.send_modify(|s| s.set_loading(false));
                Err(e.into())
            }
        }
    }

    /// Sign out locally; the backend logout is best-effort.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!(error = %e, "Backend logout failed");
        }
        self.settle(Session::unauthenticated());
        self.clear_record();
        tracing::info!("Logged out");
        self.notifier
            .notify(Notification::info("Signed out", "You have signed out"));
    }

    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn cookies(&self) -> &dyn CookieStore {
        &*self.cookies
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        &*self.notifier
    }

    pub(crate) fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn settle(&self, session: Session) {
        self.state.send_replace(session);
    }

    fn establish(&self, user: UserProfile) {
        let record = PersistedSessionRecord::new(user.clone());
        match storage::session_record_cookie(
            &self.settings.session_cookie_name,
            &record,
            self.settings.session_ttl_days,
            self.settings.secure_cookies,
        ) {
            Ok(cookie) => self.cookies.set(cookie),
            Err(e) => tracing::error!(error = %e, "Failed to persist session"),
        }
        self.settle(Session::authenticated(user));
    }

    fn clear_record(&self) {
        self.cookies.remove(&self.settings.session_cookie_name);
    }
}

#[cfg(feature = "http")]
impl SessionStore<crate::client::ApiClient> {
    /// Build a store backed by the HTTP [`ApiClient`](crate::client::ApiClient).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if the HTTP client cannot be constructed.
    pub fn from_config(
        config: &SessionConfig,
        cookies: Arc<dyn CookieStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, SessionError> {
        let client = crate::client::ApiClient::new(config.backend().clone())?;
        Ok(Self::new(client, config, cookies, notifier))
    }
}
