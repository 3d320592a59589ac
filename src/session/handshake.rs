//! Redirect-based login with an external identity provider.
//!
//! Departure stores a fresh `state` token in a cookie and sends the browser to
//! the provider. On return, [`RedirectHandshake::complete`] validates the query
//! parameters, checks `state` against the cookie, redeems the code at the
//! backend and settles the session.
//!
//! The client-side `state` check is advisory. A mismatch or a missing cookie is
//! logged and the flow continues, because the backend re-validates `state`
//! while redeeming the code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::error::SessionError;
use super::notify::{Navigation, Navigator, Notification};
use super::store::SessionStore;
use crate::client::{AuthBackend, RedeemOutcome};
use crate::csrf;
use crate::error::ApiFailure;
use crate::storage::{self, CookieStore};
use crate::types::UserProfile;

const AUTH_ERROR_TITLE: &str = "Authentication error";

/// Query parameters the identity provider returns with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string, with or without the leading `?`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query string is not valid form encoding.
    pub fn from_query(query: &str) -> Result<Self, serde_urlencoded::de::Error> {
        serde_urlencoded::from_str::<Self>(query.trim_start_matches('?'))
            .map(Self::without_empty)
    }

    /// Treat empty values (`?code=&state=`) as absent.
    #[must_use]
    pub fn without_empty(self) -> Self {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            code: present(self.code),
            state: present(self.state),
            error: present(self.error),
            error_description: present(self.error_description),
        }
    }

    /// Parse the query of a full callback URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the query string is not valid form encoding.
    pub fn from_url(url: &Url) -> Result<Self, serde_urlencoded::de::Error> {
        Self::from_query(url.query().unwrap_or_default())
    }
}

/// Result of comparing the returned `state` with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCheck {
    /// Tokens matched; the stored token has been removed.
    Verified,
    Mismatch,
    /// No stored token became visible within the poll bound.
    Missing,
}

/// Why a handshake ended on the entry route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeFailure {
    /// The provider returned `error` instead of a code.
    ProviderDenied {
        error: String,
        description: Option<String>,
    },
    /// Neither `code` nor `error` was present.
    MalformedReturn,
    /// Code redemption failed at the backend or in transit.
    Transport(ApiFailure),
    /// The backend accepted the code but the profile fetch failed.
    TokenExchange(ApiFailure),
}

impl HandshakeFailure {
    fn description(&self) -> String {
        match self {
            Self::ProviderDenied { error, description } => {
                description.clone().unwrap_or_else(|| error.clone())
            }
            Self::MalformedReturn => "Authorization code not found".to_owned(),
            Self::Transport(failure) | Self::TokenExchange(failure) => failure.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// Session established; navigated to the landing route.
    Authenticated(UserProfile),
    /// Backend refused the principal; the access-denied view should be shown.
    AccessDenied { message: String },
    /// Notified and navigated back to the entry route.
    Failed(HandshakeFailure),
    /// A previous invocation on this page load already ran.
    AlreadyHandled,
}

/// Poll the `state` cookie until it appears or the bound is reached.
///
/// Reads once, then up to `attempts` more times, `interval` apart. Tolerates
/// the cookie written at departure not being visible yet on return.
pub async fn poll_stored_state(
    cookies: &dyn CookieStore,
    name: &str,
    attempts: u32,
    interval: Duration,
) -> Option<String> {
    let mut stored = cookies.get(name);
    let mut made = 0;
    while stored.is_none() && made < attempts {
        tokio::time::sleep(interval).await;
        stored = cookies.get(name);
        made += 1;
    }
    tracing::debug!(attempts = made, found = stored.is_some(), "State cookie poll finished");
    stored
}

/// Departure half of the handshake: fetch the provider URL, store `state`, leave.
pub(crate) async fn depart<B: AuthBackend>(
    store: &SessionStore<B>,
    navigator: &dyn Navigator,
) -> Result<Url, SessionError> {
    let settings = store.settings();
    let mut url = store.backend().authorization_url().await.map_err(|e| {
        tracing::error!(error = %e, "Authorization URL request failed");
        e
    })?;

    let state = csrf::generate_state();
    store.cookies().set(storage::state_cookie(
        &settings.state_cookie_name,
        &state,
        settings.state_ttl,
        settings.secure_cookies,
    ));
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "state")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("state", &state);

    tracing::info!(
        provider = url.host_str().unwrap_or_default(),
        state = %csrf::redact(&state),
        "Redirecting to identity provider"
    );
    navigator.navigate(Navigation::External(url.clone()));
    Ok(url)
}

/// Return half of the redirect login, run once per page load.
pub struct RedirectHandshake<B> {
    store: Arc<SessionStore<B>>,
    navigator: Arc<dyn Navigator>,
    started: AtomicBool,
    access_denied: AtomicBool,
}

impl<B: AuthBackend> RedirectHandshake<B> {
    #[must_use]
    pub fn new(store: Arc<SessionStore<B>>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            started: AtomicBool::new(false),
            access_denied: AtomicBool::new(false),
        }
    }

    /// Start a provider login from this page.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Backend`] if the authorization URL cannot be obtained.
    pub async fn begin(&self) -> Result<Url, SessionError> {
        self.store.begin_provider_login(&*self.navigator).await
    }

    /// Whether the access-denied view should be shown.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        self.access_denied.load(Ordering::SeqCst)
    }

    /// Process the provider's return.
    ///
    /// Only the first call does anything; later calls return
    /// [`HandshakeOutcome::AlreadyHandled`]. Empty query values count as absent.
    ///
    /// On access denial the location is replaced with the configured callback
    /// route, which must be the route this page is served on.
    pub async fn complete(&self, params: CallbackParams) -> HandshakeOutcome {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Callback already processed on this page load");
            return HandshakeOutcome::AlreadyHandled;
        }

        let params = params.without_empty();
        if let Some(error) = params.error {
            tracing::warn!(
                error = %error,
                description = params.error_description.as_deref().unwrap_or("Unknown error"),
                "OAuth error from identity provider"
            );
            let failure = HandshakeFailure::ProviderDenied {
                error,
                description: params.error_description,
            };
            return self.fail_now(failure);
        }

        let Some(code) = params.code else {
            tracing::warn!("Callback reached without authorization code");
            return self.fail_now(HandshakeFailure::MalformedReturn);
        };

        if let Some(received) = params.state.as_deref() {
            self.verify_state(received).await;
        }

        match self
            .store
            .backend()
            .redeem_authorization_code(&code, params.state.as_deref())
            .await
        {
            RedeemOutcome::Success => match self.store.complete_token_exchange().await {
                Ok(user) => {
                    tracing::info!(user_id = %user.id, "Provider login successful");
                    self.store.notifier().notify(Notification::success(
                        "Signed in",
                        "Redirecting to the dashboard...",
                    ));
                    self.navigator
                        .navigate(Navigation::Push(self.store.settings().landing_route.clone()));
                    HandshakeOutcome::Authenticated(user)
                }
                Err(e) => {
                    self.fail_later(HandshakeFailure::TokenExchange(e.normalized()))
                        .await
                }
            },
            RedeemOutcome::AccessDenied { message } => {
                tracing::warn!(message = %message, "Access denied by backend");
                self.access_denied.store(true, Ordering::SeqCst);
                self.navigator
                    .navigate(Navigation::Replace(self.store.settings().callback_route.clone()));
                HandshakeOutcome::AccessDenied { message }
            }
            RedeemOutcome::Failure(failure) => {
                tracing::error!(
                    status = failure.status_code,
                    message = %failure.message,
                    "Code redemption failed"
                );
                self.fail_later(HandshakeFailure::Transport(failure)).await
            }
        }
    }

    /// Compare `received` with the stored `state`, polling briefly for the cookie.
    pub async fn verify_state(&self, received: &str) -> StateCheck {
        let settings = self.store.settings();
        let cookies = self.store.cookies();
        let stored = poll_stored_state(
            cookies,
            &settings.state_cookie_name,
            settings.state_poll_attempts,
            settings.state_poll_interval,
        )
        .await;

        match stored {
            Some(stored) if csrf::state_matches(&stored, received) => {
                cookies.remove(&settings.state_cookie_name);
                StateCheck::Verified
            }
            Some(stored) => {
                tracing::warn!(
                    stored = %csrf::redact(&stored),
                    received = %csrf::redact(received),
                    "OAuth state mismatch, continuing"
                );
                StateCheck::Mismatch
            }
            None => {
                tracing::warn!(
                    received = %csrf::redact(received),
                    "OAuth state cookie not found, continuing"
                );
                StateCheck::Missing
            }
        }
    }

    /// Logout affordance of the access-denied view.
    pub async fn leave_access_denied(&self) {
        self.store.logout().await;
        self.navigator
            .navigate(Navigation::Push(self.store.settings().entry_route.clone()));
    }

    fn fail_now(&self, failure: HandshakeFailure) -> HandshakeOutcome {
        self.store
            .notifier()
            .notify(Notification::error(AUTH_ERROR_TITLE, failure.description()));
        self.navigator
            .navigate(Navigation::Push(self.store.settings().entry_route.clone()));
        HandshakeOutcome::Failed(failure)
    }

    /// Like `fail_now`, but leaves the notification readable before navigating.
    async fn fail_later(&self, failure: HandshakeFailure) -> HandshakeOutcome {
        self.store
            .notifier()
            .notify(Notification::error(AUTH_ERROR_TITLE, failure.description()));
        tokio::time::sleep(self.store.settings().failure_redirect_delay).await;
        self.navigator
            .navigate(Navigation::Push(self.store.settings().entry_route.clone()));
        HandshakeOutcome::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::notify::NotificationLevel;
    use crate::session::testing::{FakeBackend, LaggingCookieStore, ProfileReply, test_config};
    use crate::storage::MemoryCookieStore;
    use crate::types::Role;

    struct Harness {
        handshake: RedirectHandshake<FakeBackend>,
        store: Arc<SessionStore<FakeBackend>>,
        cookies: Arc<dyn CookieStore>,
        notifications: mpsc::UnboundedReceiver<Notification>,
        navigations: mpsc::UnboundedReceiver<Navigation>,
    }

    impl Harness {
        fn with_cookies(backend: FakeBackend, cookies: Arc<dyn CookieStore>) -> Self {
            let (note_tx, notifications) = mpsc::unbounded_channel();
            let (nav_tx, navigations) = mpsc::unbounded_channel();
            let store = Arc::new(SessionStore::new(
                backend,
                &test_config(),
                cookies.clone(),
                Arc::new(note_tx),
            ));
            Self {
                handshake: RedirectHandshake::new(store.clone(), Arc::new(nav_tx)),
                store,
                cookies,
                notifications,
                navigations,
            }
        }

        fn new(backend: FakeBackend) -> Self {
            Self::with_cookies(backend, Arc::new(MemoryCookieStore::new()))
        }

        /// A fresh page load sharing this harness's store and cookies.
        fn reload(&self) -> RedirectHandshake<FakeBackend> {
            let (nav_tx, _) = mpsc::unbounded_channel();
            RedirectHandshake::new(self.store.clone(), Arc::new(nav_tx))
        }

        fn backend(&self) -> &FakeBackend {
            self.store.backend()
        }

        fn navigations(&mut self) -> Vec<Navigation> {
            let mut out = Vec::new();
            while let Ok(nav) = self.navigations.try_recv() {
                out.push(nav);
            }
            out
        }
    }

    fn tutor() -> UserProfile {
        UserProfile::new("u1", "Tutor", Role::Tutor)
    }

    fn params(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_owned),
            state: state.map(str::to_owned),
            ..CallbackParams::default()
        }
    }

    #[test]
    fn callback_params_parse_query() {
        let p = CallbackParams::from_query("?code=abc&state=xyz&session_state=s").unwrap();
        assert_eq!(p, params(Some("abc"), Some("xyz")));

        let p = CallbackParams::from_query("error=access_denied&error_description=User%20cancelled")
            .unwrap();
        assert_eq!(p.error.as_deref(), Some("access_denied"));
        assert_eq!(p.error_description.as_deref(), Some("User cancelled"));

        let url: Url = "https://app.test/auth/callback".parse().unwrap();
        assert_eq!(CallbackParams::from_url(&url).unwrap(), CallbackParams::default());
    }

    #[tokio::test]
    async fn departure_stores_state_and_redirects() {
        let mut h = Harness::new(FakeBackend::new());

        let url = h.handshake.begin().await.unwrap();

        let stored = h.cookies.get("keycloak_state").expect("state cookie set");
        assert_eq!(stored.len(), 22);
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned());
        assert_eq!(state.as_deref(), Some(stored.as_str()));
        assert!(url.query_pairs().any(|(k, v)| k == "client_id" && v == "web"));
        assert_eq!(h.navigations(), vec![Navigation::External(url)]);
    }

    #[tokio::test]
    async fn failed_departure_leaves_no_state_cookie() {
        let mut h = Harness::new(FakeBackend::new().with_failing_authorization_url());

        let err = h.handshake.begin().await.unwrap_err();

        assert!(matches!(err, SessionError::Backend(_)));
        assert!(h.cookies.get("keycloak_state").is_none());
        assert!(h.navigations().is_empty());
    }

    #[test]
    fn empty_query_values_are_absent() {
        let p = CallbackParams::from_query("?code=&state=&error=").unwrap();
        assert_eq!(p, CallbackParams::default());
    }

    #[tokio::test]
    async fn empty_code_is_a_malformed_return() {
        let mut h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        let callback = CallbackParams {
            code: Some(String::new()),
            state: Some(String::new()),
            ..CallbackParams::default()
        };

        let outcome = h.handshake.complete(callback).await;

        assert_eq!(outcome, HandshakeOutcome::Failed(HandshakeFailure::MalformedReturn));
        assert_eq!(h.backend().redeem_calls(), 0);
        assert!(!h.store.snapshot().is_authenticated());
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
    }

    #[tokio::test]
    async fn empty_state_is_not_forwarded() {
        let h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        let callback = CallbackParams::from_query("code=c1&state=").unwrap();

        h.handshake.complete(callback).await;

        assert_eq!(h.backend().redeemed(), vec![("c1".into(), None)]);
    }

    #[tokio::test]
    async fn full_round_trip_authenticates() {
        let mut h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        let url = h.handshake.begin().await.unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        h.navigations();

        let page = h.reload();
        let outcome = page.complete(params(Some("code-1"), Some(&state))).await;

        assert_eq!(outcome, HandshakeOutcome::Authenticated(tutor()));
        assert!(h.store.snapshot().is_authenticated());
        assert_eq!(h.backend().redeemed(), vec![("code-1".into(), Some(state))]);
        assert!(h.cookies.get("keycloak_state").is_none(), "state is single-use");
        assert!(h.cookies.get("auth_session").is_some());
        let note = h.notifications.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn success_navigates_to_landing() {
        let mut h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        h.handshake.complete(params(Some("c"), None)).await;
        assert_eq!(h.navigations(), vec![Navigation::Push("/dashboard".into())]);
    }

    #[tokio::test]
    async fn duplicate_invocation_redeems_once() {
        let h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));

        let (first, second) = tokio::join!(
            h.handshake.complete(params(Some("c"), None)),
            h.handshake.complete(params(Some("c"), None)),
        );

        assert_eq!(first, HandshakeOutcome::Authenticated(tutor()));
        assert_eq!(second, HandshakeOutcome::AlreadyHandled);
        assert_eq!(
            h.handshake.complete(params(Some("c"), None)).await,
            HandshakeOutcome::AlreadyHandled
        );
        assert_eq!(h.backend().redeem_calls(), 1);
    }

    #[tokio::test]
    async fn state_token_is_single_use() {
        let h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        h.cookies
            .set(storage::state_cookie("keycloak_state", "tok", time::Duration::hours(1), false));

        assert_eq!(h.handshake.verify_state("tok").await, StateCheck::Verified);
        assert_eq!(h.reload().verify_state("tok").await, StateCheck::Missing);
        assert!(h.cookies.get("keycloak_state").is_none());
    }

    #[tokio::test]
    async fn state_mismatch_is_soft() {
        let h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        h.cookies
            .set(storage::state_cookie("keycloak_state", "mine", time::Duration::hours(1), false));

        let outcome = h.handshake.complete(params(Some("c"), Some("theirs"))).await;

        assert_eq!(outcome, HandshakeOutcome::Authenticated(tutor()));
        assert_eq!(h.backend().redeem_calls(), 1);
        assert_eq!(h.cookies.get("keycloak_state").as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn missing_state_cookie_is_soft() {
        let h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Ok(tutor())));
        let outcome = h.handshake.complete(params(Some("c"), Some("orphan"))).await;
        assert_eq!(outcome, HandshakeOutcome::Authenticated(tutor()));
    }

    #[tokio::test]
    async fn poll_waits_for_late_cookie() {
        let cookies = LaggingCookieStore::new(2);
        cookies.set(storage::state_cookie("st", "late", time::Duration::hours(1), false));

        let found = poll_stored_state(&cookies, "st", 5, Duration::from_millis(1)).await;

        assert_eq!(found.as_deref(), Some("late"));
        assert_eq!(cookies.reads(), 3);
    }

    #[tokio::test]
    async fn poll_is_bounded() {
        let cookies = LaggingCookieStore::new(0);
        let found = poll_stored_state(&cookies, "st", 3, Duration::from_millis(1)).await;
        assert_eq!(found, None);
        assert_eq!(cookies.reads(), 4);
    }

    #[tokio::test]
    async fn lagging_state_cookie_still_verifies() {
        let lagging = Arc::new(LaggingCookieStore::new(2));
        let h = Harness::with_cookies(
            FakeBackend::new().with_profile(ProfileReply::Ok(tutor())),
            lagging.clone(),
        );
        h.cookies
            .set(storage::state_cookie("keycloak_state", "tok", time::Duration::hours(1), false));

        assert_eq!(h.handshake.verify_state("tok").await, StateCheck::Verified);
        assert_eq!(lagging.reads(), 3);
    }

    #[tokio::test]
    async fn malformed_return_skips_redemption() {
        let mut h = Harness::new(FakeBackend::new());

        let outcome = h.handshake.complete(CallbackParams::default()).await;

        assert_eq!(outcome, HandshakeOutcome::Failed(HandshakeFailure::MalformedReturn));
        assert_eq!(h.backend().redeem_calls(), 0);
        let note = h.notifications.try_recv().unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(note.description, "Authorization code not found");
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
    }

    #[tokio::test]
    async fn provider_error_skips_redemption() {
        let mut h = Harness::new(FakeBackend::new());
        let callback = CallbackParams {
            code: Some("ignored".into()),
            error: Some("access_denied".into()),
            error_description: Some("User cancelled login".into()),
            ..CallbackParams::default()
        };

        let outcome = h.handshake.complete(callback).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failed(HandshakeFailure::ProviderDenied { ref error, .. })
                if error == "access_denied"
        ));
        assert_eq!(h.backend().redeem_calls(), 0);
        assert_eq!(
            h.notifications.try_recv().unwrap().description,
            "User cancelled login"
        );
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
    }

    #[tokio::test]
    async fn access_denied_strips_query_and_stays_unauthenticated() {
        let mut h = Harness::new(FakeBackend::new().with_redeem(RedeemOutcome::AccessDenied {
            message: "Sin permisos".into(),
        }));
        h.store.initialize().await;

        let outcome = h.handshake.complete(params(Some("c"), Some("s"))).await;

        assert_eq!(
            outcome,
            HandshakeOutcome::AccessDenied {
                message: "Sin permisos".into()
            }
        );
        assert!(h.handshake.is_access_denied());
        assert!(!h.store.snapshot().is_authenticated());
        assert_eq!(h.backend().profile_calls(), 0);
        assert_eq!(
            h.navigations(),
            vec![Navigation::Replace("/auth/callback".into())]
        );
    }

    #[tokio::test]
    async fn leaving_access_denied_logs_out() {
        let mut h = Harness::new(FakeBackend::new().with_redeem(RedeemOutcome::AccessDenied {
            message: "no".into(),
        }));
        h.handshake.complete(params(Some("c"), None)).await;
        h.navigations();

        h.handshake.leave_access_denied().await;

        assert_eq!(h.backend().logout_calls(), 1);
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
    }

    #[tokio::test]
    async fn redemption_failure_returns_to_entry() {
        let mut h = Harness::new(
            FakeBackend::new()
                .with_redeem(RedeemOutcome::Failure(ApiFailure::new(500, "backend down"))),
        );
        h.store.initialize().await;

        let outcome = h.handshake.complete(params(Some("c"), None)).await;

        assert_eq!(
            outcome,
            HandshakeOutcome::Failed(HandshakeFailure::Transport(ApiFailure::new(
                500,
                "backend down"
            )))
        );
        assert_eq!(h.notifications.try_recv().unwrap().description, "backend down");
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
        assert!(!h.store.snapshot().is_loading());
    }

    #[tokio::test]
    async fn profile_failure_after_redemption_returns_to_entry() {
        let mut h = Harness::new(FakeBackend::new().with_profile(ProfileReply::Unauthenticated));
        h.store.initialize().await;

        let outcome = h.handshake.complete(params(Some("c"), None)).await;

        assert!(matches!(
            outcome,
            HandshakeOutcome::Failed(HandshakeFailure::TokenExchange(ref f)) if f.status_code == 401
        ));
        let session = h.store.snapshot();
        assert!(!session.is_loading());
        assert!(!session.is_authenticated());
        assert_eq!(h.navigations(), vec![Navigation::Push("/".into())]);
    }
}
