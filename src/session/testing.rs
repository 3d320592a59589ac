//! In-memory collaborators for session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cookie::Cookie;
use parking_lot::Mutex;
use url::Url;

use super::config::SessionConfig;
use crate::client::{AuthBackend, BackendConfig, RedeemOutcome};
use crate::error::Error;
use crate::storage::{CookieStore, MemoryCookieStore};
use crate::types::{LoginResponse, PasswordCredentials, UserProfile};

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig::new(BackendConfig::new(
        "https://api.test/".parse().expect("valid test URL"),
    ))
    .with_secure_cookies(false)
    .with_state_poll(2, Duration::from_millis(1))
    .with_failure_redirect_delay(Duration::ZERO)
}

#[derive(Clone)]
pub(crate) enum ProfileReply {
    Ok(UserProfile),
    Unauthenticated,
}

pub(crate) struct FakeBackend {
    authorization_url: Url,
    profile: Mutex<ProfileReply>,
    redeem: Mutex<RedeemOutcome>,
    login: Mutex<Option<serde_json::Value>>,
    logout_fails: bool,
    authorization_fails: bool,
    redeem_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    redeemed: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            authorization_url: "https://idp.test/realms/campus/auth?client_id=web"
                .parse()
                .expect("valid test URL"),
            profile: Mutex::new(ProfileReply::Unauthenticated),
            redeem: Mutex::new(RedeemOutcome::Success),
            login: Mutex::new(None),
            logout_fails: false,
            authorization_fails: false,
            redeem_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            redeemed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_profile(self, reply: ProfileReply) -> Self {
        *self.profile.lock() = reply;
        self
    }

    pub(crate) fn with_redeem(self, outcome: RedeemOutcome) -> Self {
        *self.redeem.lock() = outcome;
        self
    }

    pub(crate) fn with_login_profile(self, user: UserProfile) -> Self {
        *self.login.lock() = Some(serde_json::json!({
            "statusCode": 200,
            "message": "ok",
            "data": {"token": "t", "info": user},
        }));
        self
    }

    pub(crate) fn with_login_rejection(self, message: &str) -> Self {
        *self.login.lock() = Some(serde_json::json!({
            "statusCode": 400,
            "message": message,
        }));
        self
    }

    pub(crate) fn with_failing_authorization_url(mut self) -> Self {
        self.authorization_fails = true;
        self
    }

    pub(crate) fn with_failing_logout(mut self) -> Self {
        self.logout_fails = true;
        self
    }

    pub(crate) fn redeem_calls(&self) -> usize {
        self.redeem_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn redeemed(&self) -> Vec<(String, Option<String>)> {
        self.redeemed.lock().clone()
    }
}

impl AuthBackend for FakeBackend {
    async fn authorization_url(&self) -> Result<Url, Error> {
        if self.authorization_fails {
            return Err(Error::Api {
                status: 503,
                message: "identity provider unavailable".into(),
            });
        }
        Ok(self.authorization_url.clone())
    }

    async fn redeem_authorization_code(&self, code: &str, state: Option<&str>) -> RedeemOutcome {
        self.redeem_calls.fetch_add(1, Ordering::SeqCst);
        self.redeemed
            .lock()
            .push((code.to_owned(), state.map(str::to_owned)));
        tokio::task::yield_now().await;
        self.redeem.lock().clone()
    }

    async fn fetch_profile(&self) -> Result<UserProfile, Error> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        match self.profile.lock().clone() {
            ProfileReply::Ok(user) => Ok(user),
            ProfileReply::Unauthenticated => Err(Error::Unauthenticated),
        }
    }

    async fn login(&self, _credentials: &PasswordCredentials) -> Result<LoginResponse, Error> {
        let body = self.login.lock().clone();
        match body {
            Some(body) => serde_json::from_value(body)
                .map_err(|e| Error::InvalidResponse(e.to_string())),
            None => Err(Error::Api {
                status: 503,
                message: "login unavailable".into(),
            }),
        }
    }

    async fn logout(&self) -> Result<(), Error> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails {
            Err(Error::Api {
                status: 500,
                message: "logout failed".into(),
            })
        } else {
            Ok(())
        }
    }
}

/// Cookie store whose writes become visible only after a number of reads.
pub(crate) struct LaggingCookieStore {
    inner: MemoryCookieStore,
    hidden_reads: AtomicUsize,
    reads: AtomicUsize,
}

impl LaggingCookieStore {
    pub(crate) fn new(hidden_reads: usize) -> Self {
        Self {
            inner: MemoryCookieStore::new(),
            hidden_reads: AtomicUsize::new(hidden_reads),
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CookieStore for LaggingCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let hidden = self
            .hidden_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden { None } else { self.inner.get(name) }
    }

    fn set(&self, cookie: Cookie<'static>) {
        self.inner.set(cookie);
    }

    fn remove(&self, name: &str) {
        self.inner.remove(name);
    }
}
