//! Client-side expiring key/value stores.
//!
//! The session core keeps exactly two entries here: the CSRF `state` token for
//! the redirect handshake and the persisted session record used to restore a
//! session after a reload. Both are cookies; [`CookieStore`] abstracts over
//! where the cookie jar actually lives.

use std::collections::HashMap;

use cookie::{Cookie, SameSite};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::types::UserProfile;

/// Cookie-equivalent store scoped to the session core.
pub trait CookieStore: Send + Sync + 'static {
    /// Current value of a cookie, or `None` when absent or expired.
    fn get(&self, name: &str) -> Option<String>;

    /// Add or overwrite a cookie. A cookie with a zero max-age removes the entry.
    fn set(&self, cookie: Cookie<'static>);

    fn remove(&self, name: &str);
}

/// In-process cookie jar that honours `Max-Age`/`Expires`.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, Cookie<'static>>>,
}

impl MemoryCookieStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all cookies that have not expired.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let now = OffsetDateTime::now_utc();
        let mut cookies = self.cookies.lock();
        cookies.retain(|_, c| !is_expired(c, now));
        cookies.keys().cloned().collect()
    }
}

fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    cookie.expires_datetime().is_some_and(|at| at <= now)
}

impl CookieStore for MemoryCookieStore {
    fn get(&self, name: &str) -> Option<String> {
        let mut cookies = self.cookies.lock();
        let expired = is_expired(cookies.get(name)?, OffsetDateTime::now_utc());
        if expired {
            cookies.remove(name);
            return None;
        }
        cookies.get(name).map(|c| c.value().to_string())
    }

    fn set(&self, mut cookie: Cookie<'static>) {
        let name = cookie.name().to_string();
        if let Some(max_age) = cookie.max_age() {
            if max_age <= Duration::ZERO {
                self.cookies.lock().remove(&name);
                return;
            }
            if cookie.expires_datetime().is_none() {
                cookie.set_expires(OffsetDateTime::now_utc() + max_age);
            }
        }
        self.cookies.lock().insert(name, cookie);
    }

    fn remove(&self, name: &str) {
        self.cookies.lock().remove(name);
    }
}

/// Create the CSRF `state` cookie for an outgoing authorization redirect.
pub(crate) fn state_cookie(
    name: &str,
    state: &str,
    ttl: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), state.to_string()))
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ttl)
        .build()
}

/// Durable copy of the authenticated user kept across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSessionRecord {
    pub user: UserProfile,
    pub has_valid_session: bool,
}

impl PersistedSessionRecord {
    #[must_use]
    pub fn new(user: UserProfile) -> Self {
        Self {
            user,
            has_valid_session: true,
        }
    }
}

/// Outcome of reading the persisted session record.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RecordRead {
    Absent,
    Present(PersistedSessionRecord),
    /// A cookie exists but does not decode into a record.
    Corrupt,
}

/// Create the persisted session record cookie.
pub(crate) fn session_record_cookie(
    name: &str,
    record: &PersistedSessionRecord,
    ttl_days: i64,
    secure: bool,
) -> Result<Cookie<'static>, serde_json::Error> {
    let json = serde_json::to_string(record)?;
    Ok(Cookie::build((name.to_string(), urlencoding::encode(&json).into_owned()))
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::days(ttl_days))
        .build())
}

/// Read the persisted session record from the store.
pub(crate) fn read_session_record(store: &dyn CookieStore, name: &str) -> RecordRead {
    let Some(raw) = store.get(name) else {
        return RecordRead::Absent;
    };
    let decoded = match urlencoding::decode(&raw) {
        Ok(decoded) => decoded,
        Err(_) => return RecordRead::Corrupt,
    };
    match serde_json::from_str::<PersistedSessionRecord>(&decoded) {
        Ok(record) => RecordRead::Present(record),
        Err(e) => {
            tracing::debug!(error = %e, "Persisted session record does not decode");
            RecordRead::Corrupt
        }
    }
}
