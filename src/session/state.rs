use crate::types::UserProfile;

/// Authenticated-state snapshot held by the running client.
///
/// Only constructible in the three shapes below, so `authenticated` never
/// holds without a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<UserProfile>,
    loading: bool,
    authenticated: bool,
}

/// Coarse session status for consumers that should not look at
/// `authenticated` while a decision is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

impl Session {
    /// State at process start, before the restore attempt settles.
    #[must_use]
    pub fn initializing() -> Self {
        Self {
            user: None,
            loading: true,
            authenticated: false,
        }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            loading: false,
            authenticated: true,
        }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            user: None,
            loading: false,
            authenticated: false,
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.loading {
            SessionStatus::Loading
        } else if self.authenticated {
            SessionStatus::Authenticated
        } else {
            SessionStatus::Unauthenticated
        }
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::initializing()
    }
}
