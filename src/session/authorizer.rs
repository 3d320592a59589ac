//! Role-based capability predicates over a [`Session`].
//!
//! Everything here is pure: an unauthenticated session or an unrecognized
//! role answers `false` to every predicate.

use super::state::Session;
use crate::types::Role;

/// How a multi-role gate combines its required roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Session not settled yet; show the loading fallback.
    Loading,
    Granted,
    Denied,
}

/// Read-only role view of a session.
#[derive(Debug, Clone, Copy)]
pub struct RoleAuthorizer<'a> {
    session: &'a Session,
}

impl<'a> RoleAuthorizer<'a> {
    #[must_use]
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Role of the authenticated user.
    #[must_use]
    pub fn role(&self) -> Option<&'a Role> {
        if !self.session.is_authenticated() {
            return None;
        }
        self.session
            .user()
            .map(|u| &u.role)
            .filter(|r| r.is_recognized())
    }

    #[must_use]
    pub fn has_any_role(&self, required: &[Role]) -> bool {
        self.role().is_some_and(|role| required.contains(role))
    }

    /// Users carry a single role, so this holds only when `required` names
    /// exactly one distinct role and the user has it.
    #[must_use]
    pub fn has_all_roles(&self, required: &[Role]) -> bool {
        let Some(first) = required.first() else {
            return false;
        };
        required.iter().all(|r| r == first) && self.has_any_role(std::slice::from_ref(first))
    }

    #[must_use]
    pub fn gate(&self, required: &[Role], mode: GateMode) -> GateDecision {
        if self.session.is_loading() {
            return GateDecision::Loading;
        }
        let granted = match mode {
            GateMode::Any => self.has_any_role(required),
            GateMode::All => self.has_all_roles(required),
        };
        if granted {
            GateDecision::Granted
        } else {
            GateDecision::Denied
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is(&Role::Admin)
    }

    #[must_use]
    pub fn is_tutor(&self) -> bool {
        self.is(&Role::Tutor)
    }

    #[must_use]
    pub fn is_professor(&self) -> bool {
        self.is(&Role::Professor)
    }

    #[must_use]
    pub fn is_student(&self) -> bool {
        self.is(&Role::Student)
    }

    #[must_use]
    pub fn is_recommender(&self) -> bool {
        self.is(&Role::Recommender)
    }

    fn is(&self, role: &Role) -> bool {
        self.role() == Some(role)
    }
}

impl Session {
    #[must_use]
    pub fn authorizer(&self) -> RoleAuthorizer<'_> {
        RoleAuthorizer::new(self)
    }
}
