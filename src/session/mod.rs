//! Client-side session core for the campus backend.
//!
//! A [`SessionStore`] owns the current [`Session`], restores it from the
//! persisted record on start, and runs password login, logout and the
//! identity-provider redirect handshake. Role checks go through
//! [`RoleAuthorizer`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use campus_session::session::{CallbackParams, LogNotifier, RedirectHandshake, SessionConfig, SessionStore};
//! use campus_session::storage::MemoryCookieStore;
//!
//! let config = SessionConfig::from_env()?;
//! let store = Arc::new(SessionStore::from_config(
//!     &config,
//!     Arc::new(MemoryCookieStore::new()),
//!     Arc::new(LogNotifier),
//! )?);
//! store.initialize().await;
//!
//! // On the callback route:
//! let handshake = RedirectHandshake::new(store.clone(), navigator);
//! let outcome = handshake.complete(CallbackParams::from_url(&current_url)?).await;
//! ```

mod authorizer;
mod config;
mod error;
mod handshake;
mod notify;
mod state;
mod store;
#[cfg(test)]
mod testing;

pub use authorizer::{GateDecision, GateMode, RoleAuthorizer};
pub use config::SessionConfig;
pub use error::SessionError;
pub use handshake::{
    CallbackParams, HandshakeFailure, HandshakeOutcome, RedirectHandshake, StateCheck,
    poll_stored_state,
};
pub use notify::{LogNotifier, Navigation, Navigator, Notification, NotificationLevel, Notifier};
pub use state::{Session, SessionStatus};
pub use store::SessionStore;
