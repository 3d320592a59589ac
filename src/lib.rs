#![doc = include_str!("../README.md")]

pub mod client;
pub mod csrf;
pub mod error;
pub mod session;
pub mod storage;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use client::ApiClient;
pub use client::{AuthBackend, BackendConfig, RedeemOutcome};
pub use error::{ApiFailure, Error};
pub use session::{
    RedirectHandshake, RoleAuthorizer, Session, SessionConfig, SessionError, SessionStore,
};
pub use storage::{CookieStore, MemoryCookieStore, PersistedSessionRecord};
pub use types::{Role, UserId, UserProfile};
