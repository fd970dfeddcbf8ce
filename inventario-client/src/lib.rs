//! Inventario Client - session layer for Sistema Inventario
//!
//! Restores the signed-in user at startup, loads their profile and role, follows
//! auth events for the rest of the process and answers `(module, action)`
//! permission checks against the loaded role.

pub mod admin;
pub mod backend;
pub mod config;
pub mod error;
pub mod jwt;
pub mod logger;
pub mod session;

pub use admin::{MIN_PASSWORD_LEN, UserAdmin};
pub use backend::{AuthBackend, MemoryBackend, RestBackend, SignOutBehavior};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, SessionError, SessionResult};
pub use session::{AuthSnapshot, ProfileLoad, ProfileStatus, SessionPhase, SessionStore};

// Re-export shared types for convenience
pub use shared::{AuthEvent, AuthEventKind, AuthUser, PermissionSet, Role, Session, UserProfile};
