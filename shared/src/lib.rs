//! Shared types for Sistema Inventario
//!
//! Domain types used by both the client session layer and the mock backend:
//! sessions and auth events, user profiles, roles and permission sets.

pub mod client;
pub mod models;
pub mod permissions;
pub mod session;
pub mod util;

// Re-exports
pub use models::{ModuleGrant, PermissionSet, ProfileUpdate, Role, UserProfile};
pub use serde::{Deserialize, Serialize};
pub use session::{AuthEvent, AuthEventKind, AuthUser, Session};
