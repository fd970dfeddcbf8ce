//! Data models
//!
//! Rows served by the backend's REST table API. IDs are backend-issued strings.

pub mod profile;
pub mod role;

// Re-exports
pub use profile::*;
pub use role::*;
