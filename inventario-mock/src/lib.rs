//! Inventario Mock - local stand-in for the hosted backend
//!
//! Serves the auth, table and RPC endpoints the client uses, backed by an
//! in-memory store seeded with an administrator and a seller.

pub mod api;
pub mod config;
pub mod error;
pub mod state;

pub use api::router;
pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::{AppState, Store};
