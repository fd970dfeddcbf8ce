//! Session bootstrap and permission gate

mod single_flight;
mod state;
mod store;

pub use single_flight::{Flight, SingleFlight};
pub use state::{AuthSnapshot, ProfileLoad, ProfileStatus, SessionPhase};
pub use store::{ProfileFlight, SessionStore};
