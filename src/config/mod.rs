//! Restarter configuration model
//!
//! Describes which workloads depend on which services and the soak time a
//! service's pods must reach before dependants are rolled.

mod loader;
pub mod types;


pub use loader::{decode_service_dependants, load_service_dependants};
pub use types::*;
