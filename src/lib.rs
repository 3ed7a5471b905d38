//! Nextcloud developer tools API
//!
//! A thin HTTP facade reporting health, upstream status and host resources
//! for a Nextcloud instance, plus a small set of developer tools.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod system;
pub mod telemetry;
pub mod upstream;

pub use api::{create_router, ApiState};
pub use config::AppConfig;
pub use executor::{CommandExecutor, LiveExecutor, SimulatedExecutor};
