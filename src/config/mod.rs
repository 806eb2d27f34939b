//! Configuration loading and logging setup.

pub mod logging;
pub mod settings;

pub use settings::{Settings, VenueCredentials};
