//! Prayer-time fetching, caching and notification scheduling

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod module;
pub mod platform;
pub mod settings;
pub mod store;

#[cfg(test)]
mod testing;

pub use app::{AdhanApp, Collaborators};
pub use error::AdhanError;
