//! Device location with throttling and change detection

mod resolver;

pub use resolver::{DEFAULT_THROTTLE, LocationResolver, Resolution, ResolutionSource};
