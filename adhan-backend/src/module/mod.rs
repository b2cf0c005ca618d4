pub mod location;
pub mod net;
pub mod notify;
pub mod prayer;
pub mod scheduled;
