pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod monitor;
pub mod scheduler;
pub mod store;
pub mod system;

pub use error::{Error, Result};
