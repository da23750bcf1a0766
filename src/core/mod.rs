// Core infrastructure shared by every component

pub mod config;
pub mod errors;

pub use config::CoordinatorConfig;
pub use errors::{Result, RollcallError};
