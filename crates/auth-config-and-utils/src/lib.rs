//! Configuration, paths and logging setup shared by the heimdall crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, TokenRotation, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL, DEFAULT_RETURN_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
