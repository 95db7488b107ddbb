//! # WerkWerk Config
//!
//! Host configuration for WerkWerk workers: which job a worker polls, how
//! often, how many retries the store may grant, and how logs are emitted.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
