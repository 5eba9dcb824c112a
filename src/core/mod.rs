//! Core infrastructure: configuration, errors, logging, validation.

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use error::{AppError, AppResult};
