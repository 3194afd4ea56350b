//! Common types and errors for registrar crates.

pub mod error;
pub mod types;

pub use error::{AppError, AppResult};
pub use types::*;
