//! Shared support types.
//!
//! - [`Error`] / [`Result`] - error handling
//! - [`CrateConfig`] - runtime settings

mod config;
mod error;

pub use config::*;
pub use error::*;
