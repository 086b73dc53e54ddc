//! # usdc
//!
//! Rust implementation of the crate (.usdc) binary scene-description
//! container: a deduplicating, version-gated store of specs (addressable
//! records keyed by path) and their typed field values.
//!
//! ## Modules
//!
//! - [`util`] - Errors and runtime configuration
//! - [`format`] - On-disk layout: versions, bootstrap, sections, value reps
//! - [`codec`] - Block compression, integer array compression, inline scalars
//! - [`stream`] - Byte-stream backends (mmap, pread, asset) and buffered output
//! - [`value`] - In-memory value model (paths, tokens, list ops, time samples)
//! - [`crate_file`] - Structural tables, value packing and write sessions
//! - [`data`] - Spec-level API: open, save, get/set fields and time samples
//!
//! ## Example
//!
//! ```no_run
//! use usdc::data::CrateData;
//! use usdc::format::SpecType;
//! use usdc::value::{Path, Token, Value};
//!
//! let mut data = CrateData::new();
//! let prim = Path::parse("/World")?;
//! data.create_spec(&prim, SpecType::Prim)?;
//! data.set_field(&prim, "kind", Value::Token(Token::new("model")))?;
//! data.save("world.usdc")?;
//!
//! let reopened = CrateData::open("world.usdc")?;
//! assert!(reopened.has_spec(&prim));
//! # Ok::<(), usdc::Error>(())
//! ```

pub mod util;
pub mod format;
pub mod codec;
pub mod stream;
pub mod value;
pub mod crate_file;
pub mod data;

// Re-export commonly used types
pub use util::{CrateConfig, Error, Result};
pub use crate_file::CrateFile;
pub use data::CrateData;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crate_file::{CrateFile, Packer};
    pub use crate::data::CrateData;
    pub use crate::format::{SpecType, TypeEnum, ValueRep, Version};
    pub use crate::util::{CrateConfig, Error, Result};
    pub use crate::value::{ArrayValue, Path, TimeSamples, Token, Value};
}
