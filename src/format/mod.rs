//! Low-level crate file format definitions.
//!
//! - [`Version`] - format version and compatibility rules
//! - [`BootStrap`], [`Section`], [`TableOfContents`] - file framing
//! - [`ValueRep`], [`TypeEnum`] - packed value descriptors
//! - table handles and the [`Field`] / [`Spec`] records

mod layout;
mod records;
mod value_rep;
mod version;

pub use layout::*;
pub use records::*;
pub use value_rep::*;
pub use version::*;
