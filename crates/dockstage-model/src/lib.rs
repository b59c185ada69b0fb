//! Plain data shared by the staging crates.
//!
//! Nothing in here performs I/O: parsing and validation only.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;
