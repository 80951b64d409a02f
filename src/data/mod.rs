//! Remote data acquisition.
//!
//! - dated directory discovery over the archive's HTTP listing pages (`catalog`)
//! - idempotent local file caching with atomic installs (`cache`)

pub mod cache;
pub mod catalog;

pub use cache::*;
pub use catalog::*;
