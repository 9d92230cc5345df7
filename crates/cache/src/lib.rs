//! Sample caching for fpbench runs.

pub mod cache;

pub use cache::*;
