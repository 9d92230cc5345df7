//! Benchmark pipeline orchestration for fpbench.

pub mod backend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod groups;
pub mod report;
pub mod runner;

pub use backend::*;
#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use groups::*;
pub use report::*;
pub use runner::*;
