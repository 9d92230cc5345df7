//! Client for the external expression-improvement engine.
//!
//! The engine is a long-lived process spoken to over two line-delimited
//! pipes. [`EngineSession`] owns one such process and guarantees that the
//! `(exit)` command is its final input; [`Engine`] opens one session per
//! operation and parses each response into typed values.

pub mod client;
pub mod error;
pub mod request;
pub mod response;
pub mod session;

pub use client::{Engine, ErrorQuery};
pub use error::{EngineError, EngineResult};
pub use request::Request;
pub use response::Improved;
pub use session::{EngineConfig, EngineSession, SessionState};
