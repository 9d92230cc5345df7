//! One-session-per-call client over the engine protocol.

use crate::error::EngineResult;
use crate::request::Request;
use crate::response::{self, Improved};
use crate::session::{EngineConfig, EngineSession};
use fpbench_core::Sample;
use std::path::Path;
use tracing::{debug, warn};

/// One input expression and the variants whose error is measured against it.
#[derive(Debug, Clone)]
pub struct ErrorQuery<'a> {
    pub input: &'a str,
    pub variants: Vec<&'a str>,
}

/// Launches a fresh engine session for every operation, always on the
/// configured platform unless an operation says otherwise.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    platform: String,
}

impl Engine {
    pub fn new(config: EngineConfig, platform: impl Into<String>) -> Self {
        Self {
            config,
            platform: platform.into(),
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn open_session(&self) -> EngineResult<EngineSession> {
        EngineSession::start(&self.config, &self.platform)
    }

    /// Runs `body` against a new session and closes it afterwards, sending
    /// `exit` on the error path too before the error is returned.
    pub fn with_session<T>(
        &self,
        platform: &str,
        body: impl FnOnce(&mut EngineSession) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut session = EngineSession::start(&self.config, platform)?;
        match body(&mut session) {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(close_error) = session.close() {
                    warn!(platform, error = %close_error, "failed to close engine after error");
                }
                Err(error)
            }
        }
    }

    /// Samples `count` points of an expression with `argc` variables.
    pub fn sample(&self, expr: &str, argc: usize, count: usize) -> EngineResult<Sample> {
        self.with_session(&self.platform, |session| {
            session.send(&Request::Sample { count, expr })?;
            let line = session.read_line()?;
            response::parse_sample(&line, argc, count)
        })
    }

    /// Reads every expression of a benchmark file, one text per expression.
    pub fn read(&self, path: &Path) -> EngineResult<Vec<String>> {
        self.with_session(&self.platform, |session| {
            session.send(&Request::Read { path })?;
            session.send_exit()?;
            let output = session.read_to_end()?;
            Ok(response::parse_read(&output))
        })
    }

    pub fn compile(&self, lang: &str, exprs: &[&str]) -> EngineResult<Vec<String>> {
        self.with_session(&self.platform, |session| {
            exprs
                .iter()
                .map(|&expr| -> EngineResult<String> {
                    session.send(&Request::Compile { lang, expr })?;
                    Ok(response::parse_compiled(&session.read_line()?))
                })
                .collect()
        })
    }

    pub fn cost(&self, exprs: &[&str]) -> EngineResult<Vec<f64>> {
        self.with_session(&self.platform, |session| {
            exprs
                .iter()
                .map(|&expr| -> EngineResult<f64> {
                    session.send(&Request::Cost { expr })?;
                    response::parse_scalar("cost", &session.read_line()?)
                })
                .collect()
        })
    }

    /// `None` marks expressions with no valid desugaring on this platform.
    pub fn desugar(&self, exprs: &[&str]) -> EngineResult<Vec<Option<String>>> {
        self.with_session(&self.platform, |session| {
            exprs
                .iter()
                .map(|&expr| -> EngineResult<Option<String>> {
                    session.send(&Request::Desugar { expr })?;
                    response::parse_desugar(&session.read_line()?)
                })
                .collect()
        })
    }

    /// One error per variant, per query, in variant order.
    pub fn error(&self, queries: &[ErrorQuery<'_>]) -> EngineResult<Vec<Vec<f64>>> {
        self.with_session(&self.platform, |session| {
            queries
                .iter()
                .map(|query| -> EngineResult<Vec<f64>> {
                    session.send(&Request::Error {
                        input: query.input,
                        variants: &query.variants,
                    })?;
                    response::parse_errors(&session.read_line()?, query.variants.len())
                })
                .collect()
        })
    }

    /// Improves `exprs` with `threads` engine workers, optionally on another platform.
    pub fn improve(
        &self,
        exprs: &[&str],
        threads: usize,
        platform: Option<&str>,
    ) -> EngineResult<Vec<Improved>> {
        let platform = platform.unwrap_or(&self.platform);
        debug!(platform, count = exprs.len(), threads, "requesting improvement");
        self.with_session(platform, |session| {
            session.send(&Request::Improve { exprs, threads })?;
            session.send_exit()?;
            let output = session.read_to_end()?;
            response::parse_improved(&output)
        })
    }

    /// Combines per-input (cost, error) frontiers into one frontier.
    /// The number of returned points is not checked against the number of inputs.
    pub fn pareto(&self, frontiers: &[Vec<(f64, f64)>]) -> EngineResult<Vec<(f64, f64)>> {
        self.with_session(&self.platform, |session| {
            session.send(&Request::Pareto { frontiers })?;
            response::parse_pareto(&session.read_line()?)
        })
    }
}
