//! Runner configuration, loadable from a JSON file.

use anyhow::{Context, Result};
use fpbench_engine::{Engine, EngineConfig};
use fpbench_sampler::SamplerOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("n-ary operator `{0}` needs at least one argument")]
    ZeroArity(String),
    #[error("unknown time unit `{0}` (expected ns, us, ms or s)")]
    UnknownTimeUnit(String),
}

/// Number of `unit`s in one millisecond, for the units timings can be
/// reported in.
pub fn units_per_ms(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1e6),
        "us" => Some(1e3),
        "ms" => Some(1.0),
        "s" => Some(1e-3),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Platform name passed to the engine as `--platform`.
    pub name: String,
    /// Target language for `compile` and for choosing a driver backend.
    pub lang: String,
    pub working_dir: PathBuf,
    pub engine: EngineConfig,
    pub time_unit: String,
    pub num_inputs: usize,
    pub num_runs: usize,
    pub threads: usize,
    pub unary_ops: Vec<String>,
    pub binary_ops: Vec<String>,
    pub ternary_ops: Vec<String>,
    /// `[arity, operator]` pairs.
    pub nary_ops: Vec<(usize, String)>,
    pub force_local_sampling: bool,
    pub seed: Option<u64>,
    /// C compiler for the C driver backend.
    pub cc: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "c".to_string(),
            lang: "c".to_string(),
            working_dir: PathBuf::from("work"),
            engine: EngineConfig::default(),
            time_unit: "ms".to_string(),
            num_inputs: 10_000,
            num_runs: 100,
            threads: 1,
            unary_ops: Vec::new(),
            binary_ops: Vec::new(),
            ternary_ops: Vec::new(),
            nary_ops: Vec::new(),
            force_local_sampling: false,
            seed: None,
            cc: "cc".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let blob = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: RunnerConfig = serde_json::from_str(&blob)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Empty("name"));
        }
        if self.lang.is_empty() {
            return Err(ConfigError::Empty("lang"));
        }
        if self.threads == 0 {
            return Err(ConfigError::Zero("threads"));
        }
        if self.num_inputs == 0 {
            return Err(ConfigError::Zero("num_inputs"));
        }
        if self.num_runs == 0 {
            return Err(ConfigError::Zero("num_runs"));
        }
        if units_per_ms(&self.time_unit).is_none() {
            return Err(ConfigError::UnknownTimeUnit(self.time_unit.clone()));
        }
        if let Some((_, op)) = self.nary_ops.iter().find(|(arity, _)| *arity == 0) {
            return Err(ConfigError::ZeroArity(op.clone()));
        }
        Ok(())
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.engine.clone(), self.name.clone())
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            num_inputs: self.num_inputs,
            threads: self.threads,
            force_local: self.force_local_sampling,
            seed: self.seed,
        }
    }
}
