//! Tabular and JSON views of benchmark results.

use crate::config::RunnerConfig;
use fpbench_core::Expr;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BASELINE: &str = "baseline";

/// `(name, time)` rows: the baseline first, then the rest sorted
/// case-insensitively by name.
pub fn times_table(exprs: &[Expr], times: &[f64]) -> Vec<(String, f64)> {
    let mut rows: Vec<(String, f64)> = exprs
        .iter()
        .zip(times)
        .map(|(expr, &time)| (expr.display_name().to_string(), time))
        .collect();
    rows.sort_by_key(|(name, _)| (name != BASELINE, name.to_lowercase()));
    rows
}

pub fn render_times(rows: &[(String, f64)], time_unit: &str) -> String {
    let mut out = format!("op | time ({time_unit})\n");
    for (name, time) in rows {
        if name == BASELINE {
            let _ = writeln!(out, "baseline: {time}");
        } else {
            let _ = writeln!(out, "[{name} {time}]");
        }
    }
    out
}

/// Engine cost estimate against measured time, for expressions with a cost.
pub fn cost_time_pairs(exprs: &[Expr], times: &[f64]) -> Vec<(f64, f64)> {
    exprs
        .iter()
        .zip(times)
        .filter_map(|(expr, &time)| expr.cost.map(|cost| (cost, time)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprRecord {
    pub name: String,
    pub key: String,
    pub argc: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub platform: String,
    pub lang: String,
    pub time_unit: String,
    pub generated_at_unix_ms: u128,
    pub exprs: Vec<ExprRecord>,
    /// Raw `(cost, err)` points as returned by the engine.
    #[serde(default)]
    pub frontier: Vec<(f64, f64)>,
}

impl BenchmarkReport {
    pub fn new(config: &RunnerConfig, exprs: &[Expr], times: Option<&[f64]>) -> Self {
        let records = exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| ExprRecord {
                name: expr.display_name().to_string(),
                key: expr.key.to_string(),
                argc: expr.argc,
                descr: expr.descr.clone(),
                cost: expr.cost,
                err: expr.err,
                time: times.and_then(|times| times.get(i).copied()),
            })
            .collect();

        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis();

        Self {
            platform: config.name.clone(),
            lang: config.lang.clone(),
            time_unit: config.time_unit.clone(),
            generated_at_unix_ms,
            exprs: records,
            frontier: Vec::new(),
        }
    }

    pub fn with_frontier(mut self, frontier: Vec<(f64, f64)>) -> Self {
        self.frontier = frontier;
        self
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let blob = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&blob)?)
    }
}
