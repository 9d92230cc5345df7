//! Parsers for engine responses.
//!
//! Each parser validates the exact shape a command promises and reports
//! anything else as a protocol violation.

use crate::error::{EngineError, EngineResult};
use fpbench_core::{parse_numeral, Sample};

/// One rewritten expression reported by `improve`.
#[derive(Debug, Clone, PartialEq)]
pub struct Improved {
    pub text: String,
    pub cost: f64,
    pub err: f64,
}

pub const DESUGAR_FAILED: &[&str] = &["#f", "false"];

fn numeral(command: &'static str, field: &str) -> EngineResult<f64> {
    parse_numeral(field).map_err(|e| EngineError::protocol(command, e.to_string()))
}

/// Parses `count` points of the form `v1 v2 …, gt` separated by `|`.
pub fn parse_sample(line: &str, argc: usize, count: usize) -> EngineResult<Sample> {
    const CMD: &str = "sample";
    let line = line.trim();
    let points: Vec<&str> = if line.is_empty() {
        Vec::new()
    } else {
        line.split('|').collect()
    };
    if points.len() != count {
        return Err(EngineError::protocol(
            CMD,
            format!(
                "did not sample expected number of points: {} != {count}",
                points.len()
            ),
        ));
    }

    let mut columns = vec![Vec::with_capacity(count); argc];
    let mut ground_truth = Vec::with_capacity(count);
    for point in points {
        let parts: Vec<&str> = point.split(',').collect();
        if parts.len() != 2 {
            return Err(EngineError::protocol(CMD, format!("malformed point `{point}`")));
        }
        let values: Vec<&str> = parts[0].split_whitespace().collect();
        if values.len() != argc {
            return Err(EngineError::protocol(
                CMD,
                format!("point `{point}` has {} inputs, expected {argc}", values.len()),
            ));
        }
        for (column, value) in columns.iter_mut().zip(values) {
            column.push(numeral(CMD, value)?);
        }
        ground_truth.push(numeral(CMD, parts[1])?);
    }

    Ok(Sample::new(columns, ground_truth))
}

/// A single floating-point value on one line (`cost`).
pub fn parse_scalar(command: &'static str, line: &str) -> EngineResult<f64> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [field] => numeral(command, field),
        _ => Err(EngineError::protocol(
            command,
            format!("expected one number, found `{}`", line.trim()),
        )),
    }
}

/// Compiled source comes back on one line with escaped newlines.
pub fn parse_compiled(line: &str) -> String {
    line.replace("\\n", "\n").trim().to_string()
}

/// `None` when the engine reports that no desugaring exists.
pub fn parse_desugar(line: &str) -> EngineResult<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Err(EngineError::protocol("desugar", "empty response"));
    }
    if DESUGAR_FAILED.contains(&line) {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}

/// Exactly `expected` whitespace-separated errors, in variant order.
pub fn parse_errors(line: &str, expected: usize) -> EngineResult<Vec<f64>> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != expected {
        return Err(EngineError::protocol(
            "error",
            format!(
                "expected {expected} errors, found {} in `{}`",
                fields.len(),
                line.trim()
            ),
        ));
    }
    fields.into_iter().map(|f| numeral("error", f)).collect()
}

/// Triples of lines (expression, cost, error) up to the end of the stream.
pub fn parse_improved(output: &str) -> EngineResult<Vec<Improved>> {
    let mut lines: Vec<&str> = output.lines().map(str::trim).collect();
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    if lines.len() % 3 != 0 {
        return Err(EngineError::protocol(
            "improve",
            format!("{} lines do not form (expr, cost, error) triples", lines.len()),
        ));
    }

    lines
        .chunks(3)
        .map(|triple| {
            Ok(Improved {
                text: triple[0].to_string(),
                cost: numeral("improve", triple[1])?,
                err: numeral("improve", triple[2])?,
            })
        })
        .collect()
}

/// Non-empty lines of a `read` response, one expression each.
pub fn parse_read(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// `cost err` pairs separated by `|`.
pub fn parse_pareto(line: &str) -> EngineResult<Vec<(f64, f64)>> {
    line.trim()
        .split('|')
        .map(|datum| {
            let fields: Vec<&str> = datum.split_whitespace().collect();
            match fields.as_slice() {
                [cost, err] => Ok((numeral("pareto", cost)?, numeral("pareto", err)?)),
                _ => Err(EngineError::protocol(
                    "pareto",
                    format!("Pareto frontier malformed: `{datum}`"),
                )),
            }
        })
        .collect()
}
