//! Driver backends: emit, build and time one driver program per expression.

use crate::config::{units_per_ms, ConfigError, RunnerConfig};
use anyhow::{bail, ensure, Context, Result};
use fpbench_core::{Expr, Sample};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Lifecycle of the per-expression driver programs. Each method assumes the
/// previous one has run over the same directories.
pub trait DriverBackend: Send + Sync {
    fn lang(&self) -> &str;

    /// Writes buildable source for every compiled expression into its directory.
    fn make_drivers(&self, exprs: &[Expr], samples: &[Sample], dirs: &[PathBuf]) -> Result<()>;

    fn compile_drivers(&self, dirs: &[PathBuf]) -> Result<()>;

    /// One wall-clock duration per directory, in the configured time unit.
    fn run_drivers(&self, dirs: &[PathBuf]) -> Result<Vec<f64>>;
}

/// The backend for `config.lang`, if there is one.
pub fn backend_for(config: &RunnerConfig) -> Result<Option<Box<dyn DriverBackend>>, ConfigError> {
    let backend: Box<dyn DriverBackend> = match config.lang.as_str() {
        "c" => Box::new(CBackend::from_config(config)?),
        _ => return Ok(None),
    };
    Ok(Some(backend))
}

pub const C_DRIVER_SOURCE: &str = "main.c";
pub const C_DRIVER_BINARY: &str = "driver";
/// Name of the function the engine emits when compiling to C.
pub const C_DRIVER_FUNCTION: &str = "foo";

#[derive(Debug, Clone)]
pub struct CBackend {
    cc: String,
    num_inputs: usize,
    num_runs: usize,
    /// Drivers report milliseconds; timings are scaled by this on the way out.
    units_per_ms: f64,
}

impl CBackend {
    /// A backend reporting in milliseconds.
    pub fn new(cc: impl Into<String>, num_inputs: usize, num_runs: usize) -> Self {
        Self {
            cc: cc.into(),
            num_inputs,
            num_runs,
            units_per_ms: 1.0,
        }
    }

    pub fn with_time_unit(mut self, unit: &str) -> Result<Self, ConfigError> {
        self.units_per_ms =
            units_per_ms(unit).ok_or_else(|| ConfigError::UnknownTimeUnit(unit.to_string()))?;
        Ok(self)
    }

    pub fn from_config(config: &RunnerConfig) -> Result<Self, ConfigError> {
        Self::new(config.cc.clone(), config.num_inputs, config.num_runs)
            .with_time_unit(&config.time_unit)
    }

    /// Full C source for one driver.
    pub fn driver_source(&self, expr: &Expr, sample: &Sample) -> Result<String> {
        let compiled = expr
            .compiled
            .as_deref()
            .with_context(|| format!("{} has not been compiled", expr.display_name()))?;
        ensure!(
            sample.arity() == expr.argc,
            "sample for {} has {} variables, expected {}",
            expr.display_name(),
            sample.arity(),
            expr.argc
        );
        ensure!(
            expr.argc == 0 || sample.len() == self.num_inputs,
            "sample for {} has {} points, expected {}",
            expr.display_name(),
            sample.len(),
            self.num_inputs
        );

        let mut src = String::new();
        src.push_str("#include <math.h>\n#include <stdio.h>\n#include <time.h>\n\n");
        src.push_str(compiled);
        src.push_str("\n\n");
        writeln!(src, "#define N {}", self.num_inputs)?;
        for (i, column) in sample.points.iter().enumerate() {
            write!(src, "static const double x{i}[N] = {{")?;
            for (j, value) in column.iter().enumerate() {
                if j > 0 {
                    src.push_str(", ");
                }
                src.push_str(&c_literal(*value));
            }
            src.push_str("};\n");
        }

        let args = (0..expr.argc)
            .map(|i| format!("x{i}[i]"))
            .collect::<Vec<_>>()
            .join(", ");
        src.push_str("\nint main(void) {\n");
        src.push_str("  struct timespec start, end;\n");
        src.push_str("  volatile double res;\n");
        src.push_str("  clock_gettime(CLOCK_MONOTONIC, &start);\n");
        src.push_str("  for (long i = 0; i < N; i++) {\n");
        writeln!(src, "    res = {C_DRIVER_FUNCTION}({args});")?;
        src.push_str("  }\n");
        src.push_str("  clock_gettime(CLOCK_MONOTONIC, &end);\n");
        src.push_str("  (void) res;\n");
        src.push_str(
            "  printf(\"%.17g ms\\n\", (end.tv_sec - start.tv_sec) * 1e3 + (end.tv_nsec - start.tv_nsec) / 1e6);\n",
        );
        src.push_str("  return 0;\n}\n");
        Ok(src)
    }
}

impl DriverBackend for CBackend {
    fn lang(&self) -> &str {
        "c"
    }

    fn make_drivers(&self, exprs: &[Expr], samples: &[Sample], dirs: &[PathBuf]) -> Result<()> {
        ensure!(
            exprs.len() == samples.len() && exprs.len() == dirs.len(),
            "driver inputs disagree: {} expressions, {} samples, {} directories",
            exprs.len(),
            samples.len(),
            dirs.len()
        );
        for ((expr, sample), dir) in exprs.iter().zip(samples).zip(dirs) {
            let path = dir.join(C_DRIVER_SOURCE);
            fs::write(&path, self.driver_source(expr, sample)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        info!(count = dirs.len(), "created drivers");
        Ok(())
    }

    fn compile_drivers(&self, dirs: &[PathBuf]) -> Result<()> {
        for dir in dirs {
            let output = Command::new(&self.cc)
                .current_dir(dir)
                .args(["-O2", "-std=gnu11", "-o", C_DRIVER_BINARY, C_DRIVER_SOURCE, "-lm"])
                .output()
                .with_context(|| format!("failed to launch C compiler `{}`", self.cc))?;
            if !output.status.success() {
                bail!(
                    "`{}` failed in {} ({}): {}",
                    self.cc,
                    dir.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
        }
        info!(count = dirs.len(), "compiled drivers");
        Ok(())
    }

    fn run_drivers(&self, dirs: &[PathBuf]) -> Result<Vec<f64>> {
        let times = dirs
            .iter()
            .map(|dir| {
                run_driver(&dir.join(C_DRIVER_BINARY), self.num_runs)
                    .map(|ms| ms * self.units_per_ms)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(count = times.len(), runs = self.num_runs, "ran drivers");
        Ok(times)
    }
}

/// Runs a driver `runs` times and returns the total reported milliseconds.
fn run_driver(binary: &Path, runs: usize) -> Result<f64> {
    let mut total = 0.0;
    for _ in 0..runs {
        let output = Command::new(binary)
            .output()
            .with_context(|| format!("failed to run {}", binary.display()))?;
        ensure!(
            output.status.success(),
            "{} exited with {}",
            binary.display(),
            output.status
        );
        total += parse_time(&String::from_utf8_lossy(&output.stdout))
            .with_context(|| format!("bad timing output from {}", binary.display()))?;
    }
    debug!(driver = %binary.display(), total, "driver finished");
    Ok(total)
}

/// Reads the leading number of a driver's output.
pub fn parse_time(output: &str) -> Result<f64> {
    let token = output
        .split_whitespace()
        .next()
        .context("driver printed nothing")?;
    token
        .parse::<f64>()
        .with_context(|| format!("`{token}` is not a time"))
}

fn c_literal(value: f64) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value == f64::INFINITY {
        "INFINITY".to_string()
    } else if value == f64::NEG_INFINITY {
        "-INFINITY".to_string()
    } else {
        format!("{value:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpbench_core::{baseline, synthesize_binary};

    fn compiled(mut expr: Expr, body: &str) -> Expr {
        expr.compiled = Some(body.to_string());
        expr
    }

    #[test]
    fn binary_driver_embeds_inputs() {
        let backend = CBackend::new("cc", 3, 1);
        let expr = compiled(
            synthesize_binary("pow"),
            "double foo(double x0, double x1) { return pow(x0, x1); }",
        );
        let sample = Sample::new(
            vec![vec![0.5, -0.0, f64::INFINITY], vec![1e-300, f64::NEG_INFINITY, 2.0]],
            vec![0.0; 3],
        );
        let src = backend.driver_source(&expr, &sample).unwrap();
        assert!(src.contains("return pow(x0, x1);"));
        assert!(src.contains("#define N 3"));
        assert!(src.contains("static const double x0[N] = {0.5, -0.0, INFINITY};"));
        assert!(src.contains("static const double x1[N] = {1e-300, -INFINITY, 2.0};"));
        assert!(src.contains("res = foo(x0[i], x1[i]);"));
    }

    #[test]
    fn baseline_driver_has_no_inputs() {
        let backend = CBackend::new("cc", 8, 1);
        let expr = compiled(baseline(), "double foo() { return 0.0; }");
        let src = backend.driver_source(&expr, &Sample::empty()).unwrap();
        assert!(src.contains("res = foo();"));
        assert!(!src.contains("static const double"));
    }

    #[test]
    fn uncompiled_or_mismatched_inputs_are_rejected() {
        let backend = CBackend::new("cc", 2, 1);
        let sample = Sample::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0.0; 2]);
        assert!(backend
            .driver_source(&synthesize_binary("pow"), &sample)
            .is_err());

        let expr = compiled(synthesize_binary("pow"), "double foo(double a, double b);");
        let short = Sample::new(vec![vec![1.0], vec![3.0]], vec![0.0]);
        assert!(backend.driver_source(&expr, &short).is_err());
    }

    #[test]
    fn parses_leading_time() {
        assert_eq!(parse_time("0.25 ms\n").unwrap(), 0.25);
        assert!(parse_time("").is_err());
        assert!(parse_time("fast").is_err());
    }

    #[test]
    fn only_c_has_a_backend() {
        let mut config = RunnerConfig::default();
        assert_eq!(
            backend_for(&config).unwrap().map(|b| b.lang().to_string()),
            Some("c".to_string())
        );
        config.time_unit = "minutes".to_string();
        assert!(backend_for(&config).is_err());
        config.lang = "python".to_string();
        config.time_unit = "ms".to_string();
        assert!(backend_for(&config).unwrap().is_none());
    }

    #[cfg(unix)]
    fn fixed_time_driver(root: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let driver_dir = root.join("0");
        fs::create_dir_all(&driver_dir).unwrap();
        let binary = driver_dir.join(C_DRIVER_BINARY);
        fs::write(&binary, "#!/bin/sh\necho '1.5 ms'\n").unwrap();
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)).unwrap();
        driver_dir
    }

    #[cfg(unix)]
    #[test]
    fn runs_and_sums_driver_times() {
        let dir = tempfile::tempdir().unwrap();
        let driver_dir = fixed_time_driver(dir.path());

        let backend = CBackend::new("cc", 1, 4);
        let times = backend.run_drivers(&[driver_dir]).unwrap();
        assert_eq!(times, vec![6.0]);
    }

    #[cfg(unix)]
    #[test]
    fn driver_times_follow_configured_unit() {
        let dir = tempfile::tempdir().unwrap();
        let driver_dir = fixed_time_driver(dir.path());

        let config = RunnerConfig {
            time_unit: "us".to_string(),
            num_runs: 1,
            ..RunnerConfig::default()
        };
        let backend = CBackend::from_config(&config).unwrap();
        assert_eq!(backend.run_drivers(&[driver_dir.clone()]).unwrap(), vec![1500.0]);

        let backend = CBackend::new("cc", 1, 2).with_time_unit("ns").unwrap();
        assert_eq!(backend.run_drivers(&[driver_dir]).unwrap(), vec![3_000_000.0]);
    }

    #[cfg(unix)]
    #[test]
    fn compiler_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().to_path_buf()];
        assert!(CBackend::new("true", 1, 1).compile_drivers(&dirs).is_ok());
        assert!(CBackend::new("false", 1, 1).compile_drivers(&dirs).is_err());
    }
}
