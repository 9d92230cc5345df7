//! CLI wiring for the fpbench harness.

use crate::config::RunnerConfig;
use crate::report::{cost_time_pairs, render_times, times_table, BenchmarkReport};
use crate::runner::Runner;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fpbench", about = "Floating-point rewriting benchmark harness")]
pub struct Cli {
    /// JSON runner configuration; defaults apply to missing fields.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Platform name, overriding the configured one.
    #[arg(long)]
    pub platform: Option<String>,

    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long)]
    pub num_inputs: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub force_local_sampling: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synthesize operator cores, then sample, compile, cost and time them.
    Synth {
        /// Stop after costing; no drivers are built or run.
        #[arg(long, default_value_t = false)]
        skip_drivers: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Improve a benchmark suite and evaluate the results on this platform.
    Improve {
        /// Benchmark file handed to the engine's `read` command.
        path: PathBuf,
        /// Platform to run the improvement on.
        #[arg(long)]
        improve_platform: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Synthesize operator cores and sample them, reporting cache use.
    Sample,
}

impl Cli {
    /// The file configuration (or defaults) with command-line overrides applied.
    pub fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::default(),
        };
        if let Some(platform) = &self.platform {
            config.name = platform.clone();
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(num_inputs) = self.num_inputs {
            config.num_inputs = num_inputs;
        }
        if self.force_local_sampling {
            config.force_local_sampling = true;
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = cli.runner_config()?;
    let mut runner = Runner::new(config)?;

    match cli.command {
        Command::Synth {
            skip_drivers,
            output,
        } => {
            let mut exprs = runner.synthesize();
            let batch = runner.sample(&exprs)?;
            runner.compile(&mut exprs)?;
            runner.cost(&mut exprs)?;

            let times = if skip_drivers {
                None
            } else {
                let dirs = runner.make_driver_dirs(exprs.len())?;
                runner.make_drivers(&exprs, &batch.samples, &dirs)?;
                runner.compile_drivers(&dirs)?;
                Some(runner.run_drivers(&dirs)?)
            };

            if let Some(times) = &times {
                let table = times_table(&exprs, times);
                print!("{}", render_times(&table, &runner.config().time_unit));
                for (cost, time) in cost_time_pairs(&exprs, times) {
                    println!("cost={cost} time={time}");
                }
            }

            let report = BenchmarkReport::new(runner.config(), &exprs, times.as_deref());
            let path = output.unwrap_or_else(|| runner.working_dir().join("synth.json"));
            report.save(&path)?;
            info!(path = %path.display(), "wrote report");
        }
        Command::Improve {
            path,
            improve_platform,
            output,
        } => {
            let threads = runner.config().threads;
            let inputs = runner.read(&path)?;
            let improved = runner.improve(&inputs, threads, improve_platform.as_deref())?;
            let mut exprs = runner.desugar(&inputs, &improved)?;
            runner.cost(&mut exprs)?;
            runner.error(&inputs, &mut exprs)?;
            let frontier = runner.pareto(&inputs, &exprs)?;

            for (cost, err) in &frontier {
                println!("cost={cost} err={err}");
            }

            let report = BenchmarkReport::new(runner.config(), &exprs, None).with_frontier(frontier);
            let path = output.unwrap_or_else(|| runner.working_dir().join("improve.json"));
            report.save(&path)?;
            info!(path = %path.display(), "wrote report");
        }
        Command::Sample => {
            let exprs = runner.synthesize();
            let batch = runner.sample(&exprs)?;
            println!(
                "cores={}, cached={}, generated={}, cache_entries={}",
                exprs.len(),
                batch.cached,
                batch.generated,
                runner.cache().len()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "fpbench",
            "--platform",
            "avx",
            "--threads",
            "4",
            "--force-local-sampling",
            "improve",
            "bench/hamming.fpcore",
            "--improve-platform",
            "c",
        ]);
        let config = cli.runner_config().unwrap();
        assert_eq!(config.name, "avx");
        assert_eq!(config.threads, 4);
        assert!(config.force_local_sampling);
        match cli.command {
            Command::Improve {
                path,
                improve_platform,
                ..
            } => {
                assert_eq!(path, PathBuf::from("bench/hamming.fpcore"));
                assert_eq!(improve_platform.as_deref(), Some("c"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn zero_threads_rejected() {
        let cli = Cli::parse_from(["fpbench", "--threads", "0", "sample"]);
        assert!(cli.runner_config().is_err());
    }
}
