//! Pipeline orchestration over one platform.
//!
//! Every stage is synchronous and runs to completion before the next one
//! starts. Engine-backed stages open exactly one engine session each; only
//! sampling fans out to a worker pool.

use crate::backend::{backend_for, DriverBackend};
use crate::config::RunnerConfig;
use crate::groups::{require_name, VariantGroups};
use anyhow::{anyhow, Context, Result};
use fpbench_cache::SampleCache;
use fpbench_core::{baseline, parse_core, synthesize, Expr, Sample};
use fpbench_engine::{Engine, ErrorQuery};
use fpbench_sampler::{SampleBatch, Sampler};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Runner {
    config: RunnerConfig,
    engine: Engine,
    cache: SampleCache,
    backend: Option<Box<dyn DriverBackend>>,
}

impl Runner {
    /// Validates `config`, restores the sample cache and creates the working
    /// directory. The driver backend is picked from `config.lang`.
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let backend = backend_for(&config)?;
        Self::with_backend(config, backend)
    }

    pub fn with_backend(
        config: RunnerConfig,
        backend: Option<Box<dyn DriverBackend>>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = SampleCache::open(&config.working_dir);
        info!(platform = %config.name, "restored {} cores from cache", cache.len());

        fs::create_dir_all(&config.working_dir).with_context(|| {
            format!(
                "failed to create working directory {}",
                config.working_dir.display()
            )
        })?;
        info!(dir = %config.working_dir.display(), "prepared working directory");

        Ok(Self {
            engine: config.engine(),
            config,
            cache,
            backend,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn cache(&self) -> &SampleCache {
        &self.cache
    }

    pub fn working_dir(&self) -> &Path {
        &self.config.working_dir
    }

    /// The baseline followed by every configured operator, in configuration order.
    pub fn synthesize(&self) -> Vec<Expr> {
        let config = &self.config;
        let mut exprs = vec![baseline()];
        exprs.extend(config.unary_ops.iter().map(|op| synthesize(op, 1)));
        exprs.extend(config.binary_ops.iter().map(|op| synthesize(op, 2)));
        exprs.extend(config.ternary_ops.iter().map(|op| synthesize(op, 3)));
        exprs.extend(config.nary_ops.iter().map(|(argc, op)| synthesize(op, *argc)));
        info!(count = exprs.len(), "synthesized cores");
        exprs
    }

    /// Every expression in the benchmark file at `path`.
    pub fn read(&self, path: &Path) -> Result<Vec<Expr>> {
        let texts = self
            .engine
            .read(path)
            .with_context(|| format!("failed to read benchmarks from {}", path.display()))?;
        let exprs = texts
            .iter()
            .map(|text| parse_core(text).with_context(|| format!("unparsable core `{text}`")))
            .collect::<Result<Vec<_>>>()?;
        info!(path = %path.display(), "read {} cores", exprs.len());
        Ok(exprs)
    }

    /// Fills `compiled` for every expression.
    pub fn compile(&self, exprs: &mut [Expr]) -> Result<()> {
        let sources = texts(exprs);
        let compiled = self
            .engine
            .compile(&self.config.lang, &sources)
            .context("compile stage failed")?;
        for (expr, source) in exprs.iter_mut().zip(compiled) {
            expr.compiled = Some(source);
        }
        info!("compiled {} cores", exprs.len());
        Ok(())
    }

    /// Overwrites `cost` for every expression.
    pub fn cost(&self, exprs: &mut [Expr]) -> Result<()> {
        let sources = texts(exprs);
        let costs = self.engine.cost(&sources).context("cost stage failed")?;
        for (expr, cost) in exprs.iter_mut().zip(costs) {
            expr.cost = Some(cost);
        }
        info!("recomputed cost of {} cores", exprs.len());
        Ok(())
    }

    /// Translates `exprs` into this platform. Variants without a valid
    /// desugaring are dropped, and any input left with no variant at all is
    /// restored verbatim so that every input keeps a representative.
    pub fn desugar(&self, inputs: &[Expr], exprs: &[Expr]) -> Result<Vec<Expr>> {
        let sources = texts(exprs);
        let outputs = self.engine.desugar(&sources).context("desugar stage failed")?;

        let mut desugared = Vec::with_capacity(exprs.len());
        for (expr, output) in exprs.iter().zip(outputs) {
            match output {
                Some(text) => {
                    let core = parse_core(&text)
                        .with_context(|| format!("unparsable desugared core `{text}`"))?;
                    desugared.push(core.with_descr(expr.descr.clone()));
                }
                None => warn!(name = expr.display_name(), "failed to desugar"),
            }
        }

        let groups = VariantGroups::build(&desugared)?;
        for input in inputs {
            let name = require_name(input)?;
            if !groups.contains(name) {
                warn!(name, "no desugared variant, restoring input");
                desugared.push(input.clone());
            }
        }
        info!("desugared {} cores", desugared.len());
        Ok(desugared)
    }

    /// Sets `err` on every variant, measured against the input it derives from.
    pub fn error(&self, inputs: &[Expr], exprs: &mut [Expr]) -> Result<()> {
        let groups = VariantGroups::build(exprs)?;
        let mut members = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = require_name(input)?;
            let group = groups.members(name);
            if group.is_empty() {
                warn!(name, "no variants to measure");
            } else {
                members.push((input, group));
            }
        }

        let queries: Vec<ErrorQuery<'_>> = members
            .iter()
            .map(|(input, group)| ErrorQuery {
                input: &input.text,
                variants: group.iter().map(|&i| exprs[i].text.as_str()).collect(),
            })
            .collect();
        let errors = self.engine.error(&queries).context("error stage failed")?;

        let mut updated = 0;
        for ((_, group), errs) in members.iter().zip(errors) {
            for (&index, err) in group.iter().zip(errs) {
                exprs[index].err = Some(err);
                updated += 1;
            }
        }
        info!("recomputed errors of {updated} cores");
        Ok(())
    }

    /// Improves `exprs` with `threads` engine workers, on `platform` when given
    /// and on this runner's platform otherwise.
    pub fn improve(
        &self,
        exprs: &[Expr],
        threads: usize,
        platform: Option<&str>,
    ) -> Result<Vec<Expr>> {
        let sources = texts(exprs);
        let improved = self
            .engine
            .improve(&sources, threads, platform)
            .context("improve stage failed")?;
        let cores = improved
            .into_iter()
            .map(|result| -> Result<Expr> {
                let mut core = parse_core(&result.text)
                    .with_context(|| format!("unparsable improved core `{}`", result.text))?;
                core.cost = Some(result.cost);
                core.err = Some(result.err);
                Ok(core)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            platform = platform.unwrap_or(&self.config.name),
            "generated {} cores with the engine",
            cores.len()
        );
        Ok(cores)
    }

    /// Combines each input's raw `(cost, err)` frontier into one frontier.
    pub fn pareto(&self, inputs: &[Expr], exprs: &[Expr]) -> Result<Vec<(f64, f64)>> {
        let groups = VariantGroups::build(exprs)?;
        let mut frontiers = Vec::with_capacity(inputs.len());
        for input in inputs {
            let name = require_name(input)?;
            let group = groups.members(name);
            if group.is_empty() {
                warn!(name, "no variants for frontier");
                continue;
            }
            let frontier = group
                .iter()
                .map(|&i| {
                    let expr = &exprs[i];
                    match (expr.cost, expr.err) {
                        (Some(cost), Some(err)) => Ok((cost, err)),
                        _ => Err(anyhow!("{} is missing cost or error", expr.display_name())),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            frontiers.push(frontier);
        }

        let frontier = self
            .engine
            .pareto(&frontiers)
            .context("pareto stage failed")?;
        info!(points = frontier.len(), "computed Pareto frontier");
        Ok(frontier)
    }

    /// One sample per expression, in input order, via the cache.
    pub fn sample(&mut self, exprs: &[Expr]) -> Result<SampleBatch> {
        let options = self.config.sampler_options();
        Sampler::new(&self.engine, &mut self.cache, options).sample(exprs)
    }

    /// Recreates an empty `<working dir>/<i>` for each of `count` drivers.
    pub fn make_driver_dirs(&self, count: usize) -> Result<Vec<PathBuf>> {
        let dirs = (0..count)
            .map(|i| -> Result<PathBuf> {
                let dir = self.config.working_dir.join(i.to_string());
                if dir.exists() {
                    fs::remove_dir_all(&dir)
                        .with_context(|| format!("failed to clear {}", dir.display()))?;
                }
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                Ok(dir)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(count, "prepared driver subdirectories");
        Ok(dirs)
    }

    fn backend(&self) -> Result<&dyn DriverBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| anyhow!("no driver backend for language `{}`", self.config.lang))
    }

    pub fn make_drivers(&self, exprs: &[Expr], samples: &[Sample], dirs: &[PathBuf]) -> Result<()> {
        self.backend()?.make_drivers(exprs, samples, dirs)
    }

    pub fn compile_drivers(&self, dirs: &[PathBuf]) -> Result<()> {
        self.backend()?.compile_drivers(dirs)
    }

    pub fn run_drivers(&self, dirs: &[PathBuf]) -> Result<Vec<f64>> {
        self.backend()?.run_drivers(dirs)
    }
}

fn texts(exprs: &[Expr]) -> Vec<&str> {
    exprs.iter().map(|expr| expr.text.as_str()).collect()
}
