//! Cache-aware sampling of expression batches.

use crate::local::{derive_seed, sample_local};
use anyhow::{anyhow, Context, Result};
use fpbench_cache::SampleCache;
use fpbench_core::{Expr, Sample};
use fpbench_engine::Engine;
use rayon::prelude::*;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    /// Points per sample.
    pub num_inputs: usize,
    /// Worker-pool size for resolving cache misses.
    pub threads: usize,
    /// Route every miss to the local sampler.
    pub force_local: bool,
    pub seed: Option<u64>,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            num_inputs: 10_000,
            threads: 1,
            force_local: false,
            seed: None,
        }
    }
}

/// How one cache miss gets resolved, decided before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleTask<'a> {
    Local { argc: usize, seed: Option<u64> },
    Engine { text: &'a str, argc: usize },
}

impl<'a> SampleTask<'a> {
    pub fn for_expr(expr: &'a Expr, options: &SamplerOptions) -> Self {
        if expr.local_sampling || options.force_local {
            SampleTask::Local {
                argc: expr.argc,
                seed: options
                    .seed
                    .map(|seed| derive_seed(seed, expr.key.as_str())),
            }
        } else {
            SampleTask::Engine {
                text: &expr.text,
                argc: expr.argc,
            }
        }
    }

    pub fn run(&self, engine: &Engine, num_inputs: usize) -> Result<Sample> {
        match *self {
            SampleTask::Local { argc, seed } => Ok(sample_local(argc, num_inputs, seed)),
            SampleTask::Engine { text, argc } => Ok(engine.sample(text, argc, num_inputs)?),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// One sample per input expression, in input order.
    pub samples: Vec<Sample>,
    pub cached: usize,
    pub generated: usize,
}

pub struct Sampler<'a> {
    engine: &'a Engine,
    cache: &'a mut SampleCache,
    options: SamplerOptions,
}

impl<'a> Sampler<'a> {
    pub fn new(engine: &'a Engine, cache: &'a mut SampleCache, options: SamplerOptions) -> Self {
        Self {
            engine,
            cache,
            options,
        }
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }

    /// Returns one sample per expression, consulting the cache first and
    /// writing every freshly generated sample back to it.
    ///
    /// Cache writes happen here on the calling thread once the worker pool
    /// has joined; workers only produce samples.
    pub fn sample(&mut self, exprs: &[Expr]) -> Result<SampleBatch> {
        let n = self.options.num_inputs;
        let mut slots: Vec<Option<Sample>> = Vec::with_capacity(exprs.len());
        let mut misses = Vec::new();
        let mut cached = 0;

        for (index, expr) in exprs.iter().enumerate() {
            if expr.argc == 0 {
                slots.push(Some(Sample::empty()));
                continue;
            }
            match self.cache.get(&expr.key) {
                Some(entry) if entry.sample.fits(expr.argc, n) => {
                    slots.push(Some(entry.sample.clone()));
                    cached += 1;
                }
                Some(entry) => {
                    debug!(
                        key = %expr.key,
                        cached_points = entry.sample.len(),
                        requested = n,
                        "stale cache entry"
                    );
                    slots.push(None);
                    misses.push(index);
                }
                None => {
                    slots.push(None);
                    misses.push(index);
                }
            }
        }

        let tasks: Vec<SampleTask<'_>> = misses
            .iter()
            .map(|&index| SampleTask::for_expr(&exprs[index], &self.options))
            .collect();
        let results = self.run_tasks(&tasks)?;

        let mut first_error = None;
        let mut generated = 0;
        for (&index, result) in misses.iter().zip(results) {
            let expr = &exprs[index];
            match result {
                Ok(sample) => {
                    self.cache.put(&expr.key, &expr.text, sample.clone())?;
                    slots[index] = Some(sample);
                    generated += 1;
                }
                Err(error) => {
                    warn!(name = expr.display_name(), error = %error, "sampling failed");
                    if first_error.is_none() {
                        first_error =
                            Some(error.context(format!("failed to sample {}", expr.display_name())));
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        let samples = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or_else(|| anyhow!("no sample produced for input {index}")))
            .collect::<Result<Vec<_>>>()?;

        info!(
            sampled = generated,
            cached,
            threads = self.options.threads,
            "sampled {} cores ({} cached)",
            generated,
            cached
        );
        Ok(SampleBatch {
            samples,
            cached,
            generated,
        })
    }

    /// Runs tasks on a fixed-size pool. Results come back in task order.
    fn run_tasks(&self, tasks: &[SampleTask<'_>]) -> Result<Vec<Result<Sample>>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.max(1))
            .build()
            .context("failed to build sampling worker pool")?;

        let engine = self.engine;
        let n = self.options.num_inputs;
        Ok(pool.install(|| tasks.par_iter().map(|task| task.run(engine, n)).collect()))
    }
}
