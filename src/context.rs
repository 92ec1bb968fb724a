use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::Result;
use crate::utils::Config;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub log_likelihood: f64,
}

/// Per-iteration pooled log-likelihood of a training run.
#[derive(Debug, Clone, Default)]
pub struct TrainingLog {
    records: Vec<IterationRecord>,
}

impl TrainingLog {

    pub fn push(&mut self, iteration: usize, log_likelihood: f64) {
        self.records.push(IterationRecord { iteration, log_likelihood });
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    /// Log-likelihoods recorded from position `first` onwards.
    pub fn log_likelihoods_since(&self, first: usize) -> Vec<f64> {
        self.records.iter().skip(first).map(|r| r.log_likelihood).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Run configuration, the training log sink and the seeded generator used
/// for LBG splits. Threaded through initialization and every EM iteration.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    log: TrainingLog,
    rng: StdRng,
}

impl Context {

    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, log: TrainingLog::default(), rng })
    }

    pub fn record(&mut self, iteration: usize, log_likelihood: f64) {
        info!(iteration, log_likelihood, "reestimation");
        self.log.push(iteration, log_likelihood);
    }

    pub fn log(&self) -> &TrainingLog {
        &self.log
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
