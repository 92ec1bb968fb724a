use tracing::{info, warn};

use crate::context::Context;
use crate::hmm::{Hmm, TrainingSet};
use crate::utils::Config;

use super::baum_welch::Reestimator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// The improvement fell below the threshold after `iterations` iterations.
    Converged { iterations: usize },
    /// The log-likelihood of `iteration` was not finite; the parameters
    /// evaluated at `restored_iteration` were restored.
    Diverged { iteration: usize, restored_iteration: usize },
    IterationLimit { iterations: usize },
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub hmm: Hmm,
    /// Pooled average log-likelihood evaluated by each iteration.
    pub log_likelihoods: Vec<f64>,
    pub termination: Termination,
    pub token_log_likelihoods: Vec<f64>,
}

enum Verdict {
    Continue,
    Stop(Termination),
}

/// Drives EM iterations, stops on convergence and rolls back to the most
/// stable parameters seen so far when the likelihood diverges.
#[derive(Debug, Clone)]
pub struct ConvergenceController {
    max_iterations: usize,
    threshold: f64,
    previous: Option<f64>,
    smallest_improvement: f64,
    /// Parameters evaluated (before the M-step) at `best_iteration`.
    best: Hmm,
    best_iteration: usize,
}

impl ConvergenceController {

    pub fn new(config: &Config, initial: &Hmm) -> Self {
        Self {
            max_iterations: config.max_iterations,
            threshold: config.convergence_threshold,
            previous: None,
            smallest_improvement: f64::INFINITY,
            best: initial.clone(),
            best_iteration: 0,
        }
    }

    pub fn run(mut self, ctx: &mut Context, reestimator: &mut Reestimator, set: &TrainingSet, mut hmm: Hmm) -> TrainingOutcome {
        let first_record = ctx.log().len();
        let mut termination = Termination::IterationLimit { iterations: self.max_iterations };
        for iteration in 0..self.max_iterations {
            let evaluated = hmm.clone();
            let ll = reestimator.step(ctx, &mut hmm, set);
            ctx.record(iteration, ll);
            match self.observe(iteration, ll, evaluated, &hmm) {
                Verdict::Continue => (),
                Verdict::Stop(t) => {
                    termination = t;
                    break;
                }
            }
        }
        info!(?termination, "reestimation finished");

        TrainingOutcome {
            hmm: self.settle(&termination, hmm),
            log_likelihoods: ctx.log().log_likelihoods_since(first_record),
            termination,
            token_log_likelihoods: reestimator.token_log_likelihoods().to_vec(),
        }
    }

    /// Final parameters of a run: the stable snapshot after a divergence,
    /// the latest update otherwise.
    fn settle(self, termination: &Termination, hmm: Hmm) -> Hmm {
        match termination {
            Termination::Diverged { .. } => self.best,
            _ => hmm,
        }
    }

    fn observe(&mut self, iteration: usize, ll: f64, evaluated: Hmm, updated: &Hmm) -> Verdict {
        if !ll.is_finite() || !updated.is_finite() {
            warn!(iteration, log_likelihood = ll, restored_iteration = self.best_iteration, "numeric divergence, restoring stable parameters");
            return Verdict::Stop(Termination::Diverged { iteration, restored_iteration: self.best_iteration });
        }
        if let Some(previous) = self.previous {
            let improvement = ll - previous;
            if improvement.abs() < self.smallest_improvement {
                self.smallest_improvement = improvement.abs();
                self.best = evaluated;
                self.best_iteration = iteration;
            }
            if improvement < self.threshold {
                return Verdict::Stop(Termination::Converged { iterations: iteration + 1 });
            }
        }
        self.previous = Some(ll);
        Verdict::Continue
    }
}
