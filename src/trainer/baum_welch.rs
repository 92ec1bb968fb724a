use ndarray::{s, Array1, Array2, Array3, Axis};
use tracing::warn;

use crate::context::Context;
use crate::error::Result;
use crate::hmm::{floor_and_normalize, Hmm, TrainingSet, ADVANCE, PROBABILITY_FLOOR, STAY};
use crate::utils::{zeros2, zeros3};

use super::forward_backward::Lattice;

/// Occupancy statistics of one E-step, indexed like the feature arena:
/// `gamma[f][s]`, `xi[f][s][k]` with `k` in {stay, advance}, `zeta[f][s][m]`.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub gamma: Array2<f64>,
    pub xi: Array3<f64>,
    pub zeta: Array3<f64>,
}

impl Statistics {

    pub fn new(frames: usize, nstates: usize, nmix: usize) -> Result<Self> {
        Ok(Self {
            gamma: zeros2((frames, nstates), "state occupancy")?,
            xi: zeros3((frames, nstates, 2), "transition occupancy")?,
            zeta: zeros3((frames, nstates, nmix), "component occupancy")?,
        })
    }
}

/// Batch Baum-Welch over a fixed training set. All buffers are sized once
/// from the set and reused by every iteration.
#[derive(Debug, Clone)]
pub struct Reestimator {
    lattice: Lattice,
    stats: Statistics,
    token_lls: Vec<f64>,
}

impl Reestimator {

    pub fn new(set: &TrainingSet, nstates: usize, nmix: usize) -> Result<Self> {
        Ok(Self {
            lattice: Lattice::new(set, nstates)?,
            stats: Statistics::new(set.total_frames(), nstates, nmix)?,
            token_lls: Vec::new(),
        })
    }

    /// One EM iteration. Returns the average token log-likelihood under the
    /// parameters `hmm` held before the update.
    pub fn step(&mut self, ctx: &Context, hmm: &mut Hmm, set: &TrainingSet) -> f64 {
        self.token_lls = self.lattice.evaluate(hmm, set);
        self.expectation(hmm, set);
        self.maximization(ctx, hmm, set);
        self.token_lls.iter().sum::<f64>() / self.token_lls.len() as f64
    }

    pub fn expectation(&mut self, hmm: &Hmm, set: &TrainingSet) {
        let nstates = hmm.nstates();
        let nmix = hmm.nmix();
        let exit = hmm.exit_prob();
        let features = set.features();
        let lattice = &self.lattice;
        let stats = &mut self.stats;

        for token in 0..set.ntokens() {
            let rows = set.rows(token);
            let first = rows.start;
            let len = rows.len();
            let last = rows.end - 1;
            let norm = lattice.alpha[[last, nstates - 1]] * exit;

            for f in first..last {
                for state in 0..nstates {
                    stats.gamma[[f, state]] =
                        lattice.alpha[[f, state]] * lattice.beta[[f, state]] / (lattice.scale[f] * norm);
                }
            }
            stats.gamma.row_mut(last).fill(0.0);
            stats.gamma[[last, nstates - 1]] = 1.0;

            stats.xi.slice_mut(s![rows.clone(), .., ..]).fill(0.0);
            for f in first..first + len.saturating_sub(2) {
                for i in 0..nstates {
                    for k in [STAY, ADVANCE].iter().copied() {
                        let j = i + k;
                        if j < nstates {
                            stats.xi[[f, i, k]] = lattice.alpha[[f, i]]
                                * hmm.a[[i, k]]
                                * lattice.emission[[f + 1, j]]
                                * lattice.beta[[f + 1, j]]
                                / norm;
                        }
                    }
                }
            }
            // forced exit: the frame before last must reach the final state,
            // the last frame leaves the model
            if len >= 2 {
                let f = last - 1;
                if nstates >= 2 {
                    stats.xi[[f, nstates - 2, ADVANCE]] = stats.gamma[[f, nstates - 2]];
                }
                stats.xi[[f, nstates - 1, STAY]] = stats.gamma[[f, nstates - 1]];
            }
            stats.xi[[last, nstates - 1, ADVANCE]] = 1.0;

            for f in rows {
                let frame = features.row(f);
                for state in 0..nstates {
                    let share = stats.gamma[[f, state]] / lattice.emission[[f, state]];
                    for mix in 0..nmix {
                        stats.zeta[[f, state, mix]] =
                            share * hmm.weights[[state, mix]] * hmm.component_density(state, mix, frame);
                    }
                }
            }
        }
    }

    /// Pooled M-step over every frame of every token.
    pub fn maximization(&self, ctx: &Context, hmm: &mut Hmm, set: &TrainingSet) {
        let floor = ctx.config.variance_floor;
        let features = set.features();
        let occupancy = self.stats.gamma.sum_axis(Axis(0));
        let transitions = self.stats.xi.sum_axis(Axis(0));
        let components = self.stats.zeta.sum_axis(Axis(0));

        for state in 0..hmm.nstates() {
            let occ = occupancy[state];
            if !(occ > 0.0) {
                warn!(state, occupancy = occ, "state is never occupied, keeping its parameters");
                continue;
            }
            let mut a = hmm.a.row_mut(state);
            a.assign(&transitions.row(state));
            a /= occ;
            floor_and_normalize(a, PROBABILITY_FLOOR);

            let mut weights = hmm.weights.row_mut(state);
            weights.assign(&components.row(state));
            weights /= occ;
            floor_and_normalize(weights, PROBABILITY_FLOOR);

            for mix in 0..hmm.nmix() {
                let zocc = components[[state, mix]];
                if !(zocc > 0.0) {
                    warn!(state, mix, "component is never occupied, keeping its mean and variance");
                    continue;
                }
                let zeta = self.stats.zeta.slice(s![.., state, mix]);
                let mean = zeta.dot(&features) / zocc;
                let mut variance = Array1::<f64>::zeros(mean.len());
                for (frame, &z) in features.outer_iter().zip(zeta.iter()) {
                    let diff = &frame - &mean;
                    variance.scaled_add(z, &(&diff * &diff));
                }
                variance /= zocc;
                variance.mapv_inplace(|v| if v < floor { floor } else { v });
                hmm.means.slice_mut(s![state, mix, ..]).assign(&mean);
                hmm.variances.slice_mut(s![state, mix, ..]).assign(&variance);
            }
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Per-token log-likelihoods of the last evaluated iteration.
    pub fn token_log_likelihoods(&self) -> &[f64] {
        &self.token_lls
    }
}
