use ndarray::{s, Array1, Array2, Axis};
use tracing::debug;

use std::ops::Range;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::hmm::{floor_and_normalize, FrameRef, Hmm, TrainingSet, PROBABILITY_FLOOR};
use crate::utils::zeros2;

use super::vq::lbg;

/// Frames of one state's segment gathered from every token, with their origin.
#[derive(Debug, Clone)]
pub struct PooledFrames {
    pub frames: Array2<f64>,
    pub origins: Vec<FrameRef>,
}

/// Splits `len` frames into `nstates` contiguous segments whose lengths
/// differ by at most one, longer segments first.
pub fn segment_bounds(len: usize, nstates: usize) -> Vec<Range<usize>> {
    let quot = len / nstates;
    let rem = len % nstates;
    let mut bounds = Vec::with_capacity(nstates);
    let mut start = 0;
    for state in 0..nstates {
        let size = if state < rem { quot + 1 } else { quot };
        bounds.push(start..start + size);
        start += size;
    }
    bounds
}

pub fn pool_segment(set: &TrainingSet, state: usize, nstates: usize) -> Result<PooledFrames> {
    let mut origins = Vec::new();
    for token in 0..set.ntokens() {
        for frame in segment_bounds(set.token_len(token), nstates)[state].clone() {
            origins.push(FrameRef { token, frame });
        }
    }
    let mut frames = zeros2((origins.len(), set.dim()), "pooled segment")?;
    for (mut row, at) in frames.outer_iter_mut().zip(origins.iter()) {
        row.assign(&set.frame(*at));
    }
    Ok(PooledFrames { frames, origins })
}

/// Initial model: every token is cut into equal segments, one per state, and
/// each state's pooled frames are clustered into its mixture components.
pub fn initialize(ctx: &mut Context, set: &TrainingSet) -> Result<Hmm> {
    let nstates = ctx.config.nstates;
    let nmix = ctx.config.nmix;
    let floor = ctx.config.variance_floor;
    let dim = set.dim();
    let shortest = set.min_token_len();
    if shortest < nstates {
        return Err(Error::TokenTooShort { frames: shortest, states: nstates });
    }

    let global = set.features().var_axis(Axis(0), 0.0);
    let mut hmm = Hmm::new(nstates, nmix, dim);
    for state in 0..nstates {
        let pooled = pool_segment(set, state, nstates)?;
        let codebook = lbg(ctx, pooled.frames.view(), nmix)?;
        let total = pooled.frames.nrows() as f64;
        for mix in 0..nmix {
            let centroid = codebook.centroids.row(mix);
            let mut spread = Array1::<f64>::zeros(dim);
            let mut count = 0;
            for i in codebook.members(mix) {
                let diff = &pooled.frames.row(i) - &centroid;
                spread += &(&diff * &diff);
                count += 1;
            }
            if count > 0 {
                spread /= count as f64;
            }
            for d in 0..dim {
                hmm.variances[[state, mix, d]] = if spread[d] >= floor {
                    spread[d]
                } else if global[d] >= floor {
                    global[d]
                } else {
                    floor
                };
            }
            hmm.means.slice_mut(s![state, mix, ..]).assign(&centroid);
            hmm.weights[[state, mix]] = count as f64 / total;
        }
        floor_and_normalize(hmm.weights.row_mut(state), PROBABILITY_FLOOR);
        debug!(state, frames = pooled.frames.nrows(), distortion = codebook.distortion, "initialized state");
    }
    Ok(hmm)
}
