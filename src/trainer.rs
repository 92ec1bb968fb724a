use tracing::info_span;

use crate::context::Context;
use crate::error::Result;
use crate::hmm::{Token, TrainingSet};

pub mod baum_welch;
pub mod convergence;
pub mod forward_backward;
pub mod init;
pub mod vq;

pub use convergence::{ConvergenceController, Termination, TrainingOutcome};

/// Trains one left-to-right model on `tokens` with the state and mixture
/// counts of the context configuration.
pub fn train(ctx: &mut Context, tokens: &[Token]) -> Result<TrainingOutcome> {
    let span = info_span!("train", tokens = tokens.len(), nstates = ctx.config.nstates, nmix = ctx.config.nmix);
    let _enter = span.enter();

    ctx.config.validate()?;
    let set = TrainingSet::new(tokens)?;
    let hmm = init::initialize(ctx, &set)?;
    let mut reestimator = baum_welch::Reestimator::new(&set, ctx.config.nstates, ctx.config.nmix)?;
    let controller = ConvergenceController::new(&ctx.config, &hmm);
    Ok(controller.run(ctx, &mut reestimator, &set, hmm))
}

#[cfg(test)]
pub(crate) mod testing {
    use ndarray::{Array2, Array3};

    use crate::hmm::{Hmm, Token};

    pub fn toy_hmm() -> Hmm {
        let a = ndarray::array![[0.6, 0.4], [0.7, 0.3], [0.5, 0.5]];
        let weights = ndarray::array![[0.3, 0.7], [0.5, 0.5], [0.9, 0.1]];
        let means = Array3::from_shape_fn((3, 2, 2), |(s, m, d)| 0.4 * s as f64 - 0.5 + 0.3 * m as f64 - 0.2 * d as f64);
        let variances = Array3::from_shape_fn((3, 2, 2), |(s, m, d)| 0.5 + 0.25 * (s + m + d) as f64);
        Hmm::from_parts(a, weights, means, variances).unwrap()
    }

    pub fn sine_token(len: usize, phase: f64) -> Token {
        let frames = Array2::from_shape_fn((len, 2), |(t, d)| {
            let t = t as f64;
            if d == 0 { (0.5 * t + phase).sin() } else { 0.8 * (0.3 * t + phase).cos() }
        });
        Token::new(frames).unwrap()
    }

    /// Four tokens drifting through three regimes in two dimensions.
    pub fn regime_tokens() -> Vec<Token> {
        let bases = [(0.0, 1.0), (3.0, -2.0), (-2.0, 4.0)];
        [18usize, 21, 24, 27]
            .iter()
            .enumerate()
            .map(|(k, &len)| {
                let k = k as f64;
                let frames = Array2::from_shape_fn((len, 2), |(t, d)| {
                    let (x, y) = bases[(3 * t / len).min(2)];
                    let t = t as f64;
                    if d == 0 {
                        x + 0.7 * (1.3 * t + 0.9 * k).sin() + 0.2 * (3.1 * t * k + 0.4).cos()
                    } else {
                        y + 0.5 * (0.7 * t + 1.7 * k).cos() + 0.3 * (2.3 * t + k).sin()
                    }
                });
                Token::new(frames).unwrap()
            })
            .collect()
    }
}
