use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

use crate::error::{Error, Result};
use crate::hmm::{Emission, Hmm, Token, TrainingSet, ADVANCE, STAY};
use crate::utils::{zeros1, zeros2};

/// Scaled forward recursion over one token. After the call every row of
/// `alpha` sums to one and `scale[t]` holds the multiplier applied at frame `t`.
pub fn forward(hmm: &Hmm, emission: ArrayView2<f64>, mut alpha: ArrayViewMut2<f64>, mut scale: ArrayViewMut1<f64>) {
    let nstates = hmm.nstates();
    let len = emission.nrows();

    alpha.row_mut(0).fill(0.0);
    alpha[[0, 0]] = emission[[0, 0]];
    for t in 0..len {
        if t > 0 {
            alpha[[t, 0]] = alpha[[t - 1, 0]] * hmm.a[[0, STAY]] * emission[[t, 0]];
            for state in 1..nstates {
                let advance = alpha[[t - 1, state - 1]] * hmm.a[[state - 1, ADVANCE]];
                let stay = alpha[[t - 1, state]] * hmm.a[[state, STAY]];
                alpha[[t, state]] = (advance + stay) * emission[[t, state]];
            }
        }
        let mut row = alpha.row_mut(t);
        scale[t] = 1.0 / row.sum();
        row *= scale[t];
    }
}

/// Backward recursion reusing the forward scale factors. The last frame is
/// anchored on the exit transition out of the final state.
pub fn backward(hmm: &Hmm, emission: ArrayView2<f64>, scale: ArrayView1<f64>, mut beta: ArrayViewMut2<f64>) {
    let nstates = hmm.nstates();
    let last = emission.nrows() - 1;

    beta.row_mut(last).fill(0.0);
    beta[[last, nstates - 1]] = scale[last] * hmm.exit_prob();
    for t in (0..last).rev() {
        for state in 0..nstates {
            let mut v = hmm.a[[state, STAY]] * emission[[t + 1, state]] * beta[[t + 1, state]];
            if state + 1 < nstates {
                v += hmm.a[[state, ADVANCE]] * emission[[t + 1, state + 1]] * beta[[t + 1, state + 1]];
            }
            beta[[t, state]] = v * scale[t];
        }
    }
}

/// Token log-likelihood recovered from the scale factors and the exit
/// transition out of the final state.
pub fn log_likelihood(hmm: &Hmm, alpha: ArrayView2<f64>, scale: ArrayView1<f64>) -> f64 {
    let last = alpha.nrows() - 1;
    let log_scale: f64 = scale.iter().map(|c| c.ln()).sum();
    -log_scale + alpha[[last, hmm.nstates() - 1]].ln() + hmm.exit_prob().ln()
}

/// Forward-backward lattices of a whole training set, stored with the same
/// row indexing as the set's feature arena.
#[derive(Debug, Clone)]
pub struct Lattice {
    pub alpha: Array2<f64>,
    pub beta: Array2<f64>,
    pub emission: Array2<f64>,
    pub scale: Array1<f64>,
}

impl Lattice {

    pub fn new(set: &TrainingSet, nstates: usize) -> Result<Self> {
        let frames = set.total_frames();
        Ok(Self {
            alpha: zeros2((frames, nstates), "alpha lattice")?,
            beta: zeros2((frames, nstates), "beta lattice")?,
            emission: zeros2((frames, nstates), "emission table")?,
            scale: zeros1(frames, "scale factors")?,
        })
    }

    /// Runs forward-backward on every token and returns their log-likelihoods.
    pub fn evaluate(&mut self, hmm: &Hmm, set: &TrainingSet) -> Vec<f64> {
        let mut lls = Vec::with_capacity(set.ntokens());
        for token in 0..set.ntokens() {
            let rows = set.rows(token);
            hmm.emission_table(set.token(token), self.emission.slice_mut(s![rows.clone(), ..]));
            let emission = self.emission.slice(s![rows.clone(), ..]);
            forward(hmm, emission, self.alpha.slice_mut(s![rows.clone(), ..]), self.scale.slice_mut(s![rows.clone()]));
            backward(hmm, emission, self.scale.slice(s![rows.clone()]), self.beta.slice_mut(s![rows.clone(), ..]));
            lls.push(log_likelihood(hmm, self.alpha.slice(s![rows.clone(), ..]), self.scale.slice(s![rows])));
        }
        lls
    }
}

/// Forward-backward quantities of a single token.
#[derive(Debug, Clone)]
pub struct Pass {
    pub alpha: Array2<f64>,
    pub beta: Array2<f64>,
    pub emission: Array2<f64>,
    pub scale: Array1<f64>,
    pub log_likelihood: f64,
}

pub fn analyze(hmm: &Hmm, token: &Token) -> Result<Pass> {
    hmm.check_layout()?;
    if token.dim() != hmm.dim() {
        return Err(Error::DimensionMismatch { expected: hmm.dim(), found: token.dim() });
    }
    if token.len() < hmm.nstates() {
        return Err(Error::TokenTooShort { frames: token.len(), states: hmm.nstates() });
    }
    let shape = (token.len(), hmm.nstates());
    let mut alpha = zeros2(shape, "alpha lattice")?;
    let mut beta = zeros2(shape, "beta lattice")?;
    let mut emission = zeros2(shape, "emission table")?;
    let mut scale = zeros1(token.len(), "scale factors")?;
    hmm.emission_table(token.frames(), emission.view_mut());
    forward(hmm, emission.view(), alpha.view_mut(), scale.view_mut());
    backward(hmm, emission.view(), scale.view(), beta.view_mut());
    let log_likelihood = log_likelihood(hmm, alpha.view(), scale.view());
    Ok(Pass { alpha, beta, emission, scale, log_likelihood })
}
