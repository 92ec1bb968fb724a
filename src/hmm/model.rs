use ndarray::{s, Array2, Array3, ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use std::convert::TryFrom;

use crate::error::{Error, Result};

/// Column of `Hmm::a` holding the self-loop probability.
pub const STAY: usize = 0;
/// Column of `Hmm::a` holding the probability of moving to the next state
/// (leaving the model when taken from the last state).
pub const ADVANCE: usize = 1;

/// Lower bound applied to transition probabilities and mixture weights.
pub const PROBABILITY_FLOOR: f64 = 1.0e-30;

/// Left-to-right HMM with diagonal Gaussian mixture emissions.
///
/// Parameters are stored in flat arrays indexed by state first:
/// `a` is `N x 2` (stay, advance), `weights` is `N x M`, `means` and
/// `variances` are `N x M x D`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHmm")]
pub struct Hmm {
    pub a: Array2<f64>,
    pub weights: Array2<f64>,
    pub means: Array3<f64>,
    pub variances: Array3<f64>,
}

/// Deserialized parameter blocks, checked by `Hmm::from_parts` before use.
#[derive(Deserialize)]
struct RawHmm {
    a: Array2<f64>,
    weights: Array2<f64>,
    means: Array3<f64>,
    variances: Array3<f64>,
}

impl TryFrom<RawHmm> for Hmm {
    type Error = Error;

    fn try_from(raw: RawHmm) -> Result<Self> {
        Hmm::from_parts(raw.a, raw.weights, raw.means, raw.variances)
    }
}

impl Hmm {

    /// Model with uniform transitions and weights, zero means and unit variances.
    pub fn new(nstates: usize, nmix: usize, dim: usize) -> Self {
        let a = Array2::from_elem((nstates, 2), 0.5);
        let weights = Array2::from_elem((nstates, nmix), 1.0 / nmix as f64);
        let means = Array3::zeros((nstates, nmix, dim));
        let variances = Array3::ones((nstates, nmix, dim));
        Self { a, weights, means, variances }
    }

    pub fn from_parts(a: Array2<f64>, weights: Array2<f64>, means: Array3<f64>, variances: Array3<f64>) -> Result<Self> {
        let hmm = Self { a, weights, means, variances };
        hmm.check_layout()?;
        Ok(hmm)
    }

    /// Verifies that the parameter blocks describe the same non-empty
    /// N, M and D.
    pub fn check_layout(&self) -> Result<()> {
        let (nstates, nmix, dim) = self.means.dim();
        if nstates == 0 || nmix == 0 || dim == 0 {
            return Err(Error::Layout(format!("empty model shape {:?}", self.means.dim())));
        }
        if self.a.dim() != (nstates, 2) {
            return Err(Error::Layout(format!("transitions have shape {:?}, expected ({}, 2)", self.a.dim(), nstates)));
        }
        if self.weights.dim() != (nstates, nmix) {
            return Err(Error::Layout(format!("weights have shape {:?}, expected ({}, {})", self.weights.dim(), nstates, nmix)));
        }
        if self.variances.dim() != self.means.dim() {
            return Err(Error::Layout(format!("variances have shape {:?}, means {:?}", self.variances.dim(), self.means.dim())));
        }
        Ok(())
    }

    pub fn nstates(&self) -> usize {
        self.a.nrows()
    }

    pub fn nmix(&self) -> usize {
        self.weights.ncols()
    }

    pub fn dim(&self) -> usize {
        self.means.dim().2
    }

    pub fn exit_prob(&self) -> f64 {
        self.a[[self.nstates() - 1, ADVANCE]]
    }

    pub fn log_transition(&self, state: usize, kind: usize) -> f64 {
        self.a[[state, kind]].ln()
    }

    pub fn mean(&self, state: usize, mix: usize) -> ArrayView1<f64> {
        self.means.slice(s![state, mix, ..])
    }

    pub fn variance(&self, state: usize, mix: usize) -> ArrayView1<f64> {
        self.variances.slice(s![state, mix, ..])
    }

    pub fn is_finite(&self) -> bool {
        self.a.iter()
            .chain(self.weights.iter())
            .chain(self.means.iter())
            .chain(self.variances.iter())
            .all(|x| x.is_finite())
    }

    /// Flattens the model in persistence order: D, N, M, then for every state
    /// its two transition probabilities followed by, per component, the
    /// weight, D means and D variances.
    pub fn to_parameters(&self) -> Vec<f64> {
        let (nstates, nmix, dim) = (self.nstates(), self.nmix(), self.dim());
        let mut out = Vec::with_capacity(3 + nstates * (2 + nmix * (1 + 2 * dim)));
        out.push(dim as f64);
        out.push(nstates as f64);
        out.push(nmix as f64);
        for state in 0..nstates {
            out.push(self.a[[state, STAY]]);
            out.push(self.a[[state, ADVANCE]]);
            for mix in 0..nmix {
                out.push(self.weights[[state, mix]]);
                out.extend(self.mean(state, mix).iter());
                out.extend(self.variance(state, mix).iter());
            }
        }
        out
    }

    pub fn from_parameters(values: &[f64]) -> Result<Self> {
        if values.len() < 3 {
            return Err(Error::Layout(format!("header needs 3 values, got {}", values.len())));
        }
        let dim = header_count(values[0], "dimension")?;
        let nstates = header_count(values[1], "state count")?;
        let nmix = header_count(values[2], "mixture count")?;
        let expected = 3 + nstates * (2 + nmix * (1 + 2 * dim));
        if values.len() != expected {
            return Err(Error::Layout(format!("expected {} values for D={} N={} M={}, got {}", expected, dim, nstates, nmix, values.len())));
        }

        let mut hmm = Hmm::new(nstates, nmix, dim);
        let mut rest = values[3..].iter().copied();
        // length was checked above, the iterator can not run dry
        let mut next = || rest.next().unwrap_or(f64::NAN);
        for state in 0..nstates {
            hmm.a[[state, STAY]] = next();
            hmm.a[[state, ADVANCE]] = next();
            for mix in 0..nmix {
                hmm.weights[[state, mix]] = next();
                for d in 0..dim {
                    hmm.means[[state, mix, d]] = next();
                }
                for d in 0..dim {
                    hmm.variances[[state, mix, d]] = next();
                }
            }
        }
        Ok(hmm)
    }
}

fn header_count(value: f64, name: &str) -> Result<usize> {
    if value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as usize)
    } else {
        Err(Error::Layout(format!("{} must be a positive integer, got {}", name, value)))
    }
}

/// Raises every entry to at least `floor` and rescales the row to sum to one.
pub fn floor_and_normalize(mut row: ArrayViewMut1<f64>, floor: f64) {
    row.mapv_inplace(|p| if p < floor { floor } else { p });
    let s = row.sum();
    row /= s;
}
