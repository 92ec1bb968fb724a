use ndarray::{ArrayView1, ArrayView2, ArrayViewMut2, Zip};

use super::model::Hmm;

/// Smallest value a mixture density may take, so its logarithm stays finite.
/// NaN passes through unchanged.
pub const MIN_DENSITY: f64 = f64::MIN_POSITIVE;

const LN_2PI: f64 = 1.8378770664093453;

/// Observation density of a model state at one frame.
pub trait Emission {

    fn nstates(&self) -> usize;

    fn dim(&self) -> usize;

    fn density(&self, state: usize, frame: ArrayView1<f64>) -> f64;

    fn log_density(&self, state: usize, frame: ArrayView1<f64>) -> f64 {
        self.density(state, frame).ln()
    }

    /// Fills `out[t][s]` with the density of state `s` at frame `t`.
    fn emission_table(&self, frames: ArrayView2<f64>, mut out: ArrayViewMut2<f64>) {
        for (frame, mut row) in frames.outer_iter().zip(out.outer_iter_mut()) {
            for state in 0..self.nstates() {
                row[state] = self.density(state, frame);
            }
        }
    }
}

/// Product of independent univariate Gaussians, computed as the exponential
/// of the summed log terms.
pub fn gaussian(frame: ArrayView1<f64>, mean: ArrayView1<f64>, variance: ArrayView1<f64>) -> f64 {
    let mut exponent = 0.0;
    Zip::from(&frame).and(&mean).and(&variance).for_each(|&x, &mu, &var| {
        let diff = x - mu;
        exponent -= 0.5 * (LN_2PI + var.ln() + diff * diff / var);
    });
    exponent.exp()
}

impl Hmm {

    pub fn component_density(&self, state: usize, mix: usize, frame: ArrayView1<f64>) -> f64 {
        gaussian(frame, self.mean(state, mix), self.variance(state, mix))
    }
}

impl Emission for Hmm {

    fn nstates(&self) -> usize {
        Hmm::nstates(self)
    }

    fn dim(&self) -> usize {
        Hmm::dim(self)
    }

    fn density(&self, state: usize, frame: ArrayView1<f64>) -> f64 {
        let mut p = 0.0;
        for mix in 0..self.nmix() {
            p += self.weights[[state, mix]] * self.component_density(state, mix, frame);
        }
        if p < MIN_DENSITY { MIN_DENSITY } else { p }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn standard_normal_peak() {
        let x = array![0.0];
        let p = gaussian(x.view(), array![0.0].view(), array![1.0].view());
        assert_relative_eq!(p, 1.0 / (2.0 * std::f64::consts::PI).sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn diagonal_density_factorizes() {
        let x = array![0.5, -1.0];
        let p = gaussian(x.view(), array![0.0, 0.0].view(), array![1.0, 4.0].view());
        let p0 = gaussian(array![0.5].view(), array![0.0].view(), array![1.0].view());
        let p1 = gaussian(array![-1.0].view(), array![0.0].view(), array![4.0].view());
        assert_relative_eq!(p, p0 * p1, max_relative = 1e-12);
    }

    #[test]
    fn mixture_is_weighted_sum_and_floored() {
        let mut hmm = Hmm::new(1, 2, 1);
        hmm.weights[[0, 0]] = 0.25;
        hmm.weights[[0, 1]] = 0.75;
        hmm.means[[0, 1, 0]] = 2.0;
        let x = array![1.0];
        let expected = 0.25 * hmm.component_density(0, 0, x.view()) + 0.75 * hmm.component_density(0, 1, x.view());
        assert_relative_eq!(hmm.density(0, x.view()), expected, max_relative = 1e-12);

        let far = array![1.0e6];
        assert_eq!(hmm.density(0, far.view()), MIN_DENSITY);
        assert!(hmm.log_density(0, far.view()).is_finite());
    }

    #[test]
    fn nan_density_is_not_floored() {
        let mut hmm = Hmm::new(1, 1, 1);
        hmm.variances[[0, 0, 0]] = f64::NAN;
        assert!(hmm.density(0, array![0.0].view()).is_nan());
    }

    #[test]
    fn table_matches_density() {
        let mut hmm = Hmm::new(2, 1, 1);
        hmm.means[[1, 0, 0]] = 3.0;
        let frames = array![[0.0], [3.0], [1.0]];
        let mut table = Array2::zeros((3, 2));
        hmm.emission_table(frames.view(), table.view_mut());
        for t in 0..3 {
            for s in 0..2 {
                assert_eq!(table[[t, s]], hmm.density(s, frames.row(t)));
            }
        }
    }
}
