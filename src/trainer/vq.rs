use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use ndarray_stats::QuantileExt;
use rand::Rng;
use tracing::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::utils::{zeros1, zeros2};

/// Result of a vector quantization: the centroids, the cluster index of
/// every input frame and the final mean distortion.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    pub centroids: Array2<f64>,
    pub assignments: Vec<usize>,
    pub distortion: f64,
}

impl Codebook {

    pub fn nclusters(&self) -> usize {
        self.centroids.nrows()
    }

    /// Row indices of the frames assigned to `cluster`.
    pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(move |(_, c)| **c == cluster)
            .map(|(i, _)| i)
    }

    pub fn cluster_size(&self, cluster: usize) -> usize {
        self.assignments.iter().filter(|c| **c == cluster).count()
    }
}

pub fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let mut sum = 0.0;
    Zip::from(&a).and(&b).for_each(|&x, &y| sum += (x - y) * (x - y));
    sum
}

/// LBG codebook design: starts from the mean of all frames and doubles the
/// centroid count by splitting until `nmix` centroids exist, refining with
/// k-means after every split.
pub fn lbg(ctx: &mut Context, frames: ArrayView2<f64>, nmix: usize) -> Result<Codebook> {
    if !nmix.is_power_of_two() {
        return Err(Error::Configuration(format!("mixture count must be a power of two, got {}", nmix)));
    }
    let mean = frames
        .mean_axis(Axis(0))
        .ok_or_else(|| Error::Configuration(String::from("no frames to quantize")))?;
    let dim = frames.ncols();
    let perturbation = ctx.config.split_perturbation;
    let threshold = ctx.config.kmeans_threshold;

    let mut centroids = zeros2((1, dim), "codebook")?;
    centroids.row_mut(0).assign(&mean);
    let mut codebook = kmeans(frames, centroids, threshold)?;
    while codebook.nclusters() < nmix {
        let n = codebook.nclusters();
        let mut split = zeros2((2 * n, dim), "codebook")?;
        split.slice_mut(s![..n, ..]).assign(&codebook.centroids);
        split.slice_mut(s![n.., ..]).assign(&codebook.centroids);
        for c in 0..n {
            for d in 0..dim {
                let delta = perturbation * (ctx.rng().gen::<f64>() - 0.5);
                split[[c, d]] += delta;
                split[[c + n, d]] -= delta;
            }
        }
        codebook = kmeans(frames, split, threshold)?;
    }
    Ok(codebook)
}

/// Lloyd iterations from the given centroids until the relative decrease of
/// the mean distortion is at most `threshold`. Empty clusters keep their
/// centroid.
pub fn kmeans(frames: ArrayView2<f64>, mut centroids: Array2<f64>, threshold: f64) -> Result<Codebook> {
    let n = frames.nrows();
    if n == 0 {
        return Err(Error::Configuration(String::from("no frames to quantize")));
    }
    let mut assignments = Vec::new();
    assignments
        .try_reserve_exact(n)
        .map_err(|source| Error::Allocation { what: "cluster assignments", source })?;
    assignments.resize(n, 0);
    let mut distances = zeros1(centroids.nrows(), "centroid distances")?;

    let mut previous = f64::INFINITY;
    let mut pass = 0;
    loop {
        let total = assign(frames, centroids.view(), &mut distances, &mut assignments)?;
        let distortion = total / n as f64;
        update_centroids(frames, &assignments, &mut centroids)?;
        pass += 1;
        debug!(pass, clusters = centroids.nrows(), distortion, "k-means pass");

        let improving = previous - distortion > threshold * previous;
        if pass > 1 && !improving {
            return Ok(Codebook { centroids, assignments, distortion });
        }
        previous = distortion;
    }
}

fn assign(frames: ArrayView2<f64>, centroids: ArrayView2<f64>, distances: &mut Array1<f64>, assignments: &mut [usize]) -> Result<f64> {
    let mut total = 0.0;
    for (i, frame) in frames.outer_iter().enumerate() {
        for (c, centroid) in centroids.outer_iter().enumerate() {
            distances[c] = squared_distance(frame, centroid);
        }
        let nearest = distances
            .argmin()
            .map_err(|e| Error::Features(format!("frame {} can not be quantized: {}", i, e)))?;
        assignments[i] = nearest;
        total += distances[nearest];
    }
    Ok(total)
}

fn update_centroids(frames: ArrayView2<f64>, assignments: &[usize], centroids: &mut Array2<f64>) -> Result<()> {
    let mut sums = zeros2(centroids.dim(), "centroid sums")?;
    let mut counts = vec![0usize; centroids.nrows()];
    for (frame, &c) in frames.outer_iter().zip(assignments) {
        let mut row = sums.row_mut(c);
        row += &frame;
        counts[c] += 1;
    }
    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            let mean = &sums.row(c) / count as f64;
            centroids.row_mut(c).assign(&mean);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Config;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![[0.0, 0.1], [0.2, -0.1], [-0.1, 0.0], [5.0, 5.2], [5.1, 4.9], [4.8, 5.0]]
    }

    #[test]
    fn kmeans_is_a_fixed_point() {
        let frames = two_blobs();
        let start = array![[1.0, 1.0], [4.0, 4.0]];
        let first = kmeans(frames.view(), start.clone(), 1e-3).unwrap();
        let second = kmeans(frames.view(), start, 1e-3).unwrap();
        assert_eq!(first, second);
        let again = kmeans(frames.view(), first.centroids.clone(), 1e-3).unwrap();
        assert_eq!(again.assignments, first.assignments);
        assert_eq!(first.assignments, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn empty_cluster_keeps_centroid() {
        let frames = array![[0.0], [1.0]];
        let start = array![[0.5], [100.0]];
        let book = kmeans(frames.view(), start, 1e-3).unwrap();
        assert_eq!(book.centroids[[1, 0]], 100.0);
        assert_eq!(book.cluster_size(1), 0);
        assert_eq!(book.cluster_size(0), 2);
    }

    #[test]
    fn lbg_separates_blobs() {
        let mut ctx = Context::new(Config::new(1, 2)).unwrap();
        let frames = array![[0.0], [0.1], [-0.1], [5.0], [5.1], [4.9]];
        let book = lbg(&mut ctx, frames.view(), 2).unwrap();
        assert_eq!(book.nclusters(), 2);
        let first: Vec<usize> = book.members(book.assignments[0]).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert!(book.distortion < 0.1);
    }

    #[test]
    fn lbg_single_component_is_the_mean() {
        let mut ctx = Context::new(Config::new(1, 1)).unwrap();
        let frames = array![[1.0], [2.0], [6.0]];
        let book = lbg(&mut ctx, frames.view(), 1).unwrap();
        assert_eq!(book.centroids, array![[3.0]]);
        assert_eq!(book.assignments, vec![0, 0, 0]);
    }

    #[test]
    fn lbg_rejects_non_power_of_two() {
        let mut ctx = Context::new(Config::new(1, 4)).unwrap();
        let frames = two_blobs();
        assert!(matches!(lbg(&mut ctx, frames.view(), 3), Err(Error::Configuration(_))));
    }
}
