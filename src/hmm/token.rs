use csv::ReaderBuilder;
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use ndarray_csv::Array2Reader;

use std::io::Read;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::utils::zeros2;

/// One utterance: `T` frames of `D` features, frame-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    frames: Array2<f64>,
}

impl Token {

    pub fn new(frames: Array2<f64>) -> Result<Self> {
        if frames.nrows() == 0 || frames.ncols() == 0 {
            return Err(Error::EmptyToken);
        }
        Ok(Self { frames })
    }

    /// Builds a token from the `n_frames * dim` values handed over by a
    /// feature front-end.
    pub fn from_frames(n_frames: usize, dim: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != n_frames * dim {
            return Err(Error::Features(format!(
                "expected {} values for {} frames of dimension {}, got {}",
                n_frames * dim, n_frames, dim, values.len()
            )));
        }
        Self::new(Array2::from_shape_vec((n_frames, dim), values)?)
    }

    /// Reads a headerless CSV with one frame per record.
    pub fn from_csv<R: Read>(reader: R, n_frames: usize, dim: usize) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(false).from_reader(reader);
        let frames: Array2<f64> = reader
            .deserialize_array2((n_frames, dim))
            .map_err(|e| Error::Features(e.to_string()))?;
        Self::new(frames)
    }

    pub fn len(&self) -> usize {
        self.frames.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.nrows() == 0
    }

    pub fn dim(&self) -> usize {
        self.frames.ncols()
    }

    pub fn frames(&self) -> ArrayView2<f64> {
        self.frames.view()
    }

    pub fn frame(&self, t: usize) -> ArrayView1<f64> {
        self.frames.row(t)
    }
}

/// Position of a frame inside a training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    pub token: usize,
    pub frame: usize,
}

/// Every training token packed into one `(total_frames x D)` arena. Token `k`
/// occupies rows `offsets[k]..offsets[k + 1]`.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    features: Array2<f64>,
    offsets: Vec<usize>,
}

impl TrainingSet {

    pub fn new(tokens: &[Token]) -> Result<Self> {
        let dim = match tokens.first() {
            Some(token) => token.dim(),
            None => return Err(Error::Configuration(String::from("training needs at least one token"))),
        };
        let mut offsets = Vec::new();
        offsets
            .try_reserve_exact(tokens.len() + 1)
            .map_err(|source| Error::Allocation { what: "token offsets", source })?;
        offsets.push(0);
        let mut total = 0;
        for token in tokens {
            if token.dim() != dim {
                return Err(Error::DimensionMismatch { expected: dim, found: token.dim() });
            }
            total += token.len();
            offsets.push(total);
        }

        let mut features = zeros2((total, dim), "feature arena")?;
        for (k, token) in tokens.iter().enumerate() {
            features.slice_mut(s![offsets[k]..offsets[k + 1], ..]).assign(&token.frames);
        }
        Ok(Self { features, offsets })
    }

    pub fn ntokens(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn dim(&self) -> usize {
        self.features.ncols()
    }

    pub fn total_frames(&self) -> usize {
        self.features.nrows()
    }

    pub fn rows(&self, token: usize) -> Range<usize> {
        self.offsets[token]..self.offsets[token + 1]
    }

    pub fn token_len(&self, token: usize) -> usize {
        self.offsets[token + 1] - self.offsets[token]
    }

    pub fn min_token_len(&self) -> usize {
        (0..self.ntokens()).map(|k| self.token_len(k)).min().unwrap_or(0)
    }

    pub fn token(&self, token: usize) -> ArrayView2<f64> {
        self.features.slice(s![self.rows(token), ..])
    }

    pub fn features(&self) -> ArrayView2<f64> {
        self.features.view()
    }

    pub fn frame(&self, at: FrameRef) -> ArrayView1<f64> {
        self.features.row(self.offsets[at.token] + at.frame)
    }
}
