use std::collections::TryReserveError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not allocate {what}: {source}")]
    Allocation {
        what: &'static str,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("dimension mismatch: expected {expected}-dimensional frames, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("token has {frames} frames but the model has {states} states")]
    TokenTooShort { frames: usize, states: usize },

    #[error("token has no frames")]
    EmptyToken,

    #[error("malformed parameter layout: {0}")]
    Layout(String),

    #[error("malformed feature matrix: {0}")]
    Features(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, Error>;
