pub mod emission;
pub mod model;
pub mod token;

pub use emission::{gaussian, Emission, MIN_DENSITY};
pub use model::{floor_and_normalize, Hmm, ADVANCE, PROBABILITY_FLOOR, STAY};
pub use token::{FrameRef, Token, TrainingSet};
