//! Continuous-density left-to-right HMMs for isolated word recognition:
//! LBG initialization, scaled Baum-Welch training with divergence rollback
//! and Viterbi decoding.

pub mod context;
pub mod error;
pub mod hmm;
pub mod trainer;
pub mod utils;
pub mod viterbi_solver;

pub use context::{Context, TrainingLog};
pub use error::{Error, Result};
pub use hmm::{Emission, Hmm, Token, TrainingSet};
pub use trainer::{train, Termination, TrainingOutcome};
pub use utils::Config;
pub use viterbi_solver::recognizer::{recognize, Recognition, WordModel};
pub use viterbi_solver::viterbi::{decode, Alignment, Viterbi};
pub use viterbi_solver::Solver;
