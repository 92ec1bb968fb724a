use ndarray::Array1;

use crate::error::Result;
use crate::hmm::Token;

pub mod recognizer;
pub mod viterbi;

pub trait Solver {
    fn solve(&mut self, token: &Token) -> Result<()>;
    fn get_solution(&self) -> &Array1<usize>;
    fn get_objective(&self) -> f64;
}
