use ndarray::{Array1, Array2};

use super::Solver;
use crate::error::{Error, Result};
use crate::hmm::{Emission, Hmm, Token, ADVANCE, STAY};
use crate::utils::{index_zeros2, zeros2};

/// Score of states that can not be occupied at the first frame.
pub const UNREACHABLE: f64 = -1.0e30;

/// Best state path of a token and its log-likelihood.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub log_likelihood: f64,
    pub path: Vec<usize>,
}

/// Log-domain Viterbi decoder over the left-to-right topology. The path is
/// forced to start in the first state and to end in the last one.
pub struct Viterbi<'a> {
    hmm: &'a Hmm,
    log_a: Array2<f64>,
    viterbi_array: Array2<f64>,
    viterbi_bt: Array2<usize>,
    solution: Array1<usize>,
    objective: f64,
}

impl<'a> Viterbi<'a> {

    pub fn new(hmm: &'a Hmm, max_seq_size: usize) -> Result<Self> {
        hmm.check_layout()?;
        let viterbi_array = zeros2((max_seq_size, hmm.nstates()), "viterbi lattice")?;
        let viterbi_bt = index_zeros2((max_seq_size, hmm.nstates()), "viterbi backpointers")?;
        let log_a = hmm.a.mapv(f64::ln);
        Ok(Self { hmm, log_a, viterbi_array, viterbi_bt, solution: Array1::zeros(0), objective: f64::NEG_INFINITY })
    }

    fn ensure_capacity(&mut self, len: usize) -> Result<()> {
        if self.viterbi_array.nrows() < len {
            self.viterbi_array = zeros2((len, self.hmm.nstates()), "viterbi lattice")?;
            self.viterbi_bt = index_zeros2((len, self.hmm.nstates()), "viterbi backpointers")?;
        }
        Ok(())
    }

    pub fn alignment(&self) -> Alignment {
        Alignment { log_likelihood: self.objective, path: self.solution.to_vec() }
    }
}

impl<'a> Solver for Viterbi<'a> {

    fn solve(&mut self, token: &Token) -> Result<()> {
        let nstates = self.hmm.nstates();
        let len = token.len();
        if token.dim() != self.hmm.dim() {
            return Err(Error::DimensionMismatch { expected: self.hmm.dim(), found: token.dim() });
        }
        if len < nstates {
            return Err(Error::TokenTooShort { frames: len, states: nstates });
        }
        self.ensure_capacity(len)?;

        self.viterbi_array.row_mut(0).fill(UNREACHABLE);
        self.viterbi_array[[0, 0]] = self.hmm.log_density(0, token.frame(0));
        for t in 1..len {
            let frame = token.frame(t);
            for state_to in 0..nstates {
                let emit = self.hmm.log_density(state_to, frame);
                let stay = self.viterbi_array[[t - 1, state_to]] + self.log_a[[state_to, STAY]];
                let (best, state_from) = if state_to > 0 {
                    let advance = self.viterbi_array[[t - 1, state_to - 1]] + self.log_a[[state_to - 1, ADVANCE]];
                    // ties stay in place
                    if advance > stay { (advance, state_to - 1) } else { (stay, state_to) }
                } else {
                    (stay, state_to)
                };
                self.viterbi_array[[t, state_to]] = best + emit;
                self.viterbi_bt[[t, state_to]] = state_from;
            }
        }

        let mut end_state = nstates - 1;
        self.objective = self.viterbi_array[[len - 1, end_state]];
        let mut predicted = Array1::zeros(len);
        predicted[len - 1] = end_state;
        for t in (0..len - 1).rev() {
            end_state = self.viterbi_bt[[t + 1, end_state]];
            predicted[t] = end_state;
        }
        self.solution = predicted;
        Ok(())
    }

    fn get_solution(&self) -> &Array1<usize> {
        &self.solution
    }

    fn get_objective(&self) -> f64 {
        self.objective
    }
}

pub fn decode(hmm: &Hmm, token: &Token) -> Result<Alignment> {
    let mut solver = Viterbi::new(hmm, token.len())?;
    solver.solve(token)?;
    Ok(solver.alignment())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::testing::{sine_token, toy_hmm};
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn path_spans_first_to_last_state() {
        let hmm = toy_hmm();
        let mut solver = Viterbi::new(&hmm, 4).unwrap();
        for len in [3usize, 8, 30].iter() {
            solver.solve(&sine_token(*len, 0.4)).unwrap();
            let path = solver.get_solution();
            assert_eq!(path.len(), *len);
            assert_eq!(path[0], 0);
            assert_eq!(path[*len - 1], hmm.nstates() - 1);
            for w in path.to_vec().windows(2) {
                assert!(w[1] == w[0] || w[1] == w[0] + 1);
            }
        }
    }

    #[test]
    fn objective_is_the_path_score() {
        let hmm = toy_hmm();
        let token = sine_token(10, 1.1);
        let alignment = decode(&hmm, &token).unwrap();
        let path = &alignment.path;
        let mut score = hmm.log_density(0, token.frame(0));
        for t in 1..token.len() {
            let kind = if path[t] == path[t - 1] { STAY } else { ADVANCE };
            score += hmm.log_transition(path[t - 1], kind) + hmm.log_density(path[t], token.frame(t));
        }
        assert_relative_eq!(alignment.log_likelihood, score, max_relative = 1e-12);
    }

    #[test]
    fn ties_prefer_staying() {
        let mut hmm = Hmm::new(2, 1, 1);
        hmm.a.fill(0.5);
        let token = Token::new(array![[0.0], [0.0], [0.0]]).unwrap();
        let alignment = decode(&hmm, &token).unwrap();
        assert_eq!(alignment.path, vec![0, 1, 1]);
    }

    #[test]
    fn rejects_inconsistent_model() {
        let mut hmm = toy_hmm();
        hmm.a = Array2::from_elem((2, 2), 0.5);
        let token = sine_token(5, 0.0);
        assert!(matches!(decode(&hmm, &token), Err(Error::Layout(_))));
    }

    #[test]
    fn rejects_unalignable_tokens() {
        let hmm = toy_hmm();
        assert!(matches!(decode(&hmm, &sine_token(2, 0.0)), Err(Error::TokenTooShort { frames: 2, states: 3 })));
        let token = Token::new(array![[0.0], [1.0], [2.0]]).unwrap();
        assert!(matches!(decode(&hmm, &token), Err(Error::DimensionMismatch { expected: 2, found: 1 })));
    }
}
