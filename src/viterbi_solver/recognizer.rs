use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use super::viterbi::Viterbi;
use super::Solver;
use crate::error::{Error, Result};
use crate::hmm::{Hmm, Token};

/// Trained model of one vocabulary word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordModel {
    pub word: String,
    pub label: String,
    pub hmm: Hmm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Position of the model in the candidate list.
    pub index: usize,
    pub word: String,
    pub label: String,
    pub log_likelihood: f64,
    pub path: Vec<usize>,
}

/// Candidates ordered best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub candidates: Vec<Candidate>,
}

impl Recognition {

    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

fn ranking_score(candidate: &Candidate) -> f64 {
    if candidate.log_likelihood.is_nan() {
        f64::NEG_INFINITY
    } else {
        candidate.log_likelihood
    }
}

/// Decodes `token` against every model and ranks them by path
/// log-likelihood. Models with more states than the token has frames are
/// ranked last with an empty path.
pub fn recognize(models: &[WordModel], token: &Token) -> Result<Recognition> {
    let span = info_span!("recognize", candidates = models.len(), frames = token.len());
    let _enter = span.enter();

    if models.is_empty() {
        return Err(Error::Configuration(String::from("recognition needs at least one model")));
    }
    for model in models {
        model.hmm.check_layout()?;
        if model.hmm.dim() != token.dim() {
            return Err(Error::DimensionMismatch { expected: model.hmm.dim(), found: token.dim() });
        }
    }

    let mut candidates = Vec::with_capacity(models.len());
    for (index, model) in models.iter().enumerate() {
        let (log_likelihood, path) = if token.len() < model.hmm.nstates() {
            warn!(word = %model.word, states = model.hmm.nstates(), "token too short to align");
            (f64::NEG_INFINITY, Vec::new())
        } else {
            let mut solver = Viterbi::new(&model.hmm, token.len())?;
            solver.solve(token)?;
            (solver.get_objective(), solver.get_solution().to_vec())
        };
        debug!(word = %model.word, log_likelihood, "candidate decoded");
        candidates.push(Candidate {
            index,
            word: model.word.clone(),
            label: model.label.clone(),
            log_likelihood,
            path,
        });
    }
    candidates.sort_by(|a, b| ranking_score(b).total_cmp(&ranking_score(a)));
    Ok(Recognition { candidates })
}
