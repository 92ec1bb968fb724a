use approx::{assert_abs_diff_eq, assert_relative_eq};
use ndarray::{array, Array2};

use bakis_hmm::hmm::{ADVANCE, STAY};
use bakis_hmm::{decode, recognize, train, Config, Context, Emission, Hmm, Termination, Token, WordModel};

fn step_token() -> Token {
    Token::new(array![[0.0], [0.0], [5.0], [5.0]]).unwrap()
}

fn train_step_model() -> bakis_hmm::TrainingOutcome {
    let mut ctx = Context::new(Config::new(2, 1)).unwrap();
    train(&mut ctx, &[step_token()]).unwrap()
}

#[test]
fn two_state_model_separates_the_step() {
    let outcome = train_step_model();
    match outcome.termination {
        Termination::Converged { iterations } => assert!(iterations <= 10, "took {} iterations", iterations),
        other => panic!("expected convergence, got {:?}", other),
    }
    let hmm = &outcome.hmm;
    assert_abs_diff_eq!(hmm.means[[0, 0, 0]], 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(hmm.means[[1, 0, 0]], 5.0, epsilon = 1e-6);

    let trace = &outcome.log_likelihoods;
    assert!(trace.iter().all(|ll| ll.is_finite()));
    assert!(trace[trace.len() - 1] > trace[0]);
    for state in 0..2 {
        assert_abs_diff_eq!(hmm.a.row(state).sum(), 1.0, epsilon = 1e-12);
    }
    assert_eq!(outcome.token_log_likelihoods.len(), 1);
}

#[test]
fn trained_model_aligns_the_step() {
    let outcome = train_step_model();
    let hmm = &outcome.hmm;
    let token = step_token();
    let alignment = decode(hmm, &token).unwrap();
    assert_eq!(alignment.path, vec![0, 0, 1, 1]);

    let expected = hmm.log_density(0, token.frame(0))
        + hmm.log_transition(0, STAY)
        + hmm.log_density(0, token.frame(1))
        + hmm.log_transition(0, ADVANCE)
        + hmm.log_density(1, token.frame(2))
        + hmm.log_transition(1, STAY)
        + hmm.log_density(1, token.frame(3));
    assert_relative_eq!(alignment.log_likelihood, expected, max_relative = 1e-12);
}

#[test]
fn constant_frames_roll_back_instead_of_returning_nan() {
    let token = Token::new(Array2::from_elem((6, 24), 1.0)).unwrap();
    let mut ctx = Context::new(Config::new(1, 1)).unwrap();
    let outcome = train(&mut ctx, &[token]).unwrap();

    assert_eq!(outcome.termination, Termination::Diverged { iteration: 0, restored_iteration: 0 });
    assert!(outcome.hmm.is_finite());
    assert!(!outcome.log_likelihoods[0].is_finite());
    assert_eq!(ctx.log().len(), 1);
}

#[test]
fn persisted_model_decodes_identically() {
    let outcome = train_step_model();
    let restored = Hmm::from_parameters(&outcome.hmm.to_parameters()).unwrap();
    assert_eq!(restored, outcome.hmm);

    let json = serde_json::to_string(&outcome.hmm).unwrap();
    let from_json: Hmm = serde_json::from_str(&json).unwrap();
    let token = step_token();
    assert_eq!(decode(&from_json, &token).unwrap(), decode(&outcome.hmm, &token).unwrap());
}

#[test]
fn recognizer_picks_the_matching_word() {
    let rising = train_step_model().hmm;
    let mut ctx = Context::new(Config::new(2, 1)).unwrap();
    let falling = train(&mut ctx, &[Token::new(array![[5.0], [5.0], [0.0], [0.0]]).unwrap()])
        .unwrap()
        .hmm;
    let models = vec![
        WordModel { word: String::from("down"), label: String::from("w0"), hmm: falling },
        WordModel { word: String::from("up"), label: String::from("w1"), hmm: rising },
    ];
    let recognition = recognize(&models, &step_token()).unwrap();
    let best = recognition.best().unwrap();
    assert_eq!(best.word, "up");
    assert_eq!(best.path, vec![0, 0, 1, 1]);
    assert!(recognition.candidates[0].log_likelihood > recognition.candidates[1].log_likelihood);
}
