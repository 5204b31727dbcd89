use data_contracts::{
    stable_argmax, ClassLabel, ClassifierOutcome, ContractError, Stage1Label, Stage2Label,
    DISTRIBUTION_TOLERANCE,
};

fn logit_grid() -> Vec<[f32; 3]> {
    let steps = [-40.0f32, -3.5, -1.0, 0.0, 0.25, 2.0, 7.5, 60.0];
    let mut out = Vec::new();
    for &a in &steps {
        for &b in &steps {
            for &c in &steps {
                out.push([a, b, c]);
            }
        }
    }
    out
}

#[test]
fn every_outcome_is_a_valid_distribution_with_consistent_argmax() {
    for logits in logit_grid() {
        let outcome = ClassifierOutcome::<Stage1Label>::from_logits(&logits).unwrap();
        let probs = outcome.probabilities();
        assert!(probs.iter().all(|p| *p >= 0.0 && *p <= 1.0), "{logits:?}");
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE, "{logits:?} sums to {sum}");
        assert_eq!(stable_argmax(probs), Some(outcome.label().index()));
        assert_eq!(outcome.confidence(), probs[outcome.label().index()]);
    }
}

#[test]
fn tied_logits_resolve_to_enumeration_order() {
    let outcome = ClassifierOutcome::<Stage1Label>::from_logits(&[1.0, 1.0, 1.0]).unwrap();
    assert_eq!(outcome.label(), Stage1Label::Normal);
    let outcome = ClassifierOutcome::<Stage2Label>::from_logits(&[0.5, 0.5]).unwrap();
    assert_eq!(outcome.label(), Stage2Label::Aom);
}

#[test]
fn out_of_range_probability_is_rejected() {
    let err = ClassifierOutcome::<Stage2Label>::from_probabilities(vec![1.2, -0.2]).unwrap_err();
    assert_eq!(
        err,
        ContractError::ProbabilityRange {
            index: 0,
            value: 1.2
        }
    );
}
