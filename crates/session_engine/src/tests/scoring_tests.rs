use super::*;

const ROUND: Duration = Duration::from_millis(10_000);

#[test]
fn instant_correct_answer_scores_base_points() {
    let rules = ScoringRules::default();
    assert_eq!(rules.points(true, Duration::ZERO, ROUND), rules.base_points);
}

#[test]
fn correct_answer_at_deadline_scores_floor() {
    let rules = ScoringRules::default();
    assert_eq!(rules.points(true, ROUND, ROUND), rules.min_points);
    assert_eq!(
        rules.points(true, ROUND + Duration::from_secs(3), ROUND),
        rules.min_points
    );
}

#[test]
fn incorrect_answer_scores_zero() {
    let rules = ScoringRules::default();
    assert_eq!(rules.points(false, Duration::ZERO, ROUND), 0);
    assert_eq!(rules.points(false, Duration::from_millis(4_000), ROUND), 0);
}

#[test]
fn points_decay_linearly_with_latency() {
    let rules = ScoringRules::default();
    assert_eq!(rules.points(true, Duration::from_millis(2_000), ROUND), 800);
    assert_eq!(rules.points(true, Duration::from_millis(5_000), ROUND), 500);
    assert!(
        rules.points(true, Duration::from_millis(1_000), ROUND)
            > rules.points(true, Duration::from_millis(6_000), ROUND)
    );
}

#[test]
fn half_decay_keeps_half_the_points_at_deadline() {
    let rules = ScoringRules {
        base_points: 1000,
        decay_weight: 0.5,
        min_points: 0,
    };
    assert_eq!(rules.points(true, ROUND, ROUND), 500);
}

#[test]
fn latency_fraction_is_clamped() {
    assert_eq!(latency_fraction(Duration::from_secs(20), ROUND), 1.0);
    assert_eq!(latency_fraction(Duration::ZERO, ROUND), 0.0);
    assert_eq!(latency_fraction(Duration::from_secs(1), Duration::ZERO), 1.0);
}

#[test]
fn validate_rejects_inconsistent_rules() {
    assert!(ScoringRules::default().validate().is_ok());
    let floor_above_base = ScoringRules {
        base_points: 100,
        decay_weight: 1.0,
        min_points: 200,
    };
    assert!(floor_above_base.validate().is_err());
    let negative_decay = ScoringRules {
        decay_weight: -0.1,
        ..ScoringRules::default()
    };
    assert!(negative_decay.validate().is_err());
}
