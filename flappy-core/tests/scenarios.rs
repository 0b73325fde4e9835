use flappy_core::{
    evaluate_generation, ConstantPolicy, EvaluationSettings, Member, Termination, WorldConfig,
};

fn narrow_settings() -> EvaluationSettings {
    EvaluationSettings {
        world: WorldConfig::with_gap(150.0, 400.0),
        ..EvaluationSettings::default()
    }
}

#[test]
fn never_jumping_agent_hits_the_floor_at_frame_55() {
    // Start y 200, terminal fall 10 px/frame from frame 8 on: y(n) = 160 + 10n.
    // Bottom edge y + 24 reaches the floor at 730 on frame 55, long before the
    // first obstacle (x 700) scrolls to the agent.
    for seed in [1, 2, 0xF1A9_0001] {
        let mut members = vec![Member::new(0, ConstantPolicy(0.0))];
        let outcome = evaluate_generation(&mut members, &narrow_settings(), seed).expect("valid");
        assert_eq!(outcome.frames, 55);
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.deaths, 1);
        assert_eq!(outcome.survivors, 0);
        assert_eq!(outcome.termination, Termination::Extinction);
        assert!((members[0].fitness - (55.0 * 0.1 - 1.0)).abs() < 1e-9);
    }
}

#[test]
fn identical_policies_share_the_same_fate() {
    let mut members = vec![Member::new(7, ConstantPolicy(0.0)); 20];
    let outcome = evaluate_generation(&mut members, &narrow_settings(), 5).expect("valid");
    assert_eq!(outcome.deaths, 20);
    assert_eq!(outcome.frames, 55);
    let first = members[0].fitness;
    assert!(members.iter().all(|member| member.fitness == first));
}

#[test]
fn frame_budget_caps_a_perfect_hoverer() {
    let settings = EvaluationSettings {
        world: WorldConfig {
            gravity: 0.0,
            gap_top_range: (300, 301),
            agent_start_y: 380.0,
            ..WorldConfig::default()
        },
        frame_budget: 10_000,
        ..EvaluationSettings::default()
    };
    let mut members = vec![Member::new(0, ConstantPolicy(0.0))];
    let outcome = evaluate_generation(&mut members, &settings, 1).expect("valid");
    assert_eq!(outcome.termination, Termination::FrameBudget);
    assert_eq!(outcome.frames, 10_000);
    assert_eq!(outcome.survivors, 1);
    // Obstacle i clears once 700 + 400i - 7.5n < -2.
    assert_eq!(outcome.score, 186);
}

#[test]
fn invalid_settings_fail_before_running() {
    let settings = EvaluationSettings {
        world: WorldConfig::with_gap(0.0, 400.0),
        ..EvaluationSettings::default()
    };
    let mut members = vec![Member::new(0, ConstantPolicy(0.0))];
    assert!(evaluate_generation(&mut members, &settings, 1).is_err());
}
