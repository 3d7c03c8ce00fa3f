mod support;

use skillgrade::eval::{Grade, Orchestrator, RunOptions, RunStatus, SecurityGrade};
use skillgrade::evidence::EvidenceStore;
use skillgrade::provider::RateLimiter;
use skillgrade::skills::SkillLibrary;
use std::sync::Arc;
use support::{EXEC_MODEL, FakeModel, GEN_MODEL, JUDGE_MODEL, seed_skill, test_config};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn orchestrator(model: Arc<FakeModel>, config: &skillgrade::Config) -> Orchestrator {
    Orchestrator::new(
        model,
        Arc::new(RateLimiter::new(
            config.limits.max_in_flight,
            config.calls_per_minute(),
        )),
        EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard),
        config.clone(),
        CancellationToken::new(),
    )
}

fn load_skills(config: &skillgrade::Config) -> Vec<skillgrade::skills::SkillRecord> {
    let library = SkillLibrary::new(&config.paths.skills_dir, config.trials.max_content_bytes);
    library
        .list()
        .into_iter()
        .map(|id| library.load(&id).unwrap())
        .collect()
}

#[tokio::test]
async fn full_run_produces_score_evidence_and_leaderboard() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seed_skill(&config, "pdf", "# PDF skill\nMerge, split, extract.");

    // 7 skill wins, 2 baseline wins, 1 tie.
    let plan = vec![
        "skill", "skill", "skill", "skill", "skill", "skill", "skill", "baseline", "baseline",
        "tie",
    ];
    let model = Arc::new(FakeModel::new(plan));
    let orchestrator = orchestrator(Arc::clone(&model), &config);

    let summary = orchestrator
        .evaluate_many(load_skills(&config), &RunOptions { seed: Some(42), ..RunOptions::default() })
        .await;

    assert!(summary.all_complete(), "outcomes: {:?}", summary.outcomes);
    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.status, RunStatus::Complete);
    assert_eq!(outcome.trial_count, 10);
    assert_eq!(outcome.errored_trials, 0);

    let store = EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard);
    let score = store.load_score("pdf").unwrap();
    assert_eq!(score.wins, 7);
    assert_eq!(score.losses, 2);
    assert_eq!(score.ties, 1);
    assert_eq!(score.wins + score.losses + score.ties, 10);
    assert_eq!(score.win_rate, Some(77.78));
    assert_eq!(score.grade, Some(Grade::B));

    // Cost comes from mean output tokens at the configured price.
    assert_eq!(score.avg_tokens_skill, 1500.0);
    assert_eq!(score.cost_per_use, 0.000625);
    assert!(score.baseline_cost < score.cost_per_use);

    // One trial artifact per prompt index, fully populated.
    let trials = store.load_trials("pdf");
    assert_eq!(trials.len(), 10);
    let indices: Vec<usize> = trials.iter().map(|t| t.prompt_index).collect();
    assert_eq!(indices, (0..10).collect::<Vec<_>>());
    for trial in &trials {
        assert!(!trial.reasoning.is_empty());
        assert_eq!(trial.judge_model, JUDGE_MODEL);
    }

    // Security merged into the summary; leaderboard rebuilt.
    let skill_summary = store.load_summary("pdf").unwrap();
    assert_eq!(skill_summary.security_grade, Some(SecurityGrade::Warning));
    assert_eq!(skill_summary.security_issues, Some(1));
    assert_eq!(skill_summary.prompt_count, 10);

    let board = store.load_leaderboard().unwrap();
    assert_eq!(board.total_skills, 1);
    assert_eq!(board.ratings[0].skill_id, "pdf");
}

#[tokio::test]
async fn rerun_without_force_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seed_skill(&config, "pdf", "# PDF skill");

    let plan = vec!["skill"; 10];
    let model = Arc::new(FakeModel::new(plan));
    let orchestrator = orchestrator(Arc::clone(&model), &config);
    let opts = RunOptions {
        seed: Some(7),
        ..RunOptions::default()
    };

    let first = orchestrator.evaluate_many(load_skills(&config), &opts).await;
    assert!(first.all_complete());

    let store = EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard);
    let score_bytes_before = store.score_bytes("pdf").unwrap();
    let calls_before = model.total_calls();

    let second = orchestrator.evaluate_many(load_skills(&config), &opts).await;
    assert!(second.all_complete());
    assert_eq!(second.outcomes[0].trial_count, 10);

    // Identical score artifact, zero new trials, zero new model calls.
    assert_eq!(store.score_bytes("pdf").unwrap(), score_bytes_before);
    assert_eq!(model.total_calls(), calls_before);
    assert_eq!(store.load_trials("pdf").len(), 10);
}

#[tokio::test]
async fn force_invalidates_prompts_and_trials() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seed_skill(&config, "pdf", "# PDF skill");

    let model = Arc::new(FakeModel::new(vec!["skill"; 10]));
    let orchestrator = orchestrator(Arc::clone(&model), &config);

    let opts = RunOptions {
        seed: Some(7),
        ..RunOptions::default()
    };
    orchestrator.evaluate_many(load_skills(&config), &opts).await;
    let generation_calls = model.calls_for_model(GEN_MODEL);
    let execution_calls = model.calls_for_model(EXEC_MODEL);
    assert_eq!(generation_calls, 1);
    assert_eq!(execution_calls, 20);

    let forced = RunOptions {
        force: true,
        seed: Some(7),
        ..RunOptions::default()
    };
    let summary = orchestrator.evaluate_many(load_skills(&config), &forced).await;
    assert!(summary.all_complete());

    // Prompts regenerated and all trials re-run.
    assert_eq!(model.calls_for_model(GEN_MODEL), 2);
    assert_eq!(model.calls_for_model(EXEC_MODEL), 40);
}

#[tokio::test]
async fn position_assignment_matches_seeded_draws() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    seed_skill(&config, "pdf", "# PDF skill");

    let model = Arc::new(FakeModel::new(vec!["skill"; 10]));
    let orchestrator = orchestrator(Arc::clone(&model), &config);
    orchestrator
        .evaluate_many(
            load_skills(&config),
            &RunOptions {
                seed: Some(9),
                ..RunOptions::default()
            },
        )
        .await;

    let store = EvidenceStore::new(&config.paths.evaluations_dir, &config.paths.leaderboard);
    let trials = store.load_trials("pdf");
    // The persisted assignment must equal the seeded draw for each trial;
    // the distribution itself is covered by the rng unit tests.
    for trial in &trials {
        assert_eq!(
            trial.position,
            skillgrade::eval::rng::position_for_trial(9, "pdf", trial.prompt_index)
        );
    }
}
