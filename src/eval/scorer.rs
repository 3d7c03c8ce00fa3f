use super::types::{
    EvaluationRun, Grade, Leaderboard, Score, SecurityRecord, SkillSummary, Trial, Verdict,
};
use crate::config::PricingConfig;
use chrono::{DateTime, Utc};

/// Aggregate persisted trials into a [`Score`]. Pure: the same trials and
/// pricing always produce the same output for a given `computed_at`, so a
/// score can be reconstructed byte-for-byte from saved evidence.
pub fn score(
    skill_id: &str,
    trials: &[Trial],
    pricing: &PricingConfig,
    computed_at: DateTime<Utc>,
) -> Score {
    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut ties = 0u32;
    for trial in trials {
        match trial.verdict {
            Verdict::Skill => wins += 1,
            Verdict::Baseline => losses += 1,
            Verdict::Tie => ties += 1,
        }
    }

    // Ties count against neither side; with no decisive trial the rate is
    // undefined, not zero.
    let decisive = wins + losses;
    let win_rate = (decisive > 0).then(|| round2(f64::from(wins) / f64::from(decisive) * 100.0));
    let grade = win_rate.map(Grade::from_win_rate);

    let avg_tokens_skill = mean(trials.iter().map(|t| t.skill_tokens.output));
    let avg_tokens_baseline = mean(trials.iter().map(|t| t.baseline_tokens.output));

    // Both sides run on the same execution model, so the same pricing
    // constant applies to each - enabling a direct cost-delta comparison.
    let cost_per_use = round_to(avg_tokens_skill * pricing.price_per_token, pricing.cost_precision);
    let baseline_cost = round_to(
        avg_tokens_baseline * pricing.price_per_token,
        pricing.cost_precision,
    );

    Score {
        skill_id: skill_id.into(),
        wins,
        losses,
        ties,
        win_rate,
        grade,
        avg_tokens_skill,
        avg_tokens_baseline,
        cost_per_use,
        baseline_cost,
        computed_at,
    }
}

/// Merge score, security, and counts into the per-skill summary record.
pub fn summarize(
    run: &EvaluationRun,
    prompt_count: u32,
    score: Option<&Score>,
    security: Option<&SecurityRecord>,
    evaluated_at: DateTime<Utc>,
) -> SkillSummary {
    SkillSummary {
        skill_id: run.skill_id.clone(),
        name: None,
        source_url: None,
        status: run.status,
        grade: score.and_then(|s| s.grade),
        win_rate: score.and_then(|s| s.win_rate),
        wins: score.map_or(0, |s| s.wins),
        losses: score.map_or(0, |s| s.losses),
        ties: score.map_or(0, |s| s.ties),
        security_grade: security.and_then(SecurityRecord::grade),
        security_issues: security.and_then(SecurityRecord::issue_count),
        prompt_count,
        trial_count: run.trial_count,
        errored_trials: run.errored_trials,
        cost_per_use: score.map(|s| s.cost_per_use),
        baseline_cost: score.map(|s| s.baseline_cost),
        evaluated_at,
    }
}

/// Order summaries into the leaderboard artifact: defined win rates
/// descending, undefined rates after them, ties broken by skill id for a
/// deterministic artifact.
pub fn build_leaderboard(mut summaries: Vec<SkillSummary>, generated_at: DateTime<Utc>) -> Leaderboard {
    summaries.sort_by(|a, b| {
        match (a.win_rate, b.win_rate) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.skill_id.cmp(&b.skill_id))
    });

    Leaderboard {
        generated_at,
        total_skills: summaries.len() as u32,
        ratings: summaries,
    }
}

fn mean(values: impl Iterator<Item = u64>) -> f64 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
