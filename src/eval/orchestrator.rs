use super::judge::{DEFAULT_JUDGE_CONTEXT, Judge};
use super::prompts::{PromptGenerator, content_hash};
use super::rng::fresh_run_seed;
use super::scorer;
use super::security::SecurityAnalyzer;
use super::trial::TrialRunner;
use super::types::{
    EvaluationRun, Grade, PromptSet, RunStatus, Score, SecurityRecord, SkillSummary,
};
use crate::config::Config;
use crate::error::EvalError;
use crate::evidence::EvidenceStore;
use crate::provider::{ModelClient, RateLimiter};
use crate::skills::{SkillRecord, validate_content};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Invalidate cached prompts and trials before evaluating.
    pub force: bool,
    /// Record an explicit skip instead of running the security pass.
    pub skip_security: bool,
    /// Bound the number of skills evaluated this run.
    pub limit: Option<usize>,
    /// Position-assignment seed; a fresh random seed when unset.
    pub seed: Option<u64>,
}

/// Final per-skill state of one run, for the user-facing summary.
#[derive(Debug, Clone)]
pub struct SkillOutcome {
    pub skill_id: String,
    pub status: RunStatus,
    pub grade: Option<Grade>,
    pub win_rate: Option<f64>,
    pub trial_count: u32,
    pub errored_trials: u32,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<SkillOutcome>,
}

impl RunSummary {
    pub fn all_complete(&self) -> bool {
        !self.outcomes.is_empty()
            && self
                .outcomes
                .iter()
                .all(|outcome| outcome.status == RunStatus::Complete)
    }
}

/// Drives one [`EvaluationRun`] per skill: prompts (cached or generated),
/// trials under the shared limiter, security concurrently with trials,
/// scoring, and the leaderboard rebuild after every finished skill.
/// Failures local to one skill or one trial never abort the run.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    store: EvidenceStore,
    config: Config,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        store: EvidenceStore,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            limiter,
            store,
            config,
            cancel,
        }
    }

    /// Evaluate skills in parallel up to the configured ceiling. Outcomes
    /// come back in the input order.
    pub async fn evaluate_many(&self, mut skills: Vec<SkillRecord>, opts: &RunOptions) -> RunSummary {
        if let Some(limit) = opts.limit {
            skills.truncate(limit);
        }
        let run_seed = opts.seed.unwrap_or_else(fresh_run_seed);
        tracing::info!(skills = skills.len(), run_seed, "starting evaluation run");

        let gate = Arc::new(Semaphore::new(self.config.limits.skill_concurrency));
        let mut join_set = JoinSet::new();

        for (order, skill) in skills.into_iter().enumerate() {
            let orchestrator = self.clone();
            let gate = Arc::clone(&gate);
            let opts = opts.clone();
            join_set.spawn(async move {
                let _slot = gate.acquire().await.expect("skill gate is never closed");
                let outcome = orchestrator.evaluate_skill(&skill, &opts, run_seed).await;
                orchestrator.rebuild_leaderboard();
                (order, outcome)
            });
        }

        let mut ordered: Vec<(usize, SkillOutcome)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => ordered.push(entry),
                Err(err) => tracing::error!("skill evaluation task panicked: {err}"),
            }
        }
        ordered.sort_by_key(|(order, _)| *order);

        RunSummary {
            outcomes: ordered.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    /// Evaluate one skill end to end. Every failure is folded into the
    /// outcome; the run record in the store always reflects the final
    /// status and error log.
    pub async fn evaluate_skill(
        &self,
        skill: &SkillRecord,
        opts: &RunOptions,
        run_seed: u64,
    ) -> SkillOutcome {
        // Idempotence: a complete skill is not touched without --force, so
        // its score artifact stays byte-identical and gains zero trials.
        if !opts.force
            && let Some(run) = self.store.load_run(&skill.id)
            && run.status == RunStatus::Complete
            && let Some(score) = self.store.load_score(&skill.id)
        {
            tracing::info!(skill = skill.id.as_str(), "already complete, skipping");
            return SkillOutcome {
                skill_id: skill.id.clone(),
                status: RunStatus::Complete,
                grade: score.grade,
                win_rate: score.win_rate,
                trial_count: run.trial_count,
                errored_trials: run.errored_trials,
                detail: Some("already evaluated; use --force to re-run".into()),
            };
        }

        if opts.force
            && let Err(err) = self.store.clear_skill(&skill.id)
        {
            return self.errored_outcome(skill, format!("failed to clear evidence: {err}"));
        }

        if let Err(err) = validate_content(&skill.id, &skill.content, self.config.trials.max_content_bytes)
        {
            tracing::warn!(skill = skill.id.as_str(), "skipping: {err}");
            return self.errored_outcome(skill, err.to_string());
        }

        let mut run = EvaluationRun::start(&skill.id);
        if let Err(err) = self
            .store
            .save_skill_content(&skill.id, &skill.content)
            .and_then(|()| self.store.save_run(&run))
        {
            return self.errored_outcome(skill, format!("evidence store unavailable: {err}"));
        }

        let prompt_set = match self.obtain_prompts(skill, opts.force).await {
            Ok(prompt_set) => prompt_set,
            Err(err) => {
                run.error_log.push(err.to_string());
                run.finish(RunStatus::Errored);
                let _ = self.store.save_run(&run);
                return self.outcome_from_run(skill, &run, None, Some(err.to_string()));
            }
        };

        // Security runs concurrently with the trial set; both gate on the
        // same process-wide limiter.
        let (trial_errors, security_error) = tokio::join!(
            self.run_missing_trials(skill, &prompt_set, run_seed),
            self.ensure_security(skill, opts.skip_security),
        );

        let trials = self.store.load_trials(&skill.id);
        let expected = prompt_set.usable();
        run.trial_count = trials.len() as u32;
        run.errored_trials = trial_errors.len() as u32;
        run.error_log.extend(trial_errors);
        if let Some(err) = &security_error {
            run.error_log.push(err.clone());
        }

        let errored_fraction = if expected == 0 {
            1.0
        } else {
            f64::from(run.errored_trials) / expected as f64
        };
        let inconclusive = trials.is_empty() || errored_fraction > self.config.trials.max_errored_fraction;

        let score = if inconclusive {
            None
        } else {
            let score = scorer::score(&skill.id, &trials, &self.config.pricing, Utc::now());
            if let Err(err) = self.store.save_score(&score) {
                run.error_log.push(format!("failed to persist score: {err}"));
            }
            Some(score)
        };

        let security = self.store.load_security(&skill.id);
        let status = if inconclusive {
            RunStatus::Partial
        } else if trials.len() == expected && security.is_some() {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        };
        run.finish(status);

        let summary = scorer::summarize(
            &run,
            prompt_set.usable() as u32,
            score.as_ref(),
            security.as_ref(),
            Utc::now(),
        )
        .from_metadata(&skill.metadata);
        if let Err(err) = self
            .store
            .save_summary(&summary)
            .and_then(|()| self.store.save_run(&run))
        {
            tracing::error!(skill = skill.id.as_str(), "failed to persist summary: {err}");
        }

        tracing::info!(
            skill = skill.id.as_str(),
            status = %run.status,
            trials = run.trial_count,
            errored = run.errored_trials,
            "skill evaluation finished"
        );
        self.outcome_from_run(skill, &run, score.as_ref(), None)
    }

    /// Reuse cached prompts when the content hash matches; otherwise pay
    /// for one generation call and persist the result.
    async fn obtain_prompts(&self, skill: &SkillRecord, force: bool) -> Result<PromptSet, EvalError> {
        let hash = content_hash(&skill.content);
        if !force
            && let Some(cached) = self.store.load_prompt_set(&skill.id)
            && cached.content_hash == hash
        {
            tracing::debug!(skill = skill.id.as_str(), "using cached prompts");
            return Ok(cached);
        }

        let generator = PromptGenerator::new(
            Arc::clone(&self.client),
            Arc::clone(&self.limiter),
            &self.config.models.generation,
            self.config.retry_policy(),
            self.config.prompts.count,
            self.config.prompts.min_usable,
            self.config.prompts.max_tokens,
        );
        let prompt_set = generator.generate(skill).await?;
        self.store.save_prompt_set(&prompt_set)?;
        Ok(prompt_set)
    }

    /// Run every trial whose `(skill_id, prompt_index)` is not yet durably
    /// written. Completed trials are persisted as they finish, so an
    /// aborted run resumes exactly where it stopped. Returns the error
    /// descriptions of trials that exhausted their retries.
    async fn run_missing_trials(
        &self,
        skill: &SkillRecord,
        prompt_set: &PromptSet,
        run_seed: u64,
    ) -> Vec<String> {
        let judge = Arc::new(Judge::new(
            Arc::clone(&self.client),
            Arc::clone(&self.limiter),
            &self.config.models.judge,
            self.config.retry_policy(),
            DEFAULT_JUDGE_CONTEXT,
            self.config.trials.judge_max_tokens,
        ));
        let runner = Arc::new(TrialRunner::new(
            Arc::clone(&self.client),
            Arc::clone(&self.limiter),
            judge,
            &self.config.models.execution,
            self.config.retry_policy(),
            self.config.trials.max_tokens,
            run_seed,
        ));

        let mut join_set = JoinSet::new();
        for (index, prompt) in prompt_set.prompts.iter().enumerate() {
            if self.store.trial_exists(&skill.id, index) {
                tracing::debug!(skill = skill.id.as_str(), index, "trial already recorded");
                continue;
            }
            if self.cancel.is_cancelled() {
                tracing::warn!(skill = skill.id.as_str(), "cancellation requested, not starting further trials");
                break;
            }

            let runner = Arc::clone(&runner);
            let store = self.store.clone();
            let skill = skill.clone();
            let prompt = prompt.clone();
            join_set.spawn(async move {
                match runner.run_trial(&skill, &prompt, index).await {
                    Ok(trial) => match store.save_trial(&trial) {
                        Ok(()) => None,
                        Err(err) => Some(format!("trial {index}: failed to persist: {err}")),
                    },
                    Err(err) => Some(format!("trial {index}: {err}")),
                }
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(None) => {}
                Ok(Some(error)) => {
                    tracing::warn!(skill = skill.id.as_str(), "{error}");
                    errors.push(error);
                }
                Err(err) => errors.push(format!("trial task panicked: {err}")),
            }
        }
        errors.sort();
        errors
    }

    /// Make sure a security record exists: reuse a persisted one, record an
    /// explicit skip, or run the analysis. A failed analysis leaves no
    /// record at all - the skill stays partial until a retry succeeds.
    async fn ensure_security(&self, skill: &SkillRecord, skip: bool) -> Option<String> {
        if let Some(existing) = self.store.load_security(&skill.id) {
            let keep = match (&existing, skip) {
                (SecurityRecord::Analyzed(_), _) => true,
                (SecurityRecord::Skipped { .. }, true) => true,
                (SecurityRecord::Skipped { .. }, false) => false,
            };
            if keep {
                return None;
            }
        }

        if skip {
            let record = SecurityRecord::Skipped {
                skill_id: skill.id.clone(),
                skipped_at: Utc::now(),
            };
            return match self.store.save_security(&skill.id, &record) {
                Ok(()) => None,
                Err(err) => Some(format!("failed to persist security skip: {err}")),
            };
        }

        let analyzer = SecurityAnalyzer::new(
            Arc::clone(&self.client),
            Arc::clone(&self.limiter),
            &self.config.models.security,
            self.config.retry_policy(),
            self.config.prompts.max_tokens,
        );
        match analyzer.analyze(skill).await {
            Ok(assessment) => {
                let record = SecurityRecord::Analyzed(assessment);
                match self.store.save_security(&skill.id, &record) {
                    Ok(()) => None,
                    Err(err) => Some(format!("failed to persist security analysis: {err}")),
                }
            }
            Err(err) => Some(format!("security analysis failed: {err}")),
        }
    }

    /// Rebuild the sorted leaderboard artifact from every persisted
    /// summary. Called after each skill so interruption never loses
    /// previously finished work.
    fn rebuild_leaderboard(&self) {
        let summaries: Vec<SkillSummary> = self.store.load_all_summaries();
        let leaderboard = scorer::build_leaderboard(summaries, Utc::now());
        if let Err(err) = self.store.save_leaderboard(&leaderboard) {
            tracing::error!("failed to write leaderboard: {err}");
        }
    }

    fn errored_outcome(&self, skill: &SkillRecord, detail: String) -> SkillOutcome {
        let mut run = EvaluationRun::start(&skill.id);
        run.error_log.push(detail.clone());
        run.finish(RunStatus::Errored);
        let _ = self.store.save_run(&run);
        SkillOutcome {
            skill_id: skill.id.clone(),
            status: RunStatus::Errored,
            grade: None,
            win_rate: None,
            trial_count: 0,
            errored_trials: 0,
            detail: Some(detail),
        }
    }

    fn outcome_from_run(
        &self,
        skill: &SkillRecord,
        run: &EvaluationRun,
        score: Option<&Score>,
        detail: Option<String>,
    ) -> SkillOutcome {
        SkillOutcome {
            skill_id: skill.id.clone(),
            status: run.status,
            grade: score.and_then(|s| s.grade),
            win_rate: score.and_then(|s| s.win_rate),
            trial_count: run.trial_count,
            errored_trials: run.errored_trials,
            detail: detail.or_else(|| run.error_log.first().cloned()),
        }
    }
}
