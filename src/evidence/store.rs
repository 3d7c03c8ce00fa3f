use crate::error::EvidenceError;
use crate::eval::types::{EvaluationRun, Leaderboard, PromptSet, Score, SecurityRecord, SkillSummary, Trial};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Durable, skill-addressed record of every prompt, trial, security
/// assessment, and score. Layout per skill:
///
/// ```text
/// {evaluations}/{skill_id}/
/// ├── skill.md          copy of the content evaluated
/// ├── prompts.json      generated prompts, keyed by content hash
/// ├── trials/{n}.json   one fully populated trial per prompt index
/// ├── security.json     analysis result or explicit skip marker
/// ├── score.json        derived aggregate
/// ├── summary.json      score + security + counts rollup
/// └── run.json          orchestrator lifecycle record
/// ```
///
/// Every write goes through a temp file and rename, so an artifact is
/// either fully present or absent - the property resumability leans on.
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    evaluations_dir: PathBuf,
    leaderboard_path: PathBuf,
}

impl EvidenceStore {
    pub fn new(evaluations_dir: impl Into<PathBuf>, leaderboard_path: impl Into<PathBuf>) -> Self {
        Self {
            evaluations_dir: evaluations_dir.into(),
            leaderboard_path: leaderboard_path.into(),
        }
    }

    fn skill_dir(&self, skill_id: &str) -> PathBuf {
        self.evaluations_dir.join(skill_id)
    }

    fn trial_path(&self, skill_id: &str, prompt_index: usize) -> PathBuf {
        self.skill_dir(skill_id)
            .join("trials")
            .join(format!("{prompt_index}.json"))
    }

    // ── Skill content ────────────────────────────────────────────────────

    pub fn save_skill_content(&self, skill_id: &str, content: &str) -> Result<(), EvidenceError> {
        let dir = self.skill_dir(skill_id);
        fs::create_dir_all(&dir)?;
        atomic_write(&dir.join("skill.md"), content.as_bytes())
    }

    // ── Prompts ──────────────────────────────────────────────────────────

    pub fn save_prompt_set(&self, prompts: &PromptSet) -> Result<(), EvidenceError> {
        self.write_json(&self.skill_dir(&prompts.skill_id).join("prompts.json"), prompts)
    }

    pub fn load_prompt_set(&self, skill_id: &str) -> Option<PromptSet> {
        self.read_json(&self.skill_dir(skill_id).join("prompts.json"))
    }

    // ── Trials ───────────────────────────────────────────────────────────

    pub fn save_trial(&self, trial: &Trial) -> Result<(), EvidenceError> {
        self.write_json(&self.trial_path(&trial.skill_id, trial.prompt_index), trial)
    }

    /// A trial exists only if it parses fully; a corrupt file counts as
    /// absent and will be re-run.
    pub fn load_trial(&self, skill_id: &str, prompt_index: usize) -> Option<Trial> {
        self.read_json(&self.trial_path(skill_id, prompt_index))
    }

    pub fn trial_exists(&self, skill_id: &str, prompt_index: usize) -> bool {
        self.load_trial(skill_id, prompt_index).is_some()
    }

    /// All persisted trials for a skill, ordered by prompt index.
    pub fn load_trials(&self, skill_id: &str) -> Vec<Trial> {
        let trials_dir = self.skill_dir(skill_id).join("trials");
        let Ok(entries) = fs::read_dir(&trials_dir) else {
            return Vec::new();
        };

        let mut trials: Vec<Trial> = entries
            .flatten()
            .filter_map(|entry| self.read_json(&entry.path()))
            .collect();
        trials.sort_by_key(|t| t.prompt_index);
        trials
    }

    // ── Security / score / summary / run ─────────────────────────────────

    pub fn save_security(&self, skill_id: &str, record: &SecurityRecord) -> Result<(), EvidenceError> {
        self.write_json(&self.skill_dir(skill_id).join("security.json"), record)
    }

    pub fn load_security(&self, skill_id: &str) -> Option<SecurityRecord> {
        self.read_json(&self.skill_dir(skill_id).join("security.json"))
    }

    pub fn save_score(&self, score: &Score) -> Result<(), EvidenceError> {
        self.write_json(&self.skill_dir(&score.skill_id).join("score.json"), score)
    }

    pub fn load_score(&self, skill_id: &str) -> Option<Score> {
        self.read_json(&self.skill_dir(skill_id).join("score.json"))
    }

    pub fn save_summary(&self, summary: &SkillSummary) -> Result<(), EvidenceError> {
        self.write_json(&self.skill_dir(&summary.skill_id).join("summary.json"), summary)
    }

    pub fn load_summary(&self, skill_id: &str) -> Option<SkillSummary> {
        self.read_json(&self.skill_dir(skill_id).join("summary.json"))
    }

    pub fn save_run(&self, run: &EvaluationRun) -> Result<(), EvidenceError> {
        self.write_json(&self.skill_dir(&run.skill_id).join("run.json"), run)
    }

    pub fn load_run(&self, skill_id: &str) -> Option<EvaluationRun> {
        self.read_json(&self.skill_dir(skill_id).join("run.json"))
    }

    /// Raw score artifact bytes, for idempotence checks.
    pub fn score_bytes(&self, skill_id: &str) -> Option<Vec<u8>> {
        fs::read(self.skill_dir(skill_id).join("score.json")).ok()
    }

    // ── Leaderboard ──────────────────────────────────────────────────────

    /// Summaries of every skill with evidence, for leaderboard rebuilds.
    pub fn load_all_summaries(&self) -> Vec<SkillSummary> {
        let Ok(entries) = fs::read_dir(&self.evaluations_dir) else {
            return Vec::new();
        };
        let mut summaries: Vec<SkillSummary> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| self.read_json(&entry.path().join("summary.json")))
            .collect();
        summaries.sort_by(|a, b| a.skill_id.cmp(&b.skill_id));
        summaries
    }

    pub fn save_leaderboard(&self, leaderboard: &Leaderboard) -> Result<(), EvidenceError> {
        self.write_json(&self.leaderboard_path, leaderboard)
    }

    pub fn load_leaderboard(&self) -> Option<Leaderboard> {
        self.read_json(&self.leaderboard_path)
    }

    // ── Invalidation ─────────────────────────────────────────────────────

    /// Drop all evidence for one skill (`--force`).
    pub fn clear_skill(&self, skill_id: &str) -> Result<(), EvidenceError> {
        let dir = self.skill_dir(skill_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    // ── JSON plumbing ────────────────────────────────────────────────────

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), EvidenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| EvidenceError::Serialize {
            path: path.display().to_string(),
            source: e,
        })?;
        atomic_write(path, &bytes)
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(path = %path.display(), "treating corrupt artifact as absent: {err}");
                None
            }
        }
    }
}

/// Write to a uniquely named temp file in the target directory, then
/// rename over the destination. Concurrent writers cannot collide on the
/// temp name, and readers never observe a half-written artifact.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), EvidenceError> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
