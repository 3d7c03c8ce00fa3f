use crate::skills::SkillMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Prompts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Difficulty {
    Simple,
    Medium,
    Complex,
}

/// One generated end-user request. It never names the skill; it describes a
/// task the skill's capability would naturally serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedPrompt {
    pub text: String,
    pub difficulty: Difficulty,
    pub capability: String,
}

/// The cached prompt set for a skill, keyed by a hash of the skill content.
/// A changed hash or `--force` invalidates the cache; nothing else does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSet {
    pub skill_id: String,
    pub content_hash: String,
    /// How many prompts were requested from the generation model.
    pub requested: usize,
    pub prompts: Vec<GeneratedPrompt>,
    pub model: String,
    pub generated_at: DateTime<Utc>,
    /// Set when fewer than `requested` usable prompts survived
    /// deduplication. The set is never padded to hide this.
    #[serde(default)]
    pub anomaly: Option<String>,
}

impl PromptSet {
    pub fn usable(&self) -> usize {
        self.prompts.len()
    }
}

// ─── Trials ─────────────────────────────────────────────────────────────────

/// Which response the judge saw first. Persisted for audit; the judge only
/// ever sees the bare pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    SkillFirst,
    BaselineFirst,
}

impl Position {
    pub fn from_coin(skill_first: bool) -> Self {
        if skill_first {
            Self::SkillFirst
        } else {
            Self::BaselineFirst
        }
    }

    /// Order a response pair for presentation. Identity is stripped here,
    /// at the call-construction boundary: the result is just two strings.
    pub fn arrange<'a>(self, skill_response: &'a str, baseline_response: &'a str) -> (&'a str, &'a str) {
        match self {
            Self::SkillFirst => (skill_response, baseline_response),
            Self::BaselineFirst => (baseline_response, skill_response),
        }
    }

    /// Map the judge's positional letter back to an origin verdict.
    pub fn translate(self, letter: VerdictLetter) -> Verdict {
        match (self, letter) {
            (_, VerdictLetter::Tie) => Verdict::Tie,
            (Self::SkillFirst, VerdictLetter::A) | (Self::BaselineFirst, VerdictLetter::B) => {
                Verdict::Skill
            }
            (Self::SkillFirst, VerdictLetter::B) | (Self::BaselineFirst, VerdictLetter::A) => {
                Verdict::Baseline
            }
        }
    }
}

/// What the judge returns: a position letter, nothing about origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictLetter {
    A,
    B,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verdict {
    Skill,
    Baseline,
    Tie,
}

/// Token accounting captured from response metadata, per completion side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(self) -> u64 {
        self.input + self.output
    }
}

/// One fully populated paired comparison. Partial trials are never
/// persisted; this struct existing in the store means every field resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub skill_id: String,
    pub prompt_index: usize,
    pub prompt: String,
    pub baseline_response: String,
    pub skill_response: String,
    pub baseline_tokens: TokenUsage,
    pub skill_tokens: TokenUsage,
    pub position: Position,
    pub verdict: Verdict,
    pub reasoning: String,
    pub judge_model: String,
    pub started_at: DateTime<Utc>,
    pub judged_at: DateTime<Utc>,
}

// ─── Security ───────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SecurityGrade {
    Secure,
    Warning,
    Fail,
}

/// The fixed risk categories every skill is analyzed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskCategory {
    DataExfiltration,
    FilesystemAbuse,
    CredentialExposure,
    CodeInjection,
    MaliciousDependencies,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub category: RiskCategory,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAssessment {
    pub skill_id: String,
    pub grade: SecurityGrade,
    pub issues: Vec<SecurityIssue>,
    pub analysis: String,
    pub model: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Persisted security evidence. A skipped pass is recorded explicitly; it
/// is neither absence nor a clean `secure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SecurityRecord {
    Analyzed(SecurityAssessment),
    Skipped {
        skill_id: String,
        skipped_at: DateTime<Utc>,
    },
}

impl SecurityRecord {
    pub fn grade(&self) -> Option<SecurityGrade> {
        match self {
            Self::Analyzed(assessment) => Some(assessment.grade),
            Self::Skipped { .. } => None,
        }
    }

    pub fn issue_count(&self) -> Option<u32> {
        match self {
            Self::Analyzed(assessment) => Some(assessment.issues.len() as u32),
            Self::Skipped { .. } => None,
        }
    }
}

// ─── Scores ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Band boundaries are inclusive on the lower bound: 80.0 is an A,
    /// 79.99 a B, 60.0 a B, 19.99 an F.
    pub fn from_win_rate(win_rate_percent: f64) -> Self {
        if win_rate_percent >= 80.0 {
            Self::A
        } else if win_rate_percent >= 60.0 {
            Self::B
        } else if win_rate_percent >= 40.0 {
            Self::C
        } else if win_rate_percent >= 20.0 {
            Self::D
        } else {
            Self::F
        }
    }
}

/// Grade text for operators: a missing grade means "not enough data",
/// never an F.
pub fn display_grade(grade: Option<Grade>) -> String {
    match grade {
        Some(grade) => grade.to_string(),
        None => "not enough data".to_string(),
    }
}

/// Derived quality/cost aggregate. Never hand-edited; always
/// reconstructable from the persisted trials plus pricing constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub skill_id: String,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    /// Percent of decisive trials won by the skill side. `None` when no
    /// trial was decisive - distinct from a genuine 0.
    pub win_rate: Option<f64>,
    pub grade: Option<Grade>,
    /// Mean output tokens of skill-side completions.
    pub avg_tokens_skill: f64,
    /// Mean output tokens of baseline completions.
    pub avg_tokens_baseline: f64,
    pub cost_per_use: f64,
    pub baseline_cost: f64,
    pub computed_at: DateTime<Utc>,
}

// ─── Runs ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Partial,
    Complete,
    Errored,
}

/// Orchestrator-owned record of one skill's evaluation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub skill_id: String,
    pub run_id: String,
    pub status: RunStatus,
    pub trial_count: u32,
    pub errored_trials: u32,
    pub error_log: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl EvaluationRun {
    pub fn start(skill_id: impl Into<String>) -> Self {
        Self {
            skill_id: skill_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Pending,
            trial_count: 0,
            errored_trials: 0,
            error_log: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

// ─── Summaries / leaderboard ────────────────────────────────────────────────

/// Per-skill rollup merging score, security, and trial counts. This is the
/// record the leaderboard lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub skill_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    pub status: RunStatus,
    pub grade: Option<Grade>,
    pub win_rate: Option<f64>,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub security_grade: Option<SecurityGrade>,
    pub security_issues: Option<u32>,
    pub prompt_count: u32,
    pub trial_count: u32,
    pub errored_trials: u32,
    pub cost_per_use: Option<f64>,
    pub baseline_cost: Option<f64>,
    pub evaluated_at: DateTime<Utc>,
}

impl SkillSummary {
    pub fn from_metadata(mut self, metadata: &SkillMetadata) -> Self {
        self.name = metadata.name.clone();
        self.source_url = metadata.source_url.clone();
        self
    }
}

/// The aggregated artifact the website reads. Rebuilt after every skill so
/// interruption never loses finished work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
    pub generated_at: DateTime<Utc>,
    pub total_skills: u32,
    pub ratings: Vec<SkillSummary>,
}
