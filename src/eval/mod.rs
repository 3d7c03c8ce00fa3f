pub mod judge;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod rng;
pub mod scorer;
pub mod security;
pub mod trial;
pub mod types;

pub use judge::{BlindPair, DEFAULT_JUDGE_CONTEXT, Judge, JudgeContext, JudgeOutcome};
pub use orchestrator::{Orchestrator, RunOptions, RunSummary, SkillOutcome};
pub use prompts::{PromptGenerator, content_hash};
pub use security::SecurityAnalyzer;
pub use trial::TrialRunner;
pub use types::{
    Difficulty, EvaluationRun, GeneratedPrompt, Grade, Leaderboard, Position, PromptSet,
    RiskCategory, RunStatus, Score, SecurityAssessment, SecurityGrade, SecurityIssue,
    SecurityRecord, Severity, SkillSummary, TokenUsage, Trial, Verdict, VerdictLetter,
    display_grade,
};
