use std::time::Duration;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `skillgrade`.
///
/// Each evaluation stage defines its own error variant. The orchestrator
/// matches on these to decide failure isolation: content problems skip a
/// skill, stage errors mark a skill `errored`, and only configuration
/// failures abort the whole run. Binary edges continue to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EvalError {
    // ── Skill content ────────────────────────────────────────────────────
    #[error("content: {0}")]
    Content(#[from] ContentError),

    // ── Prompt generation ────────────────────────────────────────────────
    #[error("generation: {0}")]
    Generation(#[from] GenerationError),

    // ── Judging ─────────────────────────────────────────────────────────
    #[error("judge: {0}")]
    Judge(#[from] JudgeError),

    // ── Security analysis ───────────────────────────────────────────────
    #[error("security: {0}")]
    Security(#[from] SecurityError),

    // ── External model calls ────────────────────────────────────────────
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),

    // ── Evidence persistence ────────────────────────────────────────────
    #[error("evidence: {0}")]
    Evidence(#[from] EvidenceError),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

// ─── Skill content errors ───────────────────────────────────────────────────

/// Invalid skill input. Skips the skill, never the run.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("skill {id} has no skill file")]
    Missing { id: String },

    #[error("skill {id} content is empty")]
    Empty { id: String },

    #[error("skill {id} content is {size} bytes, above the {max} byte limit")]
    TooLarge { id: String, size: usize, max: usize },
}

// ─── Prompt generation errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unparseable prompt output: {0}")]
    Parse(String),

    #[error("{usable} usable prompts after deduplication, floor is {floor}")]
    TooFewPrompts { usable: usize, floor: usize },

    #[error("generation call failed: {0}")]
    Call(#[source] ProviderError),
}

// ─── Judge errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("unparseable verdict output: {0}")]
    Parse(String),

    #[error("verdict {0:?} is not A, B, or TIE")]
    UnknownVerdict(String),

    #[error("judge call failed: {0}")]
    Call(#[source] ProviderError),
}

// ─── Security analysis errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unparseable security output: {0}")]
    Parse(String),

    #[error("security call failed: {0}")]
    Call(#[source] ProviderError),
}

// ─── Provider errors ────────────────────────────────────────────────────────

/// Failures at the external-model boundary. Retry classification is typed
/// here so no caller ever string-matches an error message.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rate-limited")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} request exceeded the {deadline_secs}s deadline")]
    Timeout { provider: String, deadline_secs: u64 },

    #[error("{provider} api error ({status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} authentication failed")]
    Auth { provider: String },

    #[error("{provider} transport error: {message}")]
    Http { provider: String, message: String },

    #[error("{provider} returned no completion text")]
    EmptyResponse { provider: String },

    #[error("{provider} response is missing token usage")]
    MissingUsage { provider: String },
}

impl ProviderError {
    /// Transient failures worth another attempt: rate limits, deadlines,
    /// transport faults, and server-side 5xx (plus 408/429 seen as bodies).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Http { .. } => true,
            Self::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Auth { .. } | Self::EmptyResponse { .. } | Self::MissingUsage { .. } => false,
        }
    }

    /// Server-suggested wait before the next attempt, when one was given.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// ─── Evidence errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt artifact {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// ─── Config errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no API key: set ANTHROPIC_API_KEY or api_key in skillgrade.toml")]
    MissingApiKey,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EvalError>;
