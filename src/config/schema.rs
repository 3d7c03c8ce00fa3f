use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path the config was loaded from - computed, not serialized.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// API key; falls back to the `ANTHROPIC_API_KEY` environment variable.
    pub api_key: Option<String>,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub trials: TrialsConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub pricing: PricingConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

// ── Model selection ──────────────────────────────────────────────

/// One execution/generation model and one judging model per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Model that produces baseline and skill-augmented completions.
    #[serde(default = "default_execution_model")]
    pub execution: String,
    /// Model that generates evaluation prompts from skill content.
    #[serde(default = "default_generation_model")]
    pub generation: String,
    /// Model that judges blinded response pairs.
    #[serde(default = "default_judge_model")]
    pub judge: String,
    /// Model that analyzes skill content for security risks.
    #[serde(default = "default_judge_model")]
    pub security: String,
}

fn default_execution_model() -> String {
    "claude-haiku-4-20250514".into()
}

fn default_generation_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_judge_model() -> String {
    "claude-sonnet-4-20250514".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            execution: default_execution_model(),
            generation: default_generation_model(),
            judge: default_judge_model(),
            security: default_judge_model(),
        }
    }
}

// ── Prompt generation ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Prompts requested per skill.
    #[serde(default = "default_prompt_count")]
    pub count: usize,
    /// Floor of usable prompts after deduplication; below this the skill
    /// fails with a generation error instead of running a thin trial set.
    #[serde(default = "default_min_usable")]
    pub min_usable: usize,
    /// Token ceiling for the generation call.
    #[serde(default = "default_call_max_tokens")]
    pub max_tokens: u32,
}

fn default_prompt_count() -> usize {
    10
}

fn default_min_usable() -> usize {
    6
}

fn default_call_max_tokens() -> u32 {
    4096
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            count: default_prompt_count(),
            min_usable: default_min_usable(),
            max_tokens: default_call_max_tokens(),
        }
    }
}

// ── Trials ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialsConfig {
    /// Token ceiling for each completion call.
    #[serde(default = "default_call_max_tokens")]
    pub max_tokens: u32,
    /// Token ceiling for the judge call.
    #[serde(default = "default_judge_max_tokens")]
    pub judge_max_tokens: u32,
    /// Above this fraction of errored trials the skill is marked partial
    /// and not scored.
    #[serde(default = "default_max_errored_fraction")]
    pub max_errored_fraction: f64,
    /// Skill content above this size is rejected with a content error.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

fn default_judge_max_tokens() -> u32 {
    1024
}

fn default_max_errored_fraction() -> f64 {
    0.3
}

fn default_max_content_bytes() -> usize {
    256 * 1024
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_call_max_tokens(),
            judge_max_tokens: default_judge_max_tokens(),
            max_errored_fraction: default_max_errored_fraction(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

// ── Concurrency / rate limits ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Max concurrent calls to the model API, process-wide.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Max calls per minute, process-wide. Zero disables the window.
    #[serde(default = "default_calls_per_minute")]
    pub calls_per_minute: u32,
    /// Max skills evaluated in parallel.
    #[serde(default = "default_skill_concurrency")]
    pub skill_concurrency: usize,
    /// Deadline for each external call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_calls_per_minute() -> u32 {
    50
}

fn default_skill_concurrency() -> usize {
    2
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            calls_per_minute: default_calls_per_minute(),
            skill_concurrency: default_skill_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Retry / backoff ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

// ── Pricing ──────────────────────────────────────────────────────

/// Pricing constants for cost estimates. Both completion sides run on the
/// same execution model, so one constant covers skill and baseline costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// USD per output token of the execution model.
    #[serde(default = "default_price_per_token")]
    pub price_per_token: f64,
    /// Decimal places kept when rounding cost figures.
    #[serde(default = "default_cost_precision")]
    pub cost_precision: u32,
}

fn default_price_per_token() -> f64 {
    0.000_000_416_7
}

fn default_cost_precision() -> u32 {
    6
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_per_token: default_price_per_token(),
            cost_precision: default_cost_precision(),
        }
    }
}

// ── Paths ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of skill folders, each holding a SKILL.md.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,
    /// Root of the evidence store.
    #[serde(default = "default_evaluations_dir")]
    pub evaluations_dir: PathBuf,
    /// Aggregated leaderboard artifact consumed by the website.
    #[serde(default = "default_leaderboard_path")]
    pub leaderboard: PathBuf,
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("data/skills")
}

fn default_evaluations_dir() -> PathBuf {
    PathBuf::from("data/evaluations")
}

fn default_leaderboard_path() -> PathBuf {
    PathBuf::from("data/leaderboard.json")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            skills_dir: default_skills_dir(),
            evaluations_dir: default_evaluations_dir(),
            leaderboard: default_leaderboard_path(),
        }
    }
}

// ── Loading / validation ─────────────────────────────────────────

impl Config {
    /// Load from an explicit path, else `./skillgrade.toml`, else the
    /// user config directory; missing files yield defaults.
    pub fn load_or_init(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates: Vec<PathBuf> = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut paths = vec![PathBuf::from("skillgrade.toml")];
                if let Some(dirs) = ProjectDirs::from("", "", "skillgrade") {
                    paths.push(dirs.config_dir().join("config.toml"));
                }
                paths
            }
        };

        for path in candidates {
            if path.exists() {
                let raw = fs::read_to_string(&path)?;
                let mut config: Config = toml::from_str(&raw)
                    .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
                config.config_path = Some(path);
                config.validate()?;
                return Ok(config);
            }
            if explicit.is_some() {
                return Err(ConfigError::Load(format!("{} not found", path.display())));
            }
        }

        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompts.count == 0 {
            return Err(ConfigError::Validation("prompts.count must be > 0".into()));
        }
        if self.prompts.min_usable > self.prompts.count {
            return Err(ConfigError::Validation(
                "prompts.min_usable cannot exceed prompts.count".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.trials.max_errored_fraction) {
            return Err(ConfigError::Validation(
                "trials.max_errored_fraction must be within 0..=1".into(),
            ));
        }
        if self.pricing.price_per_token <= 0.0 {
            return Err(ConfigError::Validation(
                "pricing.price_per_token must be positive".into(),
            ));
        }
        if self.limits.max_in_flight == 0 || self.limits.skill_concurrency == 0 {
            return Err(ConfigError::Validation(
                "limits.max_in_flight and limits.skill_concurrency must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// The only configuration failure that is fatal to a whole run.
    pub fn resolved_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_deref() {
            let key = key.trim();
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ConfigError::MissingApiKey),
        }
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.limits.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> crate::provider::RetryPolicy {
        crate::provider::RetryPolicy::new(
            self.retry.max_attempts,
            std::time::Duration::from_millis(self.retry.base_backoff_ms),
            std::time::Duration::from_millis(self.retry.max_backoff_ms),
        )
    }

    pub fn calls_per_minute(&self) -> Option<u32> {
        (self.limits.calls_per_minute > 0).then_some(self.limits.calls_per_minute)
    }
}
