use super::parse::extract_json_payload;
use super::types::{Difficulty, GeneratedPrompt, PromptSet};
use crate::error::{EvalError, GenerationError};
use crate::provider::{CompletionRequest, ModelClient, RateLimiter, RetryPolicy, with_retry};
use crate::skills::SkillRecord;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Hash that keys the prompt cache. A skill's prompts are regenerated only
/// when this changes or the caller forces invalidation.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct RawPrompt {
    prompt: String,
    difficulty: Difficulty,
    capability_tested: String,
}

/// Derives a fixed-size set of realistic task prompts from skill content
/// with a single generation-model call.
pub struct PromptGenerator {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    model: String,
    retry: RetryPolicy,
    requested: usize,
    min_usable: usize,
    max_tokens: u32,
}

impl PromptGenerator {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        model: impl Into<String>,
        retry: RetryPolicy,
        requested: usize,
        min_usable: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            limiter,
            model: model.into(),
            retry,
            requested,
            min_usable,
            max_tokens,
        }
    }

    pub async fn generate(&self, skill: &SkillRecord) -> Result<PromptSet, EvalError> {
        let request = CompletionRequest::new(&self.model, "Generate the prompts as specified.")
            .with_system(build_generation_prompt(&skill.content, self.requested))
            .with_max_tokens(self.max_tokens);

        let request = &request;
        let completion = with_retry(&self.retry, "prompt generation", || async move {
            let _permit = self.limiter.acquire().await;
            self.client.complete(request).await
        })
        .await
        .map_err(GenerationError::Call)?;

        let mut prompts = parse_prompts(&completion.text)?;
        prompts.truncate(self.requested);
        let parsed = prompts.len();
        let prompts = dedup_prompts(prompts);
        let usable = prompts.len();

        if usable < self.min_usable {
            return Err(GenerationError::TooFewPrompts {
                usable,
                floor: self.min_usable,
            }
            .into());
        }

        let anomaly = (usable < self.requested).then(|| {
            format!(
                "generation returned {usable} usable prompts of {} requested ({parsed} before deduplication)",
                self.requested
            )
        });
        if let Some(anomaly) = &anomaly {
            tracing::warn!(skill = skill.id.as_str(), "{anomaly}");
        }

        Ok(PromptSet {
            skill_id: skill.id.clone(),
            content_hash: content_hash(&skill.content),
            requested: self.requested,
            prompts,
            model: completion.model,
            generated_at: Utc::now(),
            anomaly,
        })
    }
}

fn build_generation_prompt(skill_content: &str, count: usize) -> String {
    format!(
        r#"You are an expert at creating realistic user prompts for testing AI capabilities.

Given the following skill description, generate exactly {count} diverse prompts that a real user might ask, which would naturally benefit from the capabilities described in this skill.

SKILL CONTENT:
---
{skill_content}
---

REQUIREMENTS:
1. Generate exactly {count} prompts
2. Make prompts sound like realistic user requests (natural language, not formal)
3. Do NOT mention the skill name or that a skill exists - pretend you're a user who just has a task to do
4. Include a mix of difficulty levels:
   - "simple": basic, single-step tasks
   - "medium": multi-step or more nuanced tasks
   - "complex": advanced, multi-part tasks requiring deep knowledge
5. Each prompt should test a specific capability from the skill
6. Prompts should be diverse - test different capabilities

RESPONSE FORMAT:
Return a JSON array with exactly {count} objects, each containing:
- "prompt": the user's request (string)
- "difficulty": one of "simple", "medium", or "complex"
- "capability_tested": brief description of which capability this tests

Return ONLY the JSON array, no additional text."#
    )
}

fn parse_prompts(text: &str) -> Result<Vec<GeneratedPrompt>, GenerationError> {
    let payload = extract_json_payload(text)
        .ok_or_else(|| GenerationError::Parse("no JSON array in generation output".into()))?;
    let raw: Vec<RawPrompt> =
        serde_json::from_str(payload).map_err(|e| GenerationError::Parse(e.to_string()))?;

    if raw.is_empty() {
        return Err(GenerationError::Parse("empty prompt array".into()));
    }

    Ok(raw
        .into_iter()
        .filter(|p| !p.prompt.trim().is_empty())
        .map(|p| GeneratedPrompt {
            text: p.prompt.trim().to_string(),
            difficulty: p.difficulty,
            capability: p.capability_tested,
        })
        .collect())
}

/// Case-insensitive dedup on the prompt text, preserving first occurrence.
fn dedup_prompts(prompts: Vec<GeneratedPrompt>) -> Vec<GeneratedPrompt> {
    let mut seen = HashSet::new();
    prompts
        .into_iter()
        .filter(|p| seen.insert(p.text.to_lowercase()))
        .collect()
}
