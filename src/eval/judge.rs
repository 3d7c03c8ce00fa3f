use super::parse::extract_json_payload;
use super::types::{Position, VerdictLetter};
use crate::error::{EvalError, JudgeError};
use crate::provider::{CompletionRequest, ModelClient, RateLimiter, RetryPolicy, with_retry};
use serde::Deserialize;
use std::sync::Arc;

/// Versioned preamble describing the real capabilities of the platform the
/// skills target. Injected into every judging call so platform-specific
/// output is not penalized as implausible; versioned so its content is
/// diffable across runs.
#[derive(Debug, Clone, Copy)]
pub struct JudgeContext {
    pub version: &'static str,
    pub text: &'static str,
}

pub const DEFAULT_JUDGE_CONTEXT: JudgeContext = JudgeContext {
    version: "2025-08-01",
    text: "IMPORTANT CONTEXT:\n\
These skills are designed for users of a CLI coding assistant with features including:\n\
- Hooks that run before and after tool use\n\
- Custom slash commands\n\
- SKILL.md files for specialized capabilities\n\
- Rules for validation and automation\n\
- Custom agents\n\n\
A response that provides assistant-specific configuration (hooks, rules,\n\
SKILL.md files) is VALUABLE and REAL, not fictional. Judge based on value\n\
to users of the assistant.",
};

/// A blinded response pair. Built only through [`BlindPair::arrange`], so
/// by construction it carries position letters and nothing about which
/// side came from the skill.
#[derive(Debug, Clone, Copy)]
pub struct BlindPair<'a> {
    pub first: &'a str,
    pub second: &'a str,
}

impl<'a> BlindPair<'a> {
    pub fn arrange(
        position: Position,
        skill_response: &'a str,
        baseline_response: &'a str,
    ) -> Self {
        let (first, second) = position.arrange(skill_response, baseline_response);
        Self { first, second }
    }
}

/// The judge's raw output for one trial, before translation back to an
/// origin verdict.
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    pub letter: VerdictLetter,
    pub reasoning: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    verdict: String,
    #[serde(default)]
    reasoning: String,
}

/// Black-box comparative scorer. Called once per trial; not required to be
/// deterministic, but every invocation's full output is persisted.
pub struct Judge {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    model: String,
    retry: RetryPolicy,
    context: JudgeContext,
    max_tokens: u32,
}

impl Judge {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        model: impl Into<String>,
        retry: RetryPolicy,
        context: JudgeContext,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            limiter,
            model: model.into(),
            retry,
            context,
            max_tokens,
        }
    }

    pub async fn judge(
        &self,
        user_prompt: &str,
        pair: BlindPair<'_>,
    ) -> Result<JudgeOutcome, EvalError> {
        let request = CompletionRequest::new(
            &self.model,
            build_judge_prompt(&self.context, user_prompt, pair),
        )
        .with_max_tokens(self.max_tokens);

        let request = &request;
        let completion = with_retry(&self.retry, "judge", || async move {
            let _permit = self.limiter.acquire().await;
            self.client.complete(request).await
        })
        .await
        .map_err(JudgeError::Call)?;

        let (letter, reasoning) = parse_verdict(&completion.text)?;
        Ok(JudgeOutcome {
            letter,
            reasoning,
            model: completion.model,
        })
    }
}

fn build_judge_prompt(context: &JudgeContext, user_prompt: &str, pair: BlindPair<'_>) -> String {
    format!(
        r#"{context}

You are an expert judge evaluating two AI assistant responses to a user's request.
Your job is to determine which response is more helpful, accurate, and valuable to the user.

USER'S REQUEST:
{user_prompt}

---

RESPONSE A:
{first}

---

RESPONSE B:
{second}

---

EVALUATION CRITERIA:
1. Helpfulness: which response better addresses the user's needs?
2. Accuracy: which response is more correct and reliable?
3. Completeness: which response provides more comprehensive guidance?
4. Practicality: which response is more actionable and useful?

INSTRUCTIONS:
Compare the two responses and determine which is better overall.
Return your judgment as JSON with exactly this format:

{{"verdict": "A" or "B" or "TIE", "reasoning": "Your explanation here"}}

If Response A is clearly better, verdict is "A".
If Response B is clearly better, verdict is "B".
If they are roughly equal in quality, verdict is "TIE".

Return ONLY the JSON, no additional text."#,
        context = context.text,
        first = pair.first,
        second = pair.second,
    )
}

fn parse_verdict(text: &str) -> Result<(VerdictLetter, String), JudgeError> {
    let payload = extract_json_payload(text)
        .ok_or_else(|| JudgeError::Parse("no JSON object in judge output".into()))?;
    let raw: RawVerdict =
        serde_json::from_str(payload).map_err(|e| JudgeError::Parse(e.to_string()))?;

    let letter = match raw.verdict.trim().to_ascii_uppercase().as_str() {
        "A" => VerdictLetter::A,
        "B" => VerdictLetter::B,
        "TIE" => VerdictLetter::Tie,
        other => return Err(JudgeError::UnknownVerdict(other.to_string())),
    };

    Ok((letter, raw.reasoning))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blind_pair_presents_first_position_as_a() {
        let pair = BlindPair::arrange(Position::BaselineFirst, "skill out", "baseline out");
        assert_eq!(pair.first, "baseline out");
        assert_eq!(pair.second, "skill out");
    }

    #[test]
    fn judge_payload_carries_no_origin_markers() {
        let pair = BlindPair::arrange(Position::SkillFirst, "rich answer", "plain answer");
        let prompt = build_judge_prompt(&DEFAULT_JUDGE_CONTEXT, "merge my PDFs", pair);

        assert!(prompt.contains("RESPONSE A:\nrich answer"));
        assert!(prompt.contains("RESPONSE B:\nplain answer"));
        // The words "skill" / "baseline" only appear as platform context,
        // never attached to either response.
        let a_section = prompt.split("RESPONSE A:").nth(1).unwrap();
        assert!(!a_section.to_lowercase().contains("baseline"));
        assert!(!a_section.contains("skill-augmented"));
    }

    #[test]
    fn judge_payload_includes_versioned_context() {
        let pair = BlindPair::arrange(Position::SkillFirst, "x", "y");
        let prompt = build_judge_prompt(&DEFAULT_JUDGE_CONTEXT, "task", pair);
        assert!(prompt.starts_with(DEFAULT_JUDGE_CONTEXT.text));
    }

    #[test]
    fn parses_plain_and_fenced_verdicts() {
        let (letter, reasoning) =
            parse_verdict(r#"{"verdict": "A", "reasoning": "more complete"}"#).unwrap();
        assert_eq!(letter, VerdictLetter::A);
        assert_eq!(reasoning, "more complete");

        let (letter, _) =
            parse_verdict("```json\n{\"verdict\": \"tie\", \"reasoning\": \"equal\"}\n```")
                .unwrap();
        assert_eq!(letter, VerdictLetter::Tie);
    }

    #[test]
    fn unknown_verdict_is_rejected() {
        let err = parse_verdict(r#"{"verdict": "C", "reasoning": "?"}"#).unwrap_err();
        assert!(matches!(err, JudgeError::UnknownVerdict(_)));
    }

    #[test]
    fn missing_json_is_a_parse_error() {
        let err = parse_verdict("Response A is better.").unwrap_err();
        assert!(matches!(err, JudgeError::Parse(_)));
    }
}
