use super::judge::{BlindPair, Judge};
use super::rng::position_for_trial;
use super::types::{GeneratedPrompt, TokenUsage, Trial};
use crate::error::EvalError;
use crate::provider::{Completion, CompletionRequest, ModelClient, RateLimiter, RetryPolicy, with_retry};
use crate::skills::SkillRecord;
use chrono::Utc;
use std::sync::Arc;

/// Runs one paired comparison per prompt: a baseline completion and a
/// skill-augmented completion, requested independently, then a blinded
/// judgment over the randomized pair.
pub struct TrialRunner {
    client: Arc<dyn ModelClient>,
    limiter: Arc<RateLimiter>,
    judge: Arc<Judge>,
    execution_model: String,
    retry: RetryPolicy,
    max_tokens: u32,
    run_seed: u64,
}

impl TrialRunner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        limiter: Arc<RateLimiter>,
        judge: Arc<Judge>,
        execution_model: impl Into<String>,
        retry: RetryPolicy,
        max_tokens: u32,
        run_seed: u64,
    ) -> Self {
        Self {
            client,
            limiter,
            judge,
            execution_model: execution_model.into(),
            retry,
            max_tokens,
            run_seed,
        }
    }

    /// Either returns a fully populated trial or an error; a failed side
    /// is never recorded as a tie or a loss.
    pub async fn run_trial(
        &self,
        skill: &SkillRecord,
        prompt: &GeneratedPrompt,
        prompt_index: usize,
    ) -> Result<Trial, EvalError> {
        let started_at = Utc::now();

        let baseline_request =
            CompletionRequest::new(&self.execution_model, &prompt.text).with_max_tokens(self.max_tokens);
        let skill_request = baseline_request.clone().with_system(&skill.content);

        // The two completions share no conversation state; each carries
        // its own retry budget so a fault in one cannot corrupt the
        // accounting of the other.
        let (baseline, augmented) = futures_util::future::join(
            self.completion("baseline completion", &baseline_request),
            self.completion("skill completion", &skill_request),
        )
        .await;
        let baseline = baseline?;
        let augmented = augmented?;

        let position = position_for_trial(self.run_seed, &skill.id, prompt_index);
        let pair = BlindPair::arrange(position, &augmented.text, &baseline.text);
        let outcome = self.judge.judge(&prompt.text, pair).await?;
        let verdict = position.translate(outcome.letter);

        Ok(Trial {
            skill_id: skill.id.clone(),
            prompt_index,
            prompt: prompt.text.clone(),
            baseline_response: baseline.text,
            skill_response: augmented.text,
            baseline_tokens: TokenUsage {
                input: baseline.input_tokens,
                output: baseline.output_tokens,
            },
            skill_tokens: TokenUsage {
                input: augmented.input_tokens,
                output: augmented.output_tokens,
            },
            position,
            verdict,
            reasoning: outcome.reasoning,
            judge_model: outcome.model,
            started_at,
            judged_at: Utc::now(),
        })
    }

    async fn completion(
        &self,
        what: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, EvalError> {
        with_retry(&self.retry, what, || async move {
            let _permit = self.limiter.acquire().await;
            self.client.complete(request).await
        })
        .await
        .map_err(EvalError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::eval::judge::DEFAULT_JUDGE_CONTEXT;
    use crate::eval::types::Difficulty;
    use crate::skills::SkillMetadata;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct StubClient {
        calls: Mutex<Vec<CompletionRequest>>,
        respond: Box<dyn Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync>,
    }

    impl StubClient {
        fn new(
            respond: impl Fn(&CompletionRequest) -> Result<Completion, ProviderError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ModelClient for StubClient {
        fn name(&self) -> &str {
            "stub"
        }

        fn complete<'a>(
            &'a self,
            request: &'a CompletionRequest,
        ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(request.clone());
                (self.respond)(request)
            })
        }
    }

    fn completion(text: &str, input: u64, output: u64) -> Completion {
        Completion {
            text: text.into(),
            input_tokens: input,
            output_tokens: output,
            model: "exec-model".into(),
        }
    }

    fn skill() -> SkillRecord {
        SkillRecord {
            id: "pdf".into(),
            content: "# PDF skill content".into(),
            metadata: SkillMetadata::default(),
        }
    }

    fn prompt() -> GeneratedPrompt {
        GeneratedPrompt {
            text: "merge my pdf files".into(),
            difficulty: Difficulty::Simple,
            capability: "merge".into(),
        }
    }

    fn runner(exec: Arc<StubClient>, judge_client: Arc<StubClient>, seed: u64) -> TrialRunner {
        let limiter = Arc::new(RateLimiter::unlimited());
        let judge = Arc::new(Judge::new(
            judge_client,
            Arc::clone(&limiter),
            "judge-model",
            RetryPolicy::default(),
            DEFAULT_JUDGE_CONTEXT,
            1024,
        ));
        TrialRunner::new(
            exec,
            limiter,
            judge,
            "exec-model",
            RetryPolicy::default(),
            4096,
            seed,
        )
    }

    fn judge_says_a() -> Arc<StubClient> {
        StubClient::new(|_| {
            Ok(completion(
                r#"{"verdict": "A", "reasoning": "first looked stronger"}"#,
                5,
                5,
            ))
        })
    }

    #[tokio::test]
    async fn paired_completions_differ_only_in_system_context() {
        let exec = StubClient::new(|request| {
            if request.system.is_some() {
                Ok(completion("rich answer", 900, 1500))
            } else {
                Ok(completion("plain answer", 50, 100))
            }
        });
        let runner = runner(Arc::clone(&exec), judge_says_a(), 7);

        let trial = runner.run_trial(&skill(), &prompt(), 0).await.unwrap();

        let requests = exec.requests();
        assert_eq!(requests.len(), 2);
        let baseline = requests.iter().find(|r| r.system.is_none()).unwrap();
        let augmented = requests.iter().find(|r| r.system.is_some()).unwrap();
        assert_eq!(baseline.user, augmented.user);
        assert_eq!(augmented.system.as_deref(), Some("# PDF skill content"));

        // Token accounting comes from response metadata per side.
        assert_eq!(trial.baseline_tokens, TokenUsage { input: 50, output: 100 });
        assert_eq!(trial.skill_tokens, TokenUsage { input: 900, output: 1500 });
        assert_eq!(trial.baseline_response, "plain answer");
        assert_eq!(trial.skill_response, "rich answer");
    }

    #[tokio::test]
    async fn verdict_translates_through_recorded_position() {
        let exec = StubClient::new(|request| {
            if request.system.is_some() {
                Ok(completion("rich", 1, 1))
            } else {
                Ok(completion("plain", 1, 1))
            }
        });

        // The judge always answers "A"; over several trials the origin
        // verdict must track the persisted position exactly.
        for index in 0..8 {
            let runner = runner(Arc::clone(&exec), judge_says_a(), 42);
            let trial = runner.run_trial(&skill(), &prompt(), index).await.unwrap();
            assert_eq!(
                trial.verdict,
                trial.position.translate(crate::eval::types::VerdictLetter::A)
            );
            assert_eq!(trial.position, position_for_trial(42, "pdf", index));
        }
    }

    #[tokio::test]
    async fn judge_never_sees_origin_labels() {
        let exec = StubClient::new(|request| {
            if request.system.is_some() {
                Ok(completion("ANSWER-WITH", 1, 1))
            } else {
                Ok(completion("ANSWER-WITHOUT", 1, 1))
            }
        });
        let judge_client = judge_says_a();
        let runner = runner(exec, Arc::clone(&judge_client), 1);

        runner.run_trial(&skill(), &prompt(), 0).await.unwrap();

        let judge_requests = judge_client.requests();
        assert_eq!(judge_requests.len(), 1);
        let payload = &judge_requests[0].user;
        assert!(payload.contains("ANSWER-WITH"));
        assert!(payload.contains("ANSWER-WITHOUT"));
        assert!(!payload.contains("baseline"));
        assert!(!payload.contains("skill-augmented"));
    }

    #[tokio::test]
    async fn failed_side_errors_the_trial_without_judging() {
        let exec = StubClient::new(|request| {
            if request.system.is_some() {
                Err(ProviderError::Auth {
                    provider: "stub".into(),
                })
            } else {
                Ok(completion("plain", 1, 1))
            }
        });
        let judge_client = judge_says_a();
        let runner = runner(exec, Arc::clone(&judge_client), 1);

        let err = runner.run_trial(&skill(), &prompt(), 0).await.unwrap_err();
        assert!(matches!(err, EvalError::Provider(_)));
        assert!(judge_client.requests().is_empty());
    }
}
