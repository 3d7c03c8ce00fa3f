#![allow(dead_code)]

use skillgrade::Config;
use skillgrade::error::ProviderError;
use skillgrade::provider::{Completion, CompletionRequest, ModelClient};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;

pub const GEN_MODEL: &str = "gen-model";
pub const EXEC_MODEL: &str = "exec-model";
pub const JUDGE_MODEL: &str = "judge-model";
pub const SEC_MODEL: &str = "sec-model";

/// Config pointed at a temp directory, with the per-minute window off so
/// tests never sleep.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.models.generation = GEN_MODEL.into();
    config.models.execution = EXEC_MODEL.into();
    config.models.judge = JUDGE_MODEL.into();
    config.models.security = SEC_MODEL.into();
    config.paths.skills_dir = root.join("skills");
    config.paths.evaluations_dir = root.join("evaluations");
    config.paths.leaderboard = root.join("leaderboard.json");
    config.limits.calls_per_minute = 0;
    config.limits.max_in_flight = 8;
    config
}

pub fn seed_skill(config: &Config, id: &str, content: &str) {
    let dir = config.paths.skills_dir.join(id);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("SKILL.md"), content).unwrap();
}

/// Deterministic stand-in for the model API. Routes on the model id:
/// generation calls return a fixed prompt list, execution calls return
/// recognizable plain/enhanced answers with fixed token usage, judge calls
/// steer the verdict per prompt index, and security calls return a single
/// medium-severity issue (or fail outright when configured to).
pub struct FakeModel {
    pub prompt_count: usize,
    /// Desired origin verdict per prompt index: "skill", "baseline", "tie".
    pub verdicts: Vec<&'static str>,
    pub fail_security: bool,
    /// Prompt indices whose skill-side completion fails terminally.
    pub fail_skill_side_for: Vec<usize>,
    pub calls: Mutex<Vec<CompletionRequest>>,
}

impl FakeModel {
    pub fn new(verdicts: Vec<&'static str>) -> Self {
        Self {
            prompt_count: verdicts.len(),
            verdicts,
            fail_security: false,
            fail_skill_side_for: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for_model(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.model == model)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn generation_reply(&self) -> Completion {
        let difficulties = ["simple", "medium", "complex"];
        let prompts: Vec<String> = (0..self.prompt_count)
            .map(|index| {
                format!(
                    r#"{{"prompt": "task {index} for the user", "difficulty": "{}", "capability_tested": "capability-{index}"}}"#,
                    difficulties[index % difficulties.len()]
                )
            })
            .collect();
        completion(format!("[{}]", prompts.join(",")), GEN_MODEL, 200, 400)
    }

    fn execution_reply(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let index = trailing_index(&request.user);
        if request.system.is_some() {
            if self.fail_skill_side_for.contains(&index) {
                return Err(ProviderError::Auth {
                    provider: "fake".into(),
                });
            }
            Ok(completion(
                format!("enhanced answer for task {index}"),
                EXEC_MODEL,
                900,
                1500,
            ))
        } else {
            Ok(completion(
                format!("plain answer for task {index}"),
                EXEC_MODEL,
                50,
                100,
            ))
        }
    }

    fn judge_reply(&self, request: &CompletionRequest) -> Completion {
        let user_request = section(&request.user, "USER'S REQUEST:");
        let index = trailing_index(user_request);
        let first = section(&request.user, "RESPONSE A:");
        let desired = self.verdicts.get(index).copied().unwrap_or("tie");

        let first_is_enhanced = first.contains("enhanced");
        let letter = match desired {
            "skill" => {
                if first_is_enhanced {
                    "A"
                } else {
                    "B"
                }
            }
            "baseline" => {
                if first_is_enhanced {
                    "B"
                } else {
                    "A"
                }
            }
            _ => "TIE",
        };
        completion(
            format!(r#"{{"verdict": "{letter}", "reasoning": "scripted verdict for task {index}"}}"#),
            JUDGE_MODEL,
            30,
            20,
        )
    }

    fn security_reply(&self) -> Result<Completion, ProviderError> {
        if self.fail_security {
            return Err(ProviderError::Api {
                provider: "fake".into(),
                status: 400,
                message: "security analysis rejected".into(),
            });
        }
        Ok(completion(
            r#"{
                "issues": [
                    {
                        "category": "data_exfiltration",
                        "severity": "medium",
                        "description": "Posts usage data to an external endpoint",
                        "evidence": "curl https://example.com/collect"
                    }
                ],
                "analysis": "One medium severity issue found."
            }"#
            .to_string(),
            SEC_MODEL,
            80,
            60,
        ))
    }
}

impl ModelClient for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.clone());
            match request.model.as_str() {
                GEN_MODEL => Ok(self.generation_reply()),
                EXEC_MODEL => self.execution_reply(request),
                JUDGE_MODEL => Ok(self.judge_reply(request)),
                SEC_MODEL => self.security_reply(),
                other => Err(ProviderError::Api {
                    provider: "fake".into(),
                    status: 404,
                    message: format!("unknown model {other}"),
                }),
            }
        })
    }
}

fn completion(text: String, model: &str, input: u64, output: u64) -> Completion {
    Completion {
        text,
        input_tokens: input,
        output_tokens: output,
        model: model.into(),
    }
}

/// The body between a section header and the following `---` separator.
fn section<'a>(text: &'a str, header: &str) -> &'a str {
    text.split(header)
        .nth(1)
        .and_then(|rest| rest.split("---").next())
        .unwrap_or("")
}

/// Parse the task index out of "task {n} ..." text.
fn trailing_index(text: &str) -> usize {
    text.split_whitespace()
        .skip_while(|word| *word != "task")
        .nth(1)
        .and_then(|word| word.parse().ok())
        .unwrap_or(usize::MAX)
}
