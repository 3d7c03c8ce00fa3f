use crate::error::ProviderError;
use std::future::Future;
use std::pin::Pin;

/// One request to the external model: an optional system context plus a
/// single user message. Every evaluation stage (generation, completion,
/// judging, security) reduces to this shape.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            user: user.into(),
            max_tokens: 4096,
            temperature: 1.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One model completion. Token counts come straight from the provider's
/// response metadata; they are never recomputed from text length.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
}

impl Completion {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Narrow effect boundary for external model calls. Implemented once for
/// the real API and once as a deterministic double in tests, so trial,
/// judge, and scoring logic run without network access.
pub trait ModelClient: Send + Sync {
    /// Provider identifier (e.g. "anthropic").
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_system_and_limits() {
        let request = CompletionRequest::new("model-x", "hello")
            .with_system("context")
            .with_max_tokens(1024);
        assert_eq!(request.system.as_deref(), Some("context"));
        assert_eq!(request.max_tokens, 1024);
        assert_eq!(request.user, "hello");
    }

    #[test]
    fn completion_totals_both_sides() {
        let completion = Completion {
            text: "out".into(),
            input_tokens: 10,
            output_tokens: 20,
            model: "model-x".into(),
        };
        assert_eq!(completion.total_tokens(), 30);
    }
}
