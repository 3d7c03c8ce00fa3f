pub mod anthropic;
pub mod limiter;
pub mod retry;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use limiter::{CallPermit, RateLimiter};
pub use retry::{RetryPolicy, with_retry};
pub use traits::{Completion, CompletionRequest, ModelClient};
