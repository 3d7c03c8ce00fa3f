pub mod schema;

pub use schema::{
    Config, LimitsConfig, ModelsConfig, PathsConfig, PricingConfig, PromptsConfig, RetryConfig,
    TrialsConfig,
};
