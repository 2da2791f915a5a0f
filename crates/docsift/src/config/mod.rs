pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from_str};
pub use schema::{Config, LlmConfig, LoggingConfig, RetryConfig, KNOWN_AGENTS};
