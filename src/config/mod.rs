//! Configuration management

mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, ObservabilityConfig, OrchestratorConfig, ServerConfig,
};
