use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod normalize;
pub mod products;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use normalize::{normalize_price, normalize_quantity_unit, NormalizeError, QuantityUnit};
pub use products::{CanonicalProduct, SourceKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
