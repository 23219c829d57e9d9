mod error;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    config_path, Assignment, BenchConfig, BudgetConfig, CONFIG_ENV, DEFAULT_CONFIG_PATH,
};
