pub mod helpers;
pub mod app_config;
pub mod logging;

pub use helpers::*;
pub use app_config::{AppConfig, ConfigError, MonitorSettings};
