pub mod file_config;
pub mod loader;

pub use file_config::{FileConfig, FileHttpConfig, FileLoggingConfig, FileNotificationConfig};
pub use loader::ConfigLoader;
