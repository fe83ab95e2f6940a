// Configuration management module
// Loads, validates and persists the TOML configuration passed into every component

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{ArxivConfig, Config, ConfigError, OllamaConfig, RetrievalConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
