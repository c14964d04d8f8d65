//! Configuration file discovery and loading

use crate::bus::api::{EventBusConfig, EventBusError, EventBusResult};
use std::path::{Path, PathBuf};

/// `<config_dir>/msgbus/msgbus.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("msgbus").join("msgbus.toml"))
}

/// Load the bus configuration
///
/// An explicitly given file must exist. Without one, the default location is
/// used when present, otherwise built-in defaults apply.
pub fn load_config(config_file: Option<&Path>) -> EventBusResult<EventBusConfig> {
    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(EventBusError::Config {
                    message: format!(
                        "The specified configuration file does not exist: {}",
                        path.display()
                    ),
                });
            }
            EventBusConfig::from_file(path)
        }
        None => match default_config_path() {
            Some(path) if path.exists() => {
                log::debug!("Using configuration file {}", path.display());
                EventBusConfig::from_file(&path)
            }
            _ => Ok(EventBusConfig::default()),
        },
    }
}
