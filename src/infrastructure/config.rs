use crate::domain::{
    config::BridgeConfig,
    error::{BridgeError, BridgeResult},
};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration manager
///
/// Resolution order: explicit `--config` path, otherwise a project-local
/// `.ttybridge/config.toml` found by walking up from the working directory,
/// otherwise the global `~/.config/ttybridge/config.toml`, otherwise built-in
/// defaults. CLI flags are applied on top by the caller.
pub struct ConfigManager {
    explicit_path: Option<PathBuf>,
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new(explicit_path: Option<&str>) -> BridgeResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            explicit_path: explicit_path.map(PathBuf::from),
            global_config_path,
            project_config_path,
        })
    }

    /// Load configuration, falling back to defaults when no file exists
    pub fn load_config(&self) -> BridgeResult<BridgeConfig> {
        if let Some(path) = &self.explicit_path {
            // An explicitly requested file must exist
            return Self::load_config_from_path(path);
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                return Self::load_config_from_path(project_path);
            }
        }

        if self.global_config_path.exists() {
            return Self::load_config_from_path(&self.global_config_path);
        }

        Ok(BridgeConfig::default())
    }

    /// Get global configuration path
    fn get_global_config_path() -> BridgeResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| BridgeError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("ttybridge").join("config.toml"))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(".ttybridge").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(path: &Path) -> BridgeResult<BridgeConfig> {
        let content = fs::read_to_string(path).map_err(|e| BridgeError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| BridgeError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(path: &Path, config: &BridgeConfig) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| BridgeError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| BridgeError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| BridgeError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }
}
