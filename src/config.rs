use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Tool configuration: the servers to keep in sync plus a few knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log mutating calls instead of sending them. The CLI flag also turns
    /// this on.
    pub dry_run: bool,
    /// Where the baseline state document lives (default: state.json in the
    /// working directory).
    pub state_path: Option<String>,
    pub servers: Vec<ServerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            state_path: None,
            servers: Vec::new(),
        }
    }
}

/// One backend server and the credentials to log into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Default configuration file path under the user config directory.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("piped-sync");
        Ok(config_dir.join(CONFIG_FILE_NAME))
    }

    /// Load the configuration document.
    ///
    /// With an explicit path the file must exist. Otherwise a config.toml in
    /// the working directory wins over the one in the user config directory.
    /// Missing or unreadable configuration is fatal; the tool refuses to run
    /// without knowing its servers.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.exists() {
                    local
                } else {
                    let fallback = Self::default_path()?;
                    if !fallback.exists() {
                        return Err(anyhow!(
                            "No configuration found: create {} or {}",
                            local.display(),
                            fallback.display()
                        ));
                    }
                    fallback
                }
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}
