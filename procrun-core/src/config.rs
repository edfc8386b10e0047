use crate::error::{ProcrunError, Result};
use crate::models::DEFAULT_REDIRECT_MODE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runner settings, loadable from a TOML file.
///
/// ```toml
/// shell = "/bin/bash"
/// redirect_mode = 0o600
/// log_level = "debug"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Command interpreter used by shell runs.
    pub shell: String,
    /// Flag that makes the interpreter read the command from its next argument.
    pub shell_flag: String,
    /// Permission bits for redirection targets.
    pub redirect_mode: u32,
    /// Default tracing filter for the binaries; `RUST_LOG` wins when set.
    pub log_level: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let (shell, shell_flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("/bin/sh", "-c")
        };

        Self {
            shell: shell.to_string(),
            shell_flag: shell_flag.to_string(),
            redirect_mode: DEFAULT_REDIRECT_MODE,
            log_level: None,
        }
    }
}

impl RunnerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunnerConfig = toml::from_str(content)
            .map_err(|e| ProcrunError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shell.trim().is_empty() {
            return Err(ProcrunError::InvalidConfiguration(
                "shell must not be empty".to_string(),
            ));
        }
        if self.redirect_mode > 0o7777 {
            return Err(ProcrunError::InvalidConfiguration(format!(
                "redirect_mode {:o} is not a permission mode",
                self.redirect_mode
            )));
        }
        Ok(())
    }
}
