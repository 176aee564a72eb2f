use crate::error::{QProfileError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Time budget of one request, store and index calls included.
    #[serde(default = "default_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Profiles below this many ancestors are not reached by a cascade.
    #[serde(default = "default_max_depth")]
    pub max_inheritance_depth: usize,
    /// Logins granted the profile administration permission by the CLI.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admins: Vec<String>,
}

fn default_version() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_depth() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            operation_timeout_ms: default_timeout_ms(),
            max_inheritance_depth: default_max_depth(),
            admins: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn is_admin(&self, login: &str) -> bool {
        self.admins.iter().any(|a| a == login)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(QProfileError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: EngineConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.operation_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "operation_timeout_ms is 0: every operation would time out".to_string(),
            });
        } else if self.operation_timeout_ms > 60_000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "operation_timeout_ms={} (over a minute is unusual)",
                    self.operation_timeout_ms
                ),
            });
        }

        if self.max_inheritance_depth == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_inheritance_depth is 0: child profiles would never inherit"
                    .to_string(),
            });
        } else if self.max_inheritance_depth > 32 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "max_inheritance_depth={} (>32 is unusual)",
                    self.max_inheritance_depth
                ),
            });
        }

        for (i, admin) in self.admins.iter().enumerate() {
            if admin.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("admins[{i}] is empty"),
                });
            } else if self.admins[..i].contains(admin) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("admin '{admin}' is listed more than once"),
                });
            }
        }

        warnings
    }
}
