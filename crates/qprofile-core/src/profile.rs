//! Quality profiles and their parent links.

use crate::error::{QProfileError, Result};
use crate::types::QualityProfileKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub key: QualityProfileKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<QualityProfileKey>,
}

impl QualityProfile {
    pub fn new(key: QualityProfileKey) -> Self {
        Self {
            key,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: QualityProfileKey) -> Self {
        self.parent = Some(parent);
        self
    }
}

pub trait ProfileRegistry: Send + Sync {
    fn get(&self, key: &QualityProfileKey) -> Option<QualityProfile>;

    /// Direct children of `key`, in key order.
    fn children(&self, key: &QualityProfileKey) -> Vec<QualityProfileKey>;

    fn list(&self) -> Vec<QualityProfile>;

    /// Fails with `Conflict` when the key exists and `NotFound` when the
    /// parent is unknown.
    fn create(&self, profile: QualityProfile) -> Result<()>;

    /// Re-parent `key`. Rejects unknown profiles, language mismatches and
    /// cycles.
    fn set_parent(&self, key: &QualityProfileKey, parent: Option<QualityProfileKey>)
        -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: Vec<QualityProfile>,
}

/// Registry held in memory. When opened from a path, every mutation is
/// written back to that YAML file.
#[derive(Debug, Default)]
pub struct MemoryProfileRegistry {
    profiles: RwLock<BTreeMap<QualityProfileKey, QualityProfile>>,
    path: Option<PathBuf>,
}

impl MemoryProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file: ProfilesFile = if path.exists() {
            serde_yaml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            ProfilesFile::default()
        };
        Ok(Self {
            profiles: RwLock::new(
                file.profiles
                    .into_iter()
                    .map(|p| (p.key.clone(), p))
                    .collect(),
            ),
            path: Some(path.to_path_buf()),
        })
    }

    fn persist(&self, profiles: &BTreeMap<QualityProfileKey, QualityProfile>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = ProfilesFile {
            profiles: profiles.values().cloned().collect(),
        };
        let data = serde_yaml::to_string(&file)?;
        crate::io::atomic_write(path, data.as_bytes())
    }
}

fn validate_parent(
    profiles: &BTreeMap<QualityProfileKey, QualityProfile>,
    key: &QualityProfileKey,
    parent: &QualityProfileKey,
) -> Result<()> {
    if !profiles.contains_key(parent) {
        return Err(QProfileError::NotFound(format!("profile {parent}")));
    }
    if parent.language != key.language {
        return Err(QProfileError::InvalidActivation(format!(
            "profile {key} cannot inherit from {parent}: languages differ"
        )));
    }
    // Walk up from the proposed parent; reaching `key` means a cycle.
    let mut cursor = Some(parent.clone());
    while let Some(current) = cursor {
        if &current == key {
            return Err(QProfileError::InvalidActivation(format!(
                "setting {parent} as parent of {key} would create a cycle"
            )));
        }
        cursor = profiles.get(&current).and_then(|p| p.parent.clone());
    }
    Ok(())
}

impl ProfileRegistry for MemoryProfileRegistry {
    fn get(&self, key: &QualityProfileKey) -> Option<QualityProfile> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        profiles.get(key).cloned()
    }

    fn children(&self, key: &QualityProfileKey) -> Vec<QualityProfileKey> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        profiles
            .values()
            .filter(|p| p.parent.as_ref() == Some(key))
            .map(|p| p.key.clone())
            .collect()
    }

    fn list(&self) -> Vec<QualityProfile> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        profiles.values().cloned().collect()
    }

    fn create(&self, profile: QualityProfile) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        if profiles.contains_key(&profile.key) {
            return Err(QProfileError::Conflict(format!(
                "profile {} already exists",
                profile.key
            )));
        }
        if let Some(parent) = &profile.parent {
            validate_parent(&profiles, &profile.key, parent)?;
        }
        profiles.insert(profile.key.clone(), profile);
        self.persist(&profiles)
    }

    fn set_parent(
        &self,
        key: &QualityProfileKey,
        parent: Option<QualityProfileKey>,
    ) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        if !profiles.contains_key(key) {
            return Err(QProfileError::NotFound(format!("profile {key}")));
        }
        if let Some(parent) = &parent {
            validate_parent(&profiles, key, parent)?;
        }
        if let Some(profile) = profiles.get_mut(key) {
            profile.parent = parent;
        }
        self.persist(&profiles)
    }
}
