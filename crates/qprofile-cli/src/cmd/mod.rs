pub mod backup;
pub mod bulk;
pub mod init;
pub mod monitor;
pub mod profile;
pub mod rule;

use anyhow::Context;
use qprofile_core::{
    config::{EngineConfig, WarnLevel},
    session::StaticSession,
    QProfileService, QualityProfileKey, RequestContext,
};
use std::path::Path;

/// An opened project: config, engine and the caller's session.
pub struct Project {
    pub config: EngineConfig,
    pub service: QProfileService,
    pub session: StaticSession,
}

impl Project {
    pub fn ctx(&self) -> RequestContext<'_> {
        RequestContext::new(&self.session, self.config.operation_timeout())
    }
}

pub fn open(root: &Path, user: Option<&str>) -> anyhow::Result<Project> {
    let config = EngineConfig::load(root).context("failed to load .qprofile/config.yaml")?;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => anyhow::bail!("invalid config: {}", warning.message),
            WarnLevel::Warning => tracing::warn!(message = %warning.message, "config warning"),
        }
    }
    let service = QProfileService::open(root, &config).context("failed to open engine")?;
    let session = match user {
        Some(login) if config.is_admin(login) => StaticSession::admin(login),
        Some(login) => StaticSession::logged_in(login),
        None => StaticSession::anonymous(),
    };
    Ok(Project {
        config,
        service,
        session,
    })
}

/// Parse `<language>:<name>`.
pub fn parse_profile(s: &str) -> Result<QualityProfileKey, String> {
    match s.split_once(':') {
        Some((language, name)) if !language.is_empty() && !name.is_empty() => {
            Ok(QualityProfileKey::new(name, language))
        }
        _ => Err(format!("expected <language>:<name>, got '{s}'")),
    }
}

/// Parse `name=value`; the value may be empty.
pub fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}
