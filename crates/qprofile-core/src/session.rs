//! Boundary to the permission subsystem.
//!
//! The engine never looks up a "current user": callers pass the session of
//! the request explicitly.

use std::collections::BTreeSet;

/// Global permission required for every profile mutation.
pub const QUALITY_PROFILE_ADMIN: &str = "profileadmin";

pub trait UserSession: Send + Sync {
    fn login(&self) -> Option<&str>;

    fn is_logged_in(&self) -> bool {
        self.login().is_some()
    }

    fn has_global_permission(&self, permission: &str) -> bool;
}

/// Fixed session, used by the CLI and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    login: Option<String>,
    permissions: BTreeSet<String>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn logged_in(login: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            permissions: BTreeSet::new(),
        }
    }

    /// Logged-in user holding [`QUALITY_PROFILE_ADMIN`].
    pub fn admin(login: impl Into<String>) -> Self {
        Self::logged_in(login).with_permission(QUALITY_PROFILE_ADMIN)
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

impl UserSession for StaticSession {
    fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    fn has_global_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
