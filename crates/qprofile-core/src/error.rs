use crate::types::ActiveRuleChange;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QProfileError {
    #[error("not initialized: run 'qprofile init'")]
    NotInitialized,

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid rule key '{0}': expected <repository>:<rule>")]
    InvalidRuleKey(String),

    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid activation: {0}")]
    InvalidActivation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The store accepted every change in `changes` but the index did not
    /// follow. The mutation is not rolled back.
    #[error("index is stale after {count} applied change(s): {reason}", count = .changes.len())]
    IndexStale {
        changes: Vec<ActiveRuleChange>,
        reason: String,
    },

    /// `source` stopped the call after the store had accepted `changes`.
    /// Those writes stay; repeating the call completes the rest.
    #[error("{source} (after {count} applied change(s))", count = .changes.len())]
    PartiallyApplied {
        changes: Vec<ActiveRuleChange>,
        source: Box<QProfileError>,
    },

    #[error("timed out during {operation}")]
    Timeout { operation: String },

    #[error("malformed backup: {}", .0.join("; "))]
    MalformedBackup(Vec<String>),

    #[error("store error: {0}")]
    Store(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("search error: {0}")]
    Search(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl QProfileError {
    /// Stable snake_case label, used in bulk reports and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::InvalidRuleKey(_) => "invalid_rule_key",
            Self::InvalidSeverity(_) => "invalid_severity",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::InvalidActivation(_) => "invalid_activation",
            Self::Conflict(_) => "conflict",
            Self::IndexStale { .. } => "index_stale",
            Self::PartiallyApplied { source, .. } => source.kind(),
            Self::Timeout { .. } => "timeout",
            Self::MalformedBackup(_) => "malformed_backup",
            Self::Store(_) => "store",
            Self::Index(_) => "index",
            Self::Search(_) => "search",
            Self::Io(_) => "io",
            Self::Yaml(_) => "yaml",
            Self::Json(_) => "json",
        }
    }

    /// Whether repeating the same single operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PartiallyApplied { source, .. } => source.is_retryable(),
            other => matches!(other, Self::Conflict(_) | Self::Timeout { .. }),
        }
    }

    /// Changes the store accepted before this error was raised.
    pub fn applied_changes(&self) -> &[ActiveRuleChange] {
        match self {
            Self::IndexStale { changes, .. } | Self::PartiallyApplied { changes, .. } => changes,
            _ => &[],
        }
    }

    /// Attach `applied` to `err`. Nothing applied leaves `err` as it is.
    pub(crate) fn partially_applied(mut applied: Vec<ActiveRuleChange>, err: Self) -> Self {
        match err {
            Self::PartiallyApplied { changes, source } => {
                applied.extend(changes);
                Self::PartiallyApplied {
                    changes: applied,
                    source,
                }
            }
            err if applied.is_empty() => err,
            err => Self::PartiallyApplied {
                changes: applied,
                source: Box::new(err),
            },
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QProfileError>;
