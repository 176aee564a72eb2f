pub mod activator;
pub mod backup;
pub mod bulk;
pub mod catalog;
pub mod config;
pub mod deadline;
pub mod error;
pub mod index;
pub mod io;
pub mod monitor;
pub mod paths;
pub mod profile;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

pub use activator::RuleActivation;
pub use bulk::{BulkActivation, BulkOutcome, BulkReport};
pub use error::{QProfileError, Result};
pub use service::{QProfileService, RequestContext};
pub use types::{
    ActiveRule, ActiveRuleChange, ActiveRuleKey, ChangeKind, Inheritance, QualityProfileKey,
    RuleKey, Severity,
};
