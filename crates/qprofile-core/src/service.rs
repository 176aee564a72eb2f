//! Public entry point: permission checks and deadlines around the engine.

use crate::activator::{RuleActivation, RuleActivator};
use crate::backup::{ProfileBackupCodec, ProfileBackupDocument};
use crate::bulk::{BulkActivation, BulkActivationCoordinator, BulkReport};
use crate::catalog::{MemoryRuleCatalog, RuleCatalog, RuleQuery};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::{QProfileError, Result};
use crate::index::{ActiveRuleIndex, MemoryActiveRuleIndex};
use crate::monitor::{ActiveRuleMonitor, EngineStats, StoreConnectionFactory};
use crate::paths;
use crate::profile::{MemoryProfileRegistry, ProfileRegistry, QualityProfile};
use crate::session::{UserSession, QUALITY_PROFILE_ADMIN};
use crate::store::{ActivationStore, RedbActivationStore};
use crate::types::{ActiveRule, ActiveRuleChange, ActiveRuleKey, QualityProfileKey, RuleKey};
use chrono::Utc;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Who is calling and how long the call may take.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    pub session: &'a dyn UserSession,
    pub timeout: Duration,
}

impl<'a> RequestContext<'a> {
    pub fn new(session: &'a dyn UserSession, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }
}

pub struct QProfileService {
    activator: Arc<RuleActivator>,
    bulk: BulkActivationCoordinator,
    backups: ProfileBackupCodec,
    stats: Arc<EngineStats>,
    monitor: ActiveRuleMonitor,
}

impl QProfileService {
    pub fn new(
        store: Arc<dyn ActivationStore>,
        index: Arc<dyn ActiveRuleIndex>,
        catalog: Arc<dyn RuleCatalog>,
        profiles: Arc<dyn ProfileRegistry>,
        config: &EngineConfig,
    ) -> Self {
        let stats = Arc::new(EngineStats::default());
        let activator = Arc::new(RuleActivator::new(
            Arc::clone(&store),
            index,
            catalog,
            profiles,
            Arc::clone(&stats),
            config.max_inheritance_depth,
        ));
        let monitor = ActiveRuleMonitor::new(Arc::new(StoreConnectionFactory::new(
            store,
            Arc::clone(&stats),
            config.operation_timeout(),
        )));
        Self {
            bulk: BulkActivationCoordinator::new(Arc::clone(&activator)),
            backups: ProfileBackupCodec::new(Arc::clone(&activator)),
            activator,
            stats,
            monitor,
        }
    }

    /// Engine over the files under `root/.qprofile`, with the index rebuilt
    /// from the store.
    pub fn open(root: &Path, config: &EngineConfig) -> Result<Self> {
        let store = RedbActivationStore::open(&paths::store_path(root))?;
        let catalog = MemoryRuleCatalog::load(&paths::catalog_path(root))?;
        let profiles = MemoryProfileRegistry::open(&paths::profiles_path(root))?;
        let service = Self::new(
            Arc::new(store),
            Arc::new(MemoryActiveRuleIndex::new()),
            Arc::new(catalog),
            Arc::new(profiles),
            config,
        );
        service.warm_up()?;
        Ok(service)
    }

    /// Fail with `Permission` unless the caller is logged in and holds
    /// [`QUALITY_PROFILE_ADMIN`].
    pub fn verify_admin_permission(&self, ctx: &RequestContext<'_>) -> Result<()> {
        if !ctx.session.is_logged_in() {
            return Err(QProfileError::Permission(
                "authentication is required".to_string(),
            ));
        }
        if !ctx.session.has_global_permission(QUALITY_PROFILE_ADMIN) {
            return Err(QProfileError::Permission(format!(
                "'{QUALITY_PROFILE_ADMIN}' permission is required"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn activate(
        &self,
        ctx: &RequestContext<'_>,
        activation: &RuleActivation,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.verify_admin_permission(ctx)?;
        self.track(self.activator.activate(activation, &ctx.deadline()))
    }

    pub fn deactivate(
        &self,
        ctx: &RequestContext<'_>,
        key: &ActiveRuleKey,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.verify_admin_permission(ctx)?;
        self.track(self.activator.deactivate(key, &ctx.deadline()))
    }

    pub fn bulk_activate(
        &self,
        ctx: &RequestContext<'_>,
        request: &BulkActivation,
    ) -> Result<BulkReport> {
        self.verify_admin_permission(ctx)?;
        self.bulk.bulk_activate(request, &ctx.deadline())
    }

    pub fn bulk_deactivate(
        &self,
        ctx: &RequestContext<'_>,
        query: &RuleQuery,
        profile: &QualityProfileKey,
    ) -> Result<BulkReport> {
        self.verify_admin_permission(ctx)?;
        self.bulk.bulk_deactivate(query, profile, &ctx.deadline())
    }

    /// Replace the rules of `profile` with those of the document read from
    /// `reader`.
    pub fn restore(
        &self,
        ctx: &RequestContext<'_>,
        reader: impl Read,
        profile: &QualityProfileKey,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.verify_admin_permission(ctx)?;
        let document = ProfileBackupDocument::read_from(reader)?;
        self.track(self.backups.restore(&document, profile, &ctx.deadline()))
    }

    /// Register a profile, inheriting from `parent` when given. An existing
    /// key is a `Conflict`, unless it already has `parent` and still misses
    /// some of its bindings: the call then propagates the missing ones.
    pub fn create_profile(
        &self,
        ctx: &RequestContext<'_>,
        key: &QualityProfileKey,
        parent: Option<QualityProfileKey>,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.verify_admin_permission(ctx)?;
        let profiles = self.activator.profiles();
        if let Some(existing) = profiles.get(key) {
            // Repeating a create whose inheritance stopped part way finishes it.
            if parent.is_some() && existing.parent == parent {
                let changes =
                    self.track(self.activator.set_parent(key, parent, &ctx.deadline()))?;
                if !changes.is_empty() {
                    info!(profile = %key, changes = changes.len(), "profile creation resumed");
                    return Ok(changes);
                }
            }
            return Err(QProfileError::Conflict(format!("profile {key} already exists")));
        }
        if let Some(parent) = &parent {
            let Some(found) = profiles.get(parent) else {
                return Err(QProfileError::NotFound(format!("profile {parent}")));
            };
            if found.key.language != key.language {
                return Err(QProfileError::InvalidActivation(format!(
                    "profile {key} cannot inherit from {parent}: languages differ"
                )));
            }
        }
        profiles.create(QualityProfile::new(key.clone()))?;
        info!(profile = %key, "profile created");
        match parent {
            Some(parent) => self.track(self.activator.set_parent(key, Some(parent), &ctx.deadline())),
            None => Ok(Vec::new()),
        }
    }

    pub fn set_parent(
        &self,
        ctx: &RequestContext<'_>,
        key: &QualityProfileKey,
        parent: Option<QualityProfileKey>,
    ) -> Result<Vec<ActiveRuleChange>> {
        self.verify_admin_permission(ctx)?;
        self.track(self.activator.set_parent(key, parent, &ctx.deadline()))
    }

    /// Rebuild the index content of `profile` from the store. Returns the
    /// number of rules indexed.
    pub fn resync_index(&self, ctx: &RequestContext<'_>, profile: &QualityProfileKey) -> Result<usize> {
        self.verify_admin_permission(ctx)?;
        if self.activator.profiles().get(profile).is_none() {
            return Err(QProfileError::NotFound(format!("profile {profile}")));
        }
        let count = self.activator.resync(profile, &ctx.deadline())?;
        self.stats.record_reconciliation(Utc::now());
        info!(profile = %profile, rules = count, "index resynced");
        Ok(count)
    }

    /// Rebuild the whole index from the store. Run once at startup, before
    /// any request.
    pub fn warm_up(&self) -> Result<usize> {
        let deadline = Deadline::unbounded();
        let mut total = 0;
        for profile in self.activator.profiles().list() {
            total += self.activator.resync(&profile.key, &deadline)?;
        }
        self.stats.record_reconciliation(Utc::now());
        debug!(rules = total, "index warmed up");
        Ok(total)
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            debug!(kind = e.kind(), error = %e, "operation failed");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Write the backup of `profile` to `writer`. Needs no permission.
    pub fn backup(
        &self,
        ctx: &RequestContext<'_>,
        profile: &QualityProfileKey,
        writer: impl Write,
    ) -> Result<()> {
        self.backup_document(ctx, profile)?.write_to(writer)
    }

    pub fn backup_document(
        &self,
        ctx: &RequestContext<'_>,
        profile: &QualityProfileKey,
    ) -> Result<ProfileBackupDocument> {
        self.backups.backup(profile, &ctx.deadline())
    }

    pub fn get_active_rule(
        &self,
        ctx: &RequestContext<'_>,
        key: &ActiveRuleKey,
    ) -> Result<Option<ActiveRule>> {
        self.activator.index().get_by_key(key, &ctx.deadline())
    }

    pub fn find_active_rules_by_rule(
        &self,
        ctx: &RequestContext<'_>,
        rule: &RuleKey,
    ) -> Result<Vec<ActiveRule>> {
        self.activator.index().find_by_rule(rule, &ctx.deadline())
    }

    pub fn find_active_rules_by_profile(
        &self,
        ctx: &RequestContext<'_>,
        profile: &QualityProfileKey,
    ) -> Result<Vec<ActiveRule>> {
        self.activator.index().find_by_profile(profile, &ctx.deadline())
    }

    pub fn list_profiles(&self, _ctx: &RequestContext<'_>) -> Vec<QualityProfile> {
        self.activator.profiles().list()
    }

    pub fn monitor(&self) -> &ActiveRuleMonitor {
        &self.monitor
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}
