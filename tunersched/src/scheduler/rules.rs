//! Guarded access to schedule rules.
//!
//! Evaluation passes read rules under a shared guard; every edit takes the
//! exclusive guard and bumps a revision counter so the evaluator knows its
//! cached view is stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::{RwLock, RwLockReadGuard};

use tunersched_protocol::{ProviderResult, RuleId, ScheduleRule};

use crate::provider::RuleStore;

/// Read access held for the duration of an evaluation.
pub struct RulesView<'a> {
    store: RwLockReadGuard<'a, Arc<dyn RuleStore>>,
}

impl RulesView<'_> {
    pub async fn all(&self) -> ProviderResult<Vec<ScheduleRule>> {
        self.store.rules().await
    }

    pub async fn active(&self) -> ProviderResult<Vec<ScheduleRule>> {
        let mut rules = self.store.rules().await?;
        rules.retain(|r| r.active);
        Ok(rules)
    }

    pub async fn get(&self, id: RuleId) -> ProviderResult<Option<ScheduleRule>> {
        Ok(self.store.rules().await?.into_iter().find(|r| r.id == id))
    }
}

pub struct RuleRegistry {
    store: RwLock<Arc<dyn RuleStore>>,
    revision: AtomicU64,
}

impl RuleRegistry {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store: RwLock::new(store),
            revision: AtomicU64::new(0),
        }
    }

    /// Incremented by every successful edit.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub async fn read(&self) -> RulesView<'_> {
        RulesView {
            store: self.store.read().await,
        }
    }

    pub async fn all_rules(&self) -> ProviderResult<Vec<ScheduleRule>> {
        self.read().await.all().await
    }

    pub async fn active_rules(&self) -> ProviderResult<Vec<ScheduleRule>> {
        self.read().await.active().await
    }

    pub async fn create_rule(&self, rule: &ScheduleRule) -> ProviderResult<RuleId> {
        let store = self.store.write().await;
        let id = store.create_rule(rule).await?;
        self.revision.fetch_add(1, Ordering::SeqCst);
        info!("RuleRegistry: Created rule {} ({})", id, rule.name);
        Ok(id)
    }

    pub async fn update_rule(&self, rule: &ScheduleRule) -> ProviderResult<bool> {
        let store = self.store.write().await;
        let updated = store.update_rule(rule).await?;
        if updated {
            self.revision.fetch_add(1, Ordering::SeqCst);
            info!("RuleRegistry: Updated rule {} ({})", rule.id, rule.name);
        }
        Ok(updated)
    }

    pub async fn remove_rule(&self, id: RuleId) -> ProviderResult<bool> {
        let store = self.store.write().await;
        let removed = store.remove_rule(id).await?;
        if removed {
            self.revision.fetch_add(1, Ordering::SeqCst);
            info!("RuleRegistry: Removed rule {}", id);
        }
        Ok(removed)
    }

    pub async fn set_active(&self, id: RuleId, active: bool) -> ProviderResult<bool> {
        self.modify(id, |rule| rule.active = active).await
    }

    /// Apply `edit` to the stored rule `id` under the write guard.
    ///
    /// Returns `false` when the rule does not exist.
    pub async fn modify<F>(&self, id: RuleId, edit: F) -> ProviderResult<bool>
    where
        F: FnOnce(&mut ScheduleRule),
    {
        let store = self.store.write().await;
        let Some(mut rule) = store.rules().await?.into_iter().find(|r| r.id == id) else {
            return Ok(false);
        };
        edit(&mut rule);

        let updated = store.update_rule(&rule).await?;
        if updated {
            self.revision.fetch_add(1, Ordering::SeqCst);
            info!(
                "RuleRegistry: Modified rule {} ({}), active={}",
                rule.id, rule.name, rule.active
            );
        }
        Ok(updated)
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}
