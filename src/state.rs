//! Application state management
//!
//! Wires the Postgres adapters, the plugin registry and the services into
//! one cheaply clonable handle.

use std::sync::Arc;

use registrar_rules::actions::Messenger;
use registrar_rules::registry::builtin_registry;
use sqlx::PgPool;

use crate::config::Config;
use crate::db::repositories::{
    PgAccountDirectory, PgRegistrationStore, PgRuleStore, PgTriggerQueue,
};
use crate::services::{RegistrationAccess, ScheduledTriggerProcessor};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Database connection pool
    db: PgPool,

    /// Access decisions and trigger firing
    access: RegistrationAccess,

    /// Scheduled trigger processing
    processor: ScheduledTriggerProcessor,

    /// Application configuration
    config: Config,
}

impl AppState {
    /// Create a new application state over a Postgres pool
    pub fn new(db: PgPool, messenger: Arc<dyn Messenger>, config: Config) -> Self {
        let store = Arc::new(PgRegistrationStore::new(db.clone()));
        let rules = Arc::new(PgRuleStore::new(db.clone()));
        let directory = Arc::new(PgAccountDirectory::new(db.clone()));
        let queue = Arc::new(PgTriggerQueue::new(db.clone()));

        let registry = Arc::new(builtin_registry(directory.clone(), messenger));
        let access = RegistrationAccess::new(
            store.clone(),
            rules.clone(),
            directory,
            registry,
            &config.engine,
        );
        let processor = ScheduledTriggerProcessor::new(
            queue,
            store,
            rules,
            access.evaluator().clone(),
            config.engine.claim_lease_secs,
        );

        Self {
            inner: Arc::new(AppStateInner {
                db,
                access,
                processor,
                config,
            }),
        }
    }

    /// Get a reference to the database pool
    pub fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub fn access(&self) -> &RegistrationAccess {
        &self.inner.access
    }

    pub fn processor(&self) -> &ScheduledTriggerProcessor {
        &self.inner.processor
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
