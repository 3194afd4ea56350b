//! Postgres implementations of the storage seams

pub mod account_repo;
pub mod registration_repo;
pub mod rule_repo;
pub mod trigger_repo;

pub use account_repo::PgAccountDirectory;
pub use registration_repo::PgRegistrationStore;
pub use rule_repo::PgRuleStore;
pub use trigger_repo::PgTriggerQueue;
