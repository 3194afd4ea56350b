//! Application-wide constants
//!
//! Defaults for configuration values and the trigger names used by the
//! registration access layer.

// =============================================================================
// DATABASE DEFAULTS
// =============================================================================

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 20;

// =============================================================================
// ENGINE DEFAULTS
// =============================================================================

/// Trigger whose rules decide registration access
pub const DEFAULT_REGISTER_TRIGGER: &str = "register";

/// Default rule scope used when listing proxy candidates
pub const DEFAULT_PROXY_RULE_SCOPE: &str = "all";

/// How long a claimed scheduled trigger stays leased to one worker
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

// =============================================================================
// TRIGGERS
// =============================================================================

/// Trigger names fired by request-completion hooks
pub mod triggers {
    /// After a registration is inserted
    pub const REGISTRATION_INSERT: &str = "registration_insert";
    /// After a registration is updated
    pub const REGISTRATION_UPDATE: &str = "registration_update";
    /// Fired by the scheduled trigger processor
    pub const SCHEDULED: &str = "scheduled";
}

// =============================================================================
// CREATION-ACCESS CHECKS
// =============================================================================

/// Names of the default creation-access checks, in chain order
pub mod checks {
    pub const REGISTRATION_TYPE: &str = "registration_type";
    pub const TYPE_AVAILABILITY: &str = "type_availability";
    pub const ACCEPTING: &str = "accepting_registrations";
    pub const CAPACITY: &str = "capacity";
    pub const PROXY: &str = "proxy_eligibility";
    pub const DUPLICATE: &str = "duplicate_registrant";
}
