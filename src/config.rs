//! Application configuration management
//!
//! Configuration is read from environment variables (and `.env` when
//! present) once at startup.

use std::env;

use registrar_rules::rule::RuleScope;

use crate::constants::{
    DEFAULT_CLAIM_LEASE_SECS, DEFAULT_DATABASE_MAX_CONNECTIONS, DEFAULT_PROXY_RULE_SCOPE,
    DEFAULT_REGISTER_TRIGGER,
};

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Rule engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Trigger whose rules grant registration operations
    pub register_trigger: String,
    /// Which rules feed candidate selection
    pub proxy_rule_scope: RuleScope,
    /// Lease length for claimed scheduled triggers
    pub claim_lease_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            register_trigger: DEFAULT_REGISTER_TRIGGER.to_string(),
            proxy_rule_scope: RuleScope::All,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            engine: EngineConfig::from_env()?,
        })
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL".to_string()))?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| DEFAULT_DATABASE_MAX_CONNECTIONS.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS".to_string()))?,
        })
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            register_trigger: env::var("REGISTER_TRIGGER")
                .unwrap_or_else(|_| DEFAULT_REGISTER_TRIGGER.to_string()),
            proxy_rule_scope: env::var("PROXY_RULE_SCOPE")
                .unwrap_or_else(|_| DEFAULT_PROXY_RULE_SCOPE.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PROXY_RULE_SCOPE".to_string()))?,
            claim_lease_secs: env::var("CLAIM_LEASE_SECS")
                .unwrap_or_else(|_| DEFAULT_CLAIM_LEASE_SECS.to_string())
                .parse()
                .ok()
                .filter(|secs: &i64| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue("CLAIM_LEASE_SECS".to_string()))?,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.register_trigger, "register");
        assert_eq!(engine.proxy_rule_scope, RuleScope::All);
        assert_eq!(engine.claim_lease_secs, 300);
    }

    #[test]
    fn test_default_scope_parses() {
        assert_eq!(DEFAULT_PROXY_RULE_SCOPE.parse::<RuleScope>(), Ok(RuleScope::All));
    }
}
