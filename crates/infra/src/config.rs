//! Configuration loading and representation.
//!
//! Values come from environment variables; anything unset falls back to a
//! default. A value that is set but unparsable is an error rather than a
//! silent fallback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_inventory::{ClampPolicy, PiecesPerBox};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "STOCKROOM_DB_MAX_CONNECTIONS";
pub const ENV_DEFAULT_PIECES_PER_BOX: &str = "STOCKROOM_DEFAULT_PIECES_PER_BOX";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "STOCKROOM_MAX_CONFLICT_RETRIES";
pub const ENV_CLAMP_POLICY: &str = "STOCKROOM_CLAMP_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration for the stock service and its store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockroomConfig {
    /// Postgres connection string; `None` means use the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Conversion factor for items created without one.
    pub default_pieces_per_box: PiecesPerBox,
    /// How many times a movement is re-read and retried after losing an
    /// optimistic concurrency race.
    pub max_conflict_retries: u32,
    pub clamp_policy: ClampPolicy,
}

impl Default for StockroomConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            db_max_connections: 5,
            default_pieces_per_box: PiecesPerBox::default(),
            max_conflict_retries: 3,
            clamp_policy: ClampPolicy::default(),
        }
    }
}

impl StockroomConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            tracing::warn!("{ENV_DATABASE_URL} not set; using in-memory item store");
        }

        let db_max_connections = match lookup(ENV_DB_MAX_CONNECTIONS) {
            Some(raw) => parse_positive(ENV_DB_MAX_CONNECTIONS, &raw)?,
            None => defaults.db_max_connections,
        };

        let default_pieces_per_box = match lookup(ENV_DEFAULT_PIECES_PER_BOX) {
            Some(raw) => PiecesPerBox::new(parse_positive(ENV_DEFAULT_PIECES_PER_BOX, &raw)?)
                .map_err(|e| invalid(ENV_DEFAULT_PIECES_PER_BOX, &raw, e.to_string()))?,
            None => defaults.default_pieces_per_box,
        };

        let max_conflict_retries = match lookup(ENV_MAX_CONFLICT_RETRIES) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| invalid(ENV_MAX_CONFLICT_RETRIES, &raw, e.to_string()))?,
            None => defaults.max_conflict_retries,
        };

        let clamp_policy = match lookup(ENV_CLAMP_POLICY) {
            Some(raw) => raw
                .parse::<ClampPolicy>()
                .map_err(|e| invalid(ENV_CLAMP_POLICY, &raw, e.to_string()))?,
            None => defaults.clamp_policy,
        };
        if clamp_policy == ClampPolicy::Derived {
            tracing::warn!(
                "clamp policy 'derived' enabled: total_pieces is recomputed from boxes and pieces"
            );
        }

        Ok(Self {
            database_url,
            db_max_connections,
            default_pieces_per_box,
            max_conflict_retries,
            clamp_policy,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(invalid(key, raw, "must be positive")),
        Ok(v) => Ok(v),
        Err(e) => Err(invalid(key, raw, e.to_string())),
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}
