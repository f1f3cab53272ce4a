//! Runtime configuration.
//!
//! Defaults live in module constants; [`Config::from_env`] reads overrides from the
//! environment (after `dotenv` has loaded any `.env` file).

use crate::error::{Error, Result};
use std::env;

/// Pause between Azure Resource Graph pages.
pub const SLEEP_MSEC: u64 = 200;

/// Records per ingestion transaction.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// `$LIMIT_SIZE` used by iterative cleanup statements.
pub const CLEANUP_ITERATION_SIZE: i64 = 100;

/// Attempts for network failures and for EntityNotFound races, counted separately.
pub const MAX_NETWORK_RETRIES: u32 = 5;
pub const MAX_ENTITY_NOT_FOUND_RETRIES: u32 = 5;

/// Concurrent vendor queries in one intel module.
pub const DEFAULT_MAX_WORKERS: usize = 10;

pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: Option<String>,
    /// Fixed update tag; the current epoch seconds are used when absent.
    pub update_tag: Option<i64>,
    pub azure_subscription_id: Option<String>,
    /// Read Azure inventory from this file instead of the `az` CLI.
    pub azure_cache_file: Option<String>,
    /// Timezone used to date the Azure cache file name.
    pub cache_timezone: chrono_tz::Tz,
    pub batch_size: usize,
    pub max_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            neo4j_uri: DEFAULT_NEO4J_URI.to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: String::new(),
            neo4j_database: None,
            update_tag: None,
            azure_subscription_id: None,
            azure_cache_file: None,
            cache_timezone: chrono_tz::UTC,
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, so tests need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(uri) = lookup("NEO4J_URI") {
            config.neo4j_uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            config.neo4j_user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            config.neo4j_password = password;
        }
        config.neo4j_database = lookup("NEO4J_DATABASE").filter(|s| !s.is_empty());
        config.azure_subscription_id = lookup("AZURE_SUBSCRIPTION_ID").filter(|s| !s.is_empty());
        config.azure_cache_file = lookup("CARTOGRAPHY_AZURE_CACHE_FILE").filter(|s| !s.is_empty());

        if let Some(tag) = lookup("CARTOGRAPHY_UPDATE_TAG") {
            let tag = tag
                .parse::<i64>()
                .map_err(|e| Error::Config(format!("CARTOGRAPHY_UPDATE_TAG={tag}: {e}")))?;
            config.update_tag = Some(tag);
        }
        if let Some(size) = lookup("CARTOGRAPHY_BATCH_SIZE") {
            config.batch_size = parse_positive("CARTOGRAPHY_BATCH_SIZE", &size)?;
        }
        if let Some(workers) = lookup("CARTOGRAPHY_MAX_WORKERS") {
            config.max_workers = parse_positive("CARTOGRAPHY_MAX_WORKERS", &workers)?;
        }
        if let Some(tz) = lookup("CARTOGRAPHY_CACHE_TZ") {
            config.cache_timezone = tz
                .parse::<chrono_tz::Tz>()
                .map_err(|e| Error::Config(format!("CARTOGRAPHY_CACHE_TZ={tz}: {e}")))?;
        }
        Ok(config)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(0) => Err(Error::Config(format!("{key} must be greater than 0"))),
        Ok(n) => Ok(n),
        Err(e) => Err(Error::Config(format!("{key}={value}: {e}"))),
    }
}
