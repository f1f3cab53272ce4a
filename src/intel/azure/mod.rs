//! Azure intel module.
//!
//! - [`cli`] - runs `az` commands
//! - [`graph`] - paginated Resource Graph queries
//! - [`cache`] - reads or writes the inventory as a JSON file
//! - [`network`] - networking resources: get, transform, load and cleanup

pub mod cache;
pub mod cli;
pub mod graph;
pub mod network;

use crate::client::{GraphSession, Params};
use crate::config::Config;
use crate::error::Result;
use crate::models::azure::network::SUBSCRIPTION_ID_KWARG;
use colored::Colorize;
use network::{NetworkInventory, SyncContext};
use serde_json::Value;

/// Inventory from the configured cache file, or straight from Resource Graph.
async fn get_inventory(config: &Config, subscription_id: &str) -> Result<NetworkInventory> {
    match config.azure_cache_file.as_deref() {
        Some(cache_file) => {
            cache::read_network_cache(
                cache_file,
                subscription_id,
                config.cache_timezone,
                config.max_workers,
            )
            .await
        }
        None => {
            let (inventory, _failed) = network::get_network_inventory(
                subscription_id,
                config.max_workers,
                network::query_resource_graph,
            )
            .await;
            Ok(inventory)
        }
    }
}

/// Syncs the configured subscription. Without a subscription id there is nothing to do.
pub async fn start_azure_ingestion(
    session: &dyn GraphSession,
    config: &Config,
    update_tag: i64,
) -> Result<()> {
    let Some(subscription_id) = config.azure_subscription_id.as_deref() else {
        log::warn!(
            "{} is not set, skipping Azure ingestion",
            SUBSCRIPTION_ID_KWARG.yellow()
        );
        return Ok(());
    };

    let inventory = get_inventory(config, subscription_id).await?;

    let mut common_job_parameters = Params::new();
    common_job_parameters.insert("UPDATE_TAG".into(), Value::from(update_tag));
    common_job_parameters.insert(SUBSCRIPTION_ID_KWARG.into(), Value::from(subscription_id));

    let ctx = SyncContext {
        session,
        subscription_id,
        update_tag,
        batch_size: config.batch_size,
        common_job_parameters: &common_job_parameters,
    };
    network::sync(&ctx, &inventory).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::recording::RecordingSession;

    #[tokio::test]
    async fn test_skips_without_subscription() {
        let session = RecordingSession::new();
        start_azure_ingestion(&session, &Config::default(), 1)
            .await
            .unwrap();
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ingests_from_cache_file() {
        let session = RecordingSession::new();
        let config = Config {
            azure_subscription_id: Some("00000000-1111-2222-3333-444444444444".to_string()),
            azure_cache_file: Some("src/tests/test_data/azure_network_cache_01.json".to_string()),
            ..Config::default()
        };
        start_azure_ingestion(&session, &config, 1700000000)
            .await
            .unwrap();

        let queries = session.queries();
        assert!(queries.iter().any(|q| q.contains("MERGE (i:AzureSubnet{id: item.id})")));
        assert!(queries
            .iter()
            .any(|q| q.contains("ASSOCIATED_WITH") && q.contains("_sub_resource_id")));
    }
}
