//! Cache file for the Azure network inventory.
//!
//! Avoids repeated Resource Graph calls while iterating on the graph side.

use super::network::{
    get_network_inventory, query_resource_graph, NetworkInventory, ResourceKind,
};
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::Path;

/// Passing this instead of a path picks a per-day file name.
pub const DAILY: &str = "daily";

/// `azure_network_cache_{subscription}_{YYYY-MM-DD}.json`, dated in `tz`.
pub fn daily_cache_file(subscription_id: &str, tz: chrono_tz::Tz) -> String {
    let now = chrono::Utc::now().with_timezone(&tz);
    format!(
        "azure_network_cache_{subscription_id}_{}.json",
        now.format("%Y-%m-%d")
    )
}

pub fn read_cache_file(path: &str) -> Result<NetworkInventory> {
    let json = std::fs::read_to_string(path)?;
    let mut deserializer = serde_json::Deserializer::from_str(&json);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        Error::Config(format!(
            "Error parsing cache file {path}: path={} error={}",
            e.path(),
            e
        ))
    })
}

pub fn write_cache_file(path: &str, inventory: &NetworkInventory) -> Result<()> {
    let json = serde_json::to_string_pretty(inventory)?;
    log::warn!("Writing data to cache file: {path}");
    std::fs::write(path, json).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Error writing cache file {path}: {e}"),
        ))
    })
}

/// Reads the inventory from `cache_file`, or fetches it from Azure and writes the file.
///
/// A named file must exist; only [`DAILY`] files are created on a miss.
pub async fn read_network_cache(
    cache_file: &str,
    subscription_id: &str,
    tz: chrono_tz::Tz,
    max_workers: usize,
) -> Result<NetworkInventory> {
    read_network_cache_with(
        cache_file,
        subscription_id,
        tz,
        max_workers,
        query_resource_graph,
    )
    .await
}

/// [`read_network_cache`] with the per-kind fetch passed in.
///
/// An inventory with failed kinds is returned but never written, so the next run fetches again.
pub async fn read_network_cache_with<F>(
    cache_file: &str,
    subscription_id: &str,
    tz: chrono_tz::Tz,
    max_workers: usize,
    fetch: F,
) -> Result<NetworkInventory>
where
    F: Fn(ResourceKind, &str) -> Result<Vec<Value>> + Clone + Send + Sync + 'static,
{
    let cache_file = if cache_file == DAILY {
        daily_cache_file(subscription_id, tz)
    } else {
        if !Path::new(cache_file).exists() {
            return Err(Error::Config(format!("Cache file does not exist: {cache_file}")));
        }
        log::info!("Using provided cache file: {cache_file}");
        cache_file.to_string()
    };

    if Path::new(&cache_file).exists() {
        log::info!("Reading from cache file: {cache_file}");
        return read_cache_file(&cache_file);
    }

    log::warn!("Cache file not found: {cache_file}");
    let (inventory, failed) = get_network_inventory(subscription_id, max_workers, fetch).await;
    if failed.is_empty() {
        write_cache_file(&cache_file, &inventory)?;
    } else {
        let names: Vec<&str> = failed.iter().map(ResourceKind::name).collect();
        log::warn!(
            "Not writing cache file {cache_file}: could not get {}",
            names.join(", ")
        );
    }
    Ok(inventory)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CACHE: &str = "src/tests/test_data/azure_network_cache_01.json";

    #[tokio::test]
    async fn test_read_network_cache() {
        let inventory = read_network_cache(TEST_CACHE, "ignored", chrono_tz::UTC, 1)
            .await
            .expect("Error reading network cache");
        assert_eq!(inventory.subscriptions.len(), 1);
        assert_eq!(inventory.virtual_networks.len(), 2);
        assert_eq!(inventory.subnets.len(), 3);
        assert_eq!(inventory.network_interfaces.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_named_cache_is_an_error() {
        let err = read_network_cache("does/not/exist.json", "sub", chrono_tz::UTC, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[tokio::test]
    async fn test_daily_cache_not_written_when_a_kind_fails() {
        let subscription_id = "cache-test-partial-failure";
        let path = daily_cache_file(subscription_id, chrono_tz::UTC);
        let _ = std::fs::remove_file(&path);

        let inventory = read_network_cache_with(DAILY, subscription_id, chrono_tz::UTC, 2, |kind, _| {
            match kind {
                ResourceKind::VirtualNetworks => Err(Error::Vendor("az not found".to_string())),
                _ => Ok(vec![serde_json::json!({"id": kind.name()})]),
            }
        })
        .await
        .unwrap();

        assert!(inventory.virtual_networks.is_empty());
        assert_eq!(inventory.subnets.len(), 1);
        assert!(!Path::new(&path).exists(), "{path} should not be written");
    }

    #[tokio::test]
    async fn test_daily_cache_written_after_full_fetch() {
        let subscription_id = "cache-test-full-fetch";
        let path = daily_cache_file(subscription_id, chrono_tz::UTC);
        let _ = std::fs::remove_file(&path);

        let fetched = read_network_cache_with(DAILY, subscription_id, chrono_tz::UTC, 2, |kind, _| {
            Ok(vec![serde_json::json!({"id": kind.name()})])
        })
        .await
        .unwrap();

        assert!(Path::new(&path).exists());
        assert_eq!(read_cache_file(&path).unwrap(), fetched);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_daily_cache_file_name() {
        let name = daily_cache_file("sub-1", chrono_tz::Pacific::Auckland);
        assert!(name.starts_with("azure_network_cache_sub-1_"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "azure_network_cache_sub-1_2024-01-01.json".len());
    }

    #[test]
    fn test_write_then_read() {
        let path = std::env::temp_dir().join("cartography_cache_roundtrip_test.json");
        let path = path.to_string_lossy().to_string();
        let inventory = read_cache_file(TEST_CACHE).unwrap();
        write_cache_file(&path, &inventory).unwrap();
        assert_eq!(read_cache_file(&path).unwrap(), inventory);
        let _ = std::fs::remove_file(&path);
    }
}
