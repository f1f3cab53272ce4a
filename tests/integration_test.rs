//! Integration tests for a full Azure sync.
//!
//! These tests run the default sync from the test cache file against a recording session.

use cartography::client::recording::{CallKind, RecordingSession};
use cartography::client::Value;
use cartography::intel::azure::cache::read_cache_file;
use cartography::intel::azure::network::{transform_network_interfaces, transform_subnets};
use cartography::{build_default_sync, Config};

const TEST_CACHE: &str = "src/tests/test_data/azure_network_cache_01.json";
const SUBSCRIPTION_ID: &str = "00000000-1111-2222-3333-444444444444";
const UPDATE_TAG: i64 = 1_700_000_000;

fn config() -> Config {
    Config {
        azure_subscription_id: Some(SUBSCRIPTION_ID.to_string()),
        azure_cache_file: Some(TEST_CACHE.to_string()),
        batch_size: 2,
        ..Config::default()
    }
}

async fn run_sync() -> RecordingSession {
    let session = RecordingSession::new();
    build_default_sync()
        .run(&session, &config(), UPDATE_TAG)
        .await
        .expect("Sync failed");
    session
}

fn position(queries: &[String], needle: &str) -> usize {
    queries
        .iter()
        .position(|q| q.contains(needle))
        .unwrap_or_else(|| panic!("no query contains {needle}"))
}

#[tokio::test]
async fn test_full_sync_load_order() {
    let session = run_sync().await;
    let queries = session.queries();

    let subscription = position(&queries, "MERGE (i:AzureSubscription{id: item.id})");
    let vnet = position(&queries, "MERGE (i:AzureVirtualNetwork{id: item.id})");
    let nsg = position(&queries, "MERGE (i:AzureNetworkSecurityGroup{id: item.id})");
    let subnet = position(&queries, "MERGE (i:AzureSubnet{id: item.id})");
    let link = position(&queries, "MERGE (from)-[r:ASSOCIATED_WITH]->(to)");
    let public_ip = position(&queries, "MERGE (i:AzurePublicIPAddress{id: item.id})");
    let nic = position(&queries, "MERGE (i:AzureNetworkInterface{id: item.id})");

    assert!(subscription < vnet, "Subscription must load first");
    assert!(vnet < nsg && nsg < subnet, "VNets and NSGs load before subnets");
    assert!(subnet < link, "Subnets load before their NSG links");
    assert!(link < public_ip && public_ip < nic, "NICs load last");
}

#[tokio::test]
async fn test_full_sync_batches_and_kwargs() {
    let session = run_sync().await;
    let subnet_writes: Vec<_> = session
        .calls()
        .into_iter()
        .filter(|c| c.kind == CallKind::Write && c.query.contains("MERGE (i:AzureSubnet{id: item.id})"))
        .collect();

    // 3 subnets with batch size 2
    assert_eq!(subnet_writes.len(), 2);
    let first = &subnet_writes[0].params;
    assert_eq!(first.get("lastupdated"), Some(&Value::from(UPDATE_TAG)));
    assert_eq!(first.get("AZURE_SUBSCRIPTION_ID"), Some(&Value::from(SUBSCRIPTION_ID)));
    assert_eq!(first["DictList"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_full_sync_runs_scoped_cleanup() {
    let session = run_sync().await;
    let cleanups: Vec<_> = session
        .calls()
        .into_iter()
        .filter(|c| c.query.ends_with("RETURN COUNT(*) AS TotalCompleted"))
        .collect();

    assert!(!cleanups.is_empty(), "Cleanup jobs should run");
    for call in &cleanups {
        assert_eq!(call.params.get("UPDATE_TAG"), Some(&Value::from(UPDATE_TAG)));
        assert!(call.params.contains_key("LIMIT_SIZE"));
    }
    assert!(cleanups
        .iter()
        .any(|c| c.query.starts_with("MATCH (n:AzureSubnet)<-[s:RESOURCE]-(:AzureSubscription{id: $AZURE_SUBSCRIPTION_ID})")));

    let link_cleanup = cleanups
        .iter()
        .find(|c| c.query.contains("r._sub_resource_id = $_sub_resource_id"))
        .expect("MatchLink cleanup should run");
    assert_eq!(
        link_cleanup.params.get("_sub_resource_label"),
        Some(&Value::from("AzureSubscription"))
    );
    assert!(cleanups
        .iter()
        .all(|c| !c.query.starts_with("MATCH (n:AzureSubscription)")));
}

#[test]
fn test_transforms_keep_relationship_fields() {
    let inventory = read_cache_file(TEST_CACHE).expect("Failed to read test cache");

    let subnets = transform_subnets(&inventory.subnets);
    assert_eq!(subnets.len(), 3);
    assert!(subnets.iter().all(|s| s["VNET_ID"].is_string()));
    assert_eq!(subnets[2]["name"], "env-logs-crm-appgw-subnet");
    assert_eq!(subnets[2]["address_prefix"], "10.20.4.0/26");

    let nics = transform_network_interfaces(&inventory.network_interfaces);
    assert_eq!(nics[0]["SUBNET_IDS"].as_array().map(Vec::len), Some(1));
    assert_eq!(nics[1]["PUBLIC_IP_IDS"].as_array().map(Vec::len), Some(1));
    assert_eq!(nics[1]["mac_address"], Value::Null);
}
