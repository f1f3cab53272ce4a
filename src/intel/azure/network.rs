//! Azure networking: virtual networks, subnets, NSGs, public IPs and network interfaces.

use super::graph::run_resource_graph_query;
use crate::client::tx::{load, load_matchlinks};
use crate::client::{GraphSession, Params, Record};
use crate::error::{Error, Result};
use crate::graph::GraphJob;
use crate::models::azure::network::{
    network_interface_schema, network_security_group_schema, public_ip_address_schema,
    subnet_schema, subnet_to_nsg_rel, virtual_network_schema, SUBSCRIPTION_ID_KWARG,
    SUBSCRIPTION_LABEL,
};
use crate::models::azure::subscription::subscription_schema;
use crate::util::{run_bounded, timeit};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Subscriptions,
    VirtualNetworks,
    Subnets,
    NetworkSecurityGroups,
    PublicIpAddresses,
    NetworkInterfaces,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Subscriptions,
        ResourceKind::VirtualNetworks,
        ResourceKind::Subnets,
        ResourceKind::NetworkSecurityGroups,
        ResourceKind::PublicIpAddresses,
        ResourceKind::NetworkInterfaces,
    ];

    /// KQL for this kind. Must not contain single quotes; the CLI wraps it in them.
    pub fn query(&self) -> &'static str {
        match self {
            ResourceKind::Subscriptions => {
                r#"resourcecontainers
        | where type == "microsoft.resources/subscriptions"
        | project id=subscriptionId, name, tenant_id=tenantId, state=properties.state"#
            }
            ResourceKind::VirtualNetworks => {
                r#"resources
        | where type =~ "microsoft.network/virtualnetworks"
        | project id, name, location, properties"#
            }
            ResourceKind::Subnets => {
                r#"resources
        | where type =~ "microsoft.network/virtualnetworks"
        | mv-expand subnet=properties.subnets
        | project id=tostring(subnet.id), name=tostring(subnet.name), vnet_id=id, properties=subnet.properties"#
            }
            ResourceKind::NetworkSecurityGroups => {
                r#"resources
        | where type =~ "microsoft.network/networksecuritygroups"
        | project id, name, location"#
            }
            ResourceKind::PublicIpAddresses => {
                r#"resources
        | where type =~ "microsoft.network/publicipaddresses"
        | project id, name, location, properties"#
            }
            ResourceKind::NetworkInterfaces => {
                r#"resources
        | where type =~ "microsoft.network/networkinterfaces"
        | project id, name, location, properties"#
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Subscriptions => "subscriptions",
            ResourceKind::VirtualNetworks => "virtual networks",
            ResourceKind::Subnets => "subnets",
            ResourceKind::NetworkSecurityGroups => "network security groups",
            ResourceKind::PublicIpAddresses => "public IP addresses",
            ResourceKind::NetworkInterfaces => "network interfaces",
        }
    }
}

/// Raw resources of one subscription, as returned by Resource Graph or read from a cache file.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct NetworkInventory {
    #[serde(default)]
    pub subscriptions: Vec<Value>,
    #[serde(default)]
    pub virtual_networks: Vec<Value>,
    #[serde(default)]
    pub subnets: Vec<Value>,
    #[serde(default)]
    pub network_security_groups: Vec<Value>,
    #[serde(default)]
    pub public_ip_addresses: Vec<Value>,
    #[serde(default)]
    pub network_interfaces: Vec<Value>,
}

impl NetworkInventory {
    fn slot(&mut self, kind: ResourceKind) -> &mut Vec<Value> {
        match kind {
            ResourceKind::Subscriptions => &mut self.subscriptions,
            ResourceKind::VirtualNetworks => &mut self.virtual_networks,
            ResourceKind::Subnets => &mut self.subnets,
            ResourceKind::NetworkSecurityGroups => &mut self.network_security_groups,
            ResourceKind::PublicIpAddresses => &mut self.public_ip_addresses,
            ResourceKind::NetworkInterfaces => &mut self.network_interfaces,
        }
    }
}

/// Resource Graph query for one kind. Blocking.
pub fn query_resource_graph(kind: ResourceKind, subscription_id: &str) -> Result<Vec<Value>> {
    run_resource_graph_query(kind.query(), Some(subscription_id))
}

/// Fetches every resource kind with `fetch`, `max_workers` at a time, on blocking threads.
///
/// A kind whose fetch fails is logged and left empty so the other kinds still load; the
/// failed kinds are returned next to the inventory.
pub async fn get_network_inventory<F>(
    subscription_id: &str,
    max_workers: usize,
    fetch: F,
) -> (NetworkInventory, Vec<ResourceKind>)
where
    F: Fn(ResourceKind, &str) -> Result<Vec<Value>> + Clone + Send + Sync + 'static,
{
    let results = run_bounded(ResourceKind::ALL, max_workers, |kind| {
        let subscription_id = subscription_id.to_string();
        let fetch = fetch.clone();
        async move {
            let rows = tokio::task::spawn_blocking(move || fetch(kind, &subscription_id))
                .await
                .map_err(|e| Error::Vendor(format!("query task failed: {e}")))
                .and_then(|r| r);
            (kind, rows)
        }
    })
    .await;

    let mut inventory = NetworkInventory::default();
    let mut failed = Vec::new();
    for (kind, rows) in results {
        match rows {
            Ok(rows) => {
                log::info!("Got {} {}", rows.len(), kind.name());
                *inventory.slot(kind) = rows;
            }
            Err(e) => {
                log::warn!("Could not get {} for {subscription_id}: {e}", kind.name());
                failed.push(kind);
            }
        }
    }
    (inventory, failed)
}

/// Looks a property up under `properties` (Resource Graph, camelCase) or at the top
/// level (SDK style, snake_case). Nulls count as missing.
fn property<'a>(resource: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    let nested = resource
        .get("properties")
        .and_then(|p| p.get(camel).or_else(|| p.get(snake)));
    nested
        .or_else(|| resource.get(snake))
        .or_else(|| resource.get(camel))
        .filter(|v| !v.is_null())
}

fn reference_id<'a>(resource: &'a Value, camel: &str, snake: &str) -> Option<&'a str> {
    property(resource, camel, snake)
        .and_then(|r| r.get("id"))
        .and_then(Value::as_str)
}

fn field(resource: &Value, key: &str) -> Value {
    resource.get(key).cloned().unwrap_or(Value::Null)
}

fn to_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// `/subscriptions/../virtualNetworks/vnet/subnets/a` -> `/subscriptions/../virtualNetworks/vnet`
fn vnet_id_from_subnet_id(subnet_id: &str) -> Option<&str> {
    let lower = subnet_id.to_ascii_lowercase();
    lower.rfind("/subnets/").map(|pos| &subnet_id[..pos])
}

pub fn transform_subscriptions(subscriptions: &[Value]) -> Vec<Record> {
    subscriptions
        .iter()
        .map(|s| {
            to_record(json!({
                "id": field(s, "id"),
                "name": field(s, "name"),
                "tenant_id": field(s, "tenant_id"),
                "state": field(s, "state"),
            }))
        })
        .collect()
}

pub fn transform_virtual_networks(vnets: &[Value]) -> Vec<Record> {
    vnets
        .iter()
        .map(|vnet| {
            to_record(json!({
                "id": field(vnet, "id"),
                "name": field(vnet, "name"),
                "location": field(vnet, "location"),
                "provisioning_state": property(vnet, "provisioningState", "provisioning_state"),
            }))
        })
        .collect()
}

/// Keeps `VNET_ID` and `nsg_id` for the VNet relationship and the NSG MatchLinks.
pub fn transform_subnets(subnets: &[Value]) -> Vec<Record> {
    subnets
        .iter()
        .map(|subnet| {
            let id = subnet.get("id").and_then(Value::as_str);
            let vnet_id = subnet
                .get("vnet_id")
                .and_then(Value::as_str)
                .or_else(|| id.and_then(vnet_id_from_subnet_id));
            to_record(json!({
                "id": id,
                "name": field(subnet, "name"),
                "address_prefix": property(subnet, "addressPrefix", "address_prefix"),
                "nsg_id": reference_id(subnet, "networkSecurityGroup", "network_security_group"),
                "VNET_ID": vnet_id,
            }))
        })
        .collect()
}

pub fn transform_network_security_groups(nsgs: &[Value]) -> Vec<Record> {
    nsgs.iter()
        .map(|nsg| {
            to_record(json!({
                "id": field(nsg, "id"),
                "name": field(nsg, "name"),
                "location": field(nsg, "location"),
            }))
        })
        .collect()
}

pub fn transform_public_ip_addresses(public_ips: &[Value]) -> Vec<Record> {
    public_ips
        .iter()
        .map(|ip| {
            to_record(json!({
                "id": field(ip, "id"),
                "name": field(ip, "name"),
                "location": field(ip, "location"),
                "ip_address": property(ip, "ipAddress", "ip_address"),
                "public_ip_allocation_method":
                    property(ip, "publicIPAllocationMethod", "public_ip_allocation_method"),
            }))
        })
        .collect()
}

/// Collects subnet and public IP ids of every IP configuration into `SUBNET_IDS` and
/// `PUBLIC_IP_IDS` for the one-to-many relationships.
pub fn transform_network_interfaces(interfaces: &[Value]) -> Vec<Record> {
    interfaces
        .iter()
        .map(|nic| {
            let mut subnet_ids: Vec<&str> = Vec::new();
            let mut public_ip_ids: Vec<&str> = Vec::new();
            let mut private_ips: Vec<&str> = Vec::new();

            let configs = property(nic, "ipConfigurations", "ip_configurations")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for config in configs {
                if let Some(id) = reference_id(config, "subnet", "subnet") {
                    subnet_ids.push(id);
                }
                if let Some(id) = reference_id(config, "publicIPAddress", "public_ip_address") {
                    public_ip_ids.push(id);
                }
                if let Some(ip) = property(config, "privateIPAddress", "private_ip_address")
                    .and_then(Value::as_str)
                {
                    private_ips.push(ip);
                }
            }

            to_record(json!({
                "id": field(nic, "id"),
                "name": field(nic, "name"),
                "location": field(nic, "location"),
                "mac_address": property(nic, "macAddress", "mac_address"),
                "private_ip_addresses": private_ips,
                "VIRTUAL_MACHINE_ID": reference_id(nic, "virtualMachine", "virtual_machine"),
                "SUBNET_IDS": subnet_ids,
                "PUBLIC_IP_IDS": public_ip_ids,
            }))
        })
        .collect()
}

/// `{NODE_ID, NSG_ID}` for every subnet with an NSG.
pub fn subnet_nsg_links(subnets: &[Record]) -> Vec<Record> {
    subnets
        .iter()
        .filter_map(|subnet| {
            let nsg_id = subnet.get("nsg_id").and_then(Value::as_str)?;
            Some(to_record(json!({
                "NODE_ID": subnet.get("id").cloned().unwrap_or(Value::Null),
                "NSG_ID": nsg_id,
            })))
        })
        .collect()
}

/// Everything needed to load one subscription.
pub struct SyncContext<'a> {
    pub session: &'a dyn GraphSession,
    pub subscription_id: &'a str,
    pub update_tag: i64,
    pub batch_size: usize,
    pub common_job_parameters: &'a Params,
}

impl SyncContext<'_> {
    fn load_kwargs(&self) -> Params {
        let mut kwargs = Params::new();
        kwargs.insert("lastupdated".into(), Value::from(self.update_tag));
        kwargs.insert(SUBSCRIPTION_ID_KWARG.into(), Value::from(self.subscription_id));
        kwargs
    }
}

pub async fn load_subscription(ctx: &SyncContext<'_>, subscriptions: &[Value]) -> Result<()> {
    let mut records = transform_subscriptions(subscriptions);
    records.retain(|r| r.get("id").and_then(Value::as_str) == Some(ctx.subscription_id));
    if records.is_empty() {
        // Resource Graph may not list it; relationships still need the node.
        records.push(to_record(json!({ "id": ctx.subscription_id })));
    }
    load(
        ctx.session,
        &subscription_schema(),
        &records,
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await
}

async fn sync_virtual_networks(ctx: &SyncContext<'_>, vnets: &[Value]) -> Result<()> {
    let schema = virtual_network_schema();
    load(
        ctx.session,
        &schema,
        &transform_virtual_networks(vnets),
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await?;
    GraphJob::from_node_schema(&schema, ctx.common_job_parameters)?
        .run(ctx.session)
        .await
}

async fn sync_network_security_groups(ctx: &SyncContext<'_>, nsgs: &[Value]) -> Result<()> {
    let schema = network_security_group_schema();
    load(
        ctx.session,
        &schema,
        &transform_network_security_groups(nsgs),
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await?;
    GraphJob::from_node_schema(&schema, ctx.common_job_parameters)?
        .run(ctx.session)
        .await
}

/// All subnets of the subscription load in one pass, so cleanup is scoped to the
/// subscription rather than to each VNet.
async fn sync_subnets(ctx: &SyncContext<'_>, subnets: &[Value]) -> Result<()> {
    let schema = subnet_schema();
    let records = transform_subnets(subnets);
    load(
        ctx.session,
        &schema,
        &records,
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await?;

    let rel = subnet_to_nsg_rel();
    let mut link_kwargs = ctx.load_kwargs();
    link_kwargs.insert("_sub_resource_label".into(), Value::from(SUBSCRIPTION_LABEL));
    link_kwargs.insert("_sub_resource_id".into(), Value::from(ctx.subscription_id));
    load_matchlinks(
        ctx.session,
        &rel,
        &subnet_nsg_links(&records),
        ctx.batch_size,
        &link_kwargs,
    )
    .await?;

    GraphJob::from_node_schema(&schema, ctx.common_job_parameters)?
        .run(ctx.session)
        .await?;
    GraphJob::from_matchlink(&rel, SUBSCRIPTION_LABEL, ctx.subscription_id, ctx.update_tag)?
        .run(ctx.session)
        .await
}

async fn sync_public_ip_addresses(ctx: &SyncContext<'_>, public_ips: &[Value]) -> Result<()> {
    let schema = public_ip_address_schema();
    load(
        ctx.session,
        &schema,
        &transform_public_ip_addresses(public_ips),
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await?;
    GraphJob::from_node_schema(&schema, ctx.common_job_parameters)?
        .run(ctx.session)
        .await
}

async fn sync_network_interfaces(ctx: &SyncContext<'_>, interfaces: &[Value]) -> Result<()> {
    let schema = network_interface_schema();
    load(
        ctx.session,
        &schema,
        &transform_network_interfaces(interfaces),
        ctx.batch_size,
        &ctx.load_kwargs(),
    )
    .await?;
    GraphJob::from_node_schema(&schema, ctx.common_job_parameters)?
        .run(ctx.session)
        .await
}

/// Loads `inventory` and removes what it no longer contains.
///
/// Subnets load after VNets and NSGs, and NICs last, so their relationships find their targets.
pub async fn sync(ctx: &SyncContext<'_>, inventory: &NetworkInventory) -> Result<()> {
    log::info!("Syncing Azure networking for subscription {}", ctx.subscription_id);
    timeit("load_subscription", load_subscription(ctx, &inventory.subscriptions)).await?;
    timeit("sync_virtual_networks", sync_virtual_networks(ctx, &inventory.virtual_networks)).await?;
    timeit(
        "sync_network_security_groups",
        sync_network_security_groups(ctx, &inventory.network_security_groups),
    )
    .await?;
    timeit("sync_subnets", sync_subnets(ctx, &inventory.subnets)).await?;
    timeit(
        "sync_public_ip_addresses",
        sync_public_ip_addresses(ctx, &inventory.public_ip_addresses),
    )
    .await?;
    timeit(
        "sync_network_interfaces",
        sync_network_interfaces(ctx, &inventory.network_interfaces),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_subnet_resource_graph_shape() {
        let subnets = vec![json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/app",
            "name": "app",
            "vnet_id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1",
            "properties": {
                "addressPrefix": "10.0.1.0/24",
                "networkSecurityGroup": {"id": "nsg-1"}
            }
        })];
        let records = transform_subnets(&subnets);
        assert_eq!(records[0]["address_prefix"], "10.0.1.0/24");
        assert_eq!(records[0]["nsg_id"], "nsg-1");
        assert_eq!(
            records[0]["VNET_ID"],
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1"
        );
    }

    #[test]
    fn test_transform_subnet_flat_shape_derives_vnet() {
        let subnets = vec![json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet2/Subnets/db",
            "name": "db",
            "address_prefix": "10.0.2.0/24"
        })];
        let records = transform_subnets(&subnets);
        assert_eq!(records[0]["address_prefix"], "10.0.2.0/24");
        assert_eq!(records[0]["nsg_id"], Value::Null);
        assert_eq!(
            records[0]["VNET_ID"],
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet2"
        );
        assert!(subnet_nsg_links(&records).is_empty());
    }

    #[test]
    fn test_transform_public_ip_both_shapes() {
        let ips = vec![
            json!({"id": "ip-1", "name": "a", "properties": {"ipAddress": "1.2.3.4", "publicIPAllocationMethod": "Static"}}),
            json!({"id": "ip-2", "name": "b", "ip_address": "5.6.7.8", "public_ip_allocation_method": "Dynamic"}),
        ];
        let records = transform_public_ip_addresses(&ips);
        assert_eq!(records[0]["ip_address"], "1.2.3.4");
        assert_eq!(records[0]["public_ip_allocation_method"], "Static");
        assert_eq!(records[1]["ip_address"], "5.6.7.8");
    }

    #[test]
    fn test_transform_network_interfaces() {
        let nics = vec![
            json!({
                "id": "nic-1",
                "name": "nic-1",
                "location": "eastus",
                "properties": {
                    "macAddress": "00-0D-3A-1B-2C-3D",
                    "virtualMachine": {"id": "vm-1"},
                    "ipConfigurations": [
                        {"properties": {"subnet": {"id": "subnet-1"}, "privateIPAddress": "10.0.1.4", "publicIPAddress": {"id": "ip-1"}}},
                        {"subnet": {"id": "subnet-2"}, "private_ip_address": "10.0.2.4"}
                    ]
                }
            }),
            json!({"id": "nic-2", "name": "unattached", "virtual_machine": null}),
        ];
        let records = transform_network_interfaces(&nics);
        assert_eq!(records[0]["SUBNET_IDS"], json!(["subnet-1", "subnet-2"]));
        assert_eq!(records[0]["PUBLIC_IP_IDS"], json!(["ip-1"]));
        assert_eq!(records[0]["private_ip_addresses"], json!(["10.0.1.4", "10.0.2.4"]));
        assert_eq!(records[0]["VIRTUAL_MACHINE_ID"], "vm-1");
        assert_eq!(records[0]["mac_address"], "00-0D-3A-1B-2C-3D");
        assert_eq!(records[1]["VIRTUAL_MACHINE_ID"], Value::Null);
        assert_eq!(records[1]["SUBNET_IDS"], json!([]));
    }

    #[test]
    fn test_subnet_nsg_links() {
        let records = transform_subnets(&[json!({
            "id": "subnet-1",
            "vnet_id": "vnet-1",
            "network_security_group": {"id": "nsg-1"}
        })]);
        let links = subnet_nsg_links(&records);
        assert_eq!(links, vec![to_record(json!({"NODE_ID": "subnet-1", "NSG_ID": "nsg-1"}))]);
    }

    #[tokio::test]
    async fn test_failed_kind_comes_back_empty() {
        let (inventory, failed) = get_network_inventory("sub-1", 2, |kind, subscription_id| {
            if kind == ResourceKind::Subnets {
                return Err(Error::Vendor("az: throttled".to_string()));
            }
            Ok(vec![json!({"id": format!("{subscription_id}/{}", kind.name())})])
        })
        .await;

        assert_eq!(failed, vec![ResourceKind::Subnets]);
        assert!(inventory.subnets.is_empty());
        assert_eq!(inventory.virtual_networks, vec![json!({"id": "sub-1/virtual networks"})]);
        assert_eq!(inventory.subscriptions.len(), 1);
        assert_eq!(inventory.network_security_groups.len(), 1);
        assert_eq!(inventory.public_ip_addresses.len(), 1);
        assert_eq!(inventory.network_interfaces.len(), 1);
    }

    #[test]
    fn test_queries_have_no_single_quotes() {
        for kind in ResourceKind::ALL {
            assert!(!kind.query().contains('\''), "{}", kind.name());
        }
    }
}
