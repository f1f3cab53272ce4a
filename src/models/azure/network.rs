//! Azure networking: virtual networks, subnets, NSGs, public IPs and network interfaces.
//!
//! Every node hangs off `(:AzureSubscription)-[:RESOURCE]->`, keyed by the
//! `AZURE_SUBSCRIPTION_ID` kwarg.

use crate::models::{
    make_source_node_matcher, make_target_node_matcher, LinkDirection, NodeSchema,
    OntologyFieldMapping, OntologyMapping, OntologyValue, Properties, PropertyRef, RelSchema,
    SpecialHandling,
};

const MODULE: &str = module_path!();

pub const SUBSCRIPTION_LABEL: &str = "AzureSubscription";
pub const SUBSCRIPTION_ID_KWARG: &str = "AZURE_SUBSCRIPTION_ID";

fn lastupdated_only() -> Properties {
    Properties::from([("lastupdated", PropertyRef::kwarg("lastupdated"))])
}

fn subscription_rel(name: &'static str) -> RelSchema {
    RelSchema::new(
        name,
        MODULE,
        SUBSCRIPTION_LABEL,
        make_target_node_matcher([("id", PropertyRef::kwarg(SUBSCRIPTION_ID_KWARG))]),
        LinkDirection::Inward,
        "RESOURCE",
        lastupdated_only(),
    )
}

pub fn virtual_network_schema() -> NodeSchema {
    NodeSchema::new(
        "AzureVirtualNetworkSchema",
        MODULE,
        "AzureVirtualNetwork",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("location", PropertyRef::new("location")),
            ("provisioning_state", PropertyRef::new("provisioning_state")),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
    .with_sub_resource(subscription_rel("AzureVirtualNetworkToSubscriptionRel"))
}

pub fn subnet_to_vnet_rel() -> RelSchema {
    RelSchema::new(
        "AzureSubnetToVNetRel",
        MODULE,
        "AzureVirtualNetwork",
        make_target_node_matcher([("id", PropertyRef::new("VNET_ID"))]),
        LinkDirection::Inward,
        "CONTAINS",
        lastupdated_only(),
    )
}

pub fn subnet_schema() -> NodeSchema {
    NodeSchema::new(
        "AzureSubnetSchema",
        MODULE,
        "AzureSubnet",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("address_prefix", PropertyRef::new("address_prefix").indexed()),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
    .with_sub_resource(subscription_rel("AzureSubnetToSubscriptionRel"))
    .with_other_relationships(vec![subnet_to_vnet_rel()])
}

/// MatchLink between subnets and NSGs that were loaded separately.
pub fn subnet_to_nsg_rel() -> RelSchema {
    RelSchema::new(
        "AzureSubnetToNSGRel",
        MODULE,
        "AzureNetworkSecurityGroup",
        make_target_node_matcher([("id", PropertyRef::new("NSG_ID"))]),
        LinkDirection::Outward,
        "ASSOCIATED_WITH",
        Properties::from([
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
            ("_sub_resource_label", PropertyRef::kwarg("_sub_resource_label")),
            ("_sub_resource_id", PropertyRef::kwarg("_sub_resource_id")),
        ]),
    )
    .with_source(
        "AzureSubnet",
        make_source_node_matcher([("id", PropertyRef::new("NODE_ID"))]),
    )
}

pub fn network_security_group_schema() -> NodeSchema {
    NodeSchema::new(
        "AzureNetworkSecurityGroupSchema",
        MODULE,
        "AzureNetworkSecurityGroup",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("location", PropertyRef::new("location")),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
    .with_sub_resource(subscription_rel("AzureNetworkSecurityGroupToSubscriptionRel"))
}

pub fn public_ip_address_schema() -> NodeSchema {
    NodeSchema::new(
        "AzurePublicIPAddressSchema",
        MODULE,
        "AzurePublicIPAddress",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("location", PropertyRef::new("location")),
            ("ip_address", PropertyRef::new("ip_address").indexed()),
            (
                "public_ip_allocation_method",
                PropertyRef::new("public_ip_allocation_method"),
            ),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
    .with_sub_resource(subscription_rel("AzurePublicIPAddressToSubscriptionRel"))
    .with_ontology(OntologyMapping {
        fields: vec![
            OntologyFieldMapping::new("ip_address", "ip_address"),
            OntologyFieldMapping::new("static", "public_ip_allocation_method")
                .handled(SpecialHandling::EqualBoolean(vec!["Static", "static"])),
            OntologyFieldMapping::new("provider", "")
                .handled(SpecialHandling::StaticValue(OntologyValue::Str("azure"))),
        ],
    })
}

pub fn network_interface_schema() -> NodeSchema {
    NodeSchema::new(
        "AzureNetworkInterfaceSchema",
        MODULE,
        "AzureNetworkInterface",
        Properties::from([
            ("id", PropertyRef::new("id")),
            ("name", PropertyRef::new("name")),
            ("location", PropertyRef::new("location")),
            ("mac_address", PropertyRef::new("mac_address")),
            ("private_ip_addresses", PropertyRef::new("private_ip_addresses")),
            ("lastupdated", PropertyRef::kwarg("lastupdated")),
        ]),
    )
    .with_sub_resource(subscription_rel("AzureNetworkInterfaceToSubscriptionRel"))
    .with_other_relationships(vec![
        RelSchema::new(
            "AzureNetworkInterfaceToVirtualMachineRel",
            MODULE,
            "AzureVirtualMachine",
            make_target_node_matcher([("id", PropertyRef::new("VIRTUAL_MACHINE_ID"))]),
            LinkDirection::Outward,
            "ATTACHED_TO",
            lastupdated_only(),
        ),
        RelSchema::new(
            "AzureNetworkInterfaceToSubnetRel",
            MODULE,
            "AzureSubnet",
            make_target_node_matcher([("id", PropertyRef::new("SUBNET_IDS").one_to_many())]),
            LinkDirection::Outward,
            "ATTACHED_TO",
            lastupdated_only(),
        ),
        RelSchema::new(
            "AzureNetworkInterfaceToPublicIPRel",
            MODULE,
            "AzurePublicIPAddress",
            make_target_node_matcher([("id", PropertyRef::new("PUBLIC_IP_IDS").one_to_many())]),
            LinkDirection::Outward,
            "ASSOCIATED_WITH",
            lastupdated_only(),
        ),
    ])
}
