//! Generates the queries that delete stale nodes and relationships of a schema.
//!
//! Something is stale when its `lastupdated` differs from `$UPDATE_TAG`. Deletion is
//! scoped to the sub resource the sync ran against (e.g. one Azure subscription), so
//! syncing one account never removes data of another. Every query deletes at most
//! `$LIMIT_SIZE` items and is meant to be repeated until it affects nothing.

use crate::error::SchemaError;
use crate::graph::querybuilder::{
    filter_selected_relationships, sub_resource_scope, validate_sub_resource_matcher,
};
use crate::models::{LinkDirection, NodeSchema, RelSchema};

/// Cleanup queries for `schema`, in the order they must run.
///
/// - unscoped schemas: stale nodes of the label everywhere, then stale relationships
/// - no sub resource: stale relationships only; nodes may belong to several scopes
/// - otherwise: stale nodes and sub resource relationships in scope, then each other relationship
pub fn build_cleanup_queries(schema: &NodeSchema) -> Result<Vec<String>, SchemaError> {
    if !schema.scoped_cleanup {
        if schema.sub_resource_relationship.is_some() {
            return Err(SchemaError::UnscopedCleanupWithSubResource {
                label: schema.label,
            });
        }
        let mut queries = vec![format!(
            "MATCH (n:{})\nWHERE n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n;",
            schema.label
        )];
        queries.extend(other_rel_queries_no_sub_resource(schema)?);
        return Ok(queries);
    }

    let Some(sub_resource) = &schema.sub_resource_relationship else {
        return other_rel_queries_no_sub_resource(schema);
    };

    let mut queries: Vec<String> =
        build_cleanup_node_and_rel_queries(schema, sub_resource)?.into();
    if let Some(other) = &schema.other_relationships {
        for rel in &other.rels {
            let [_, rel_query] = build_cleanup_node_and_rel_queries(schema, rel)?;
            queries.push(rel_query);
        }
    }
    Ok(queries)
}

fn other_rel_queries_no_sub_resource(schema: &NodeSchema) -> Result<Vec<String>, SchemaError> {
    schema
        .other_relationships
        .iter()
        .flat_map(|other| other.rels.iter())
        .map(|rel| build_cleanup_rel_query_no_sub_resource(schema, rel))
        .collect()
}

fn rel_pattern(rel: &RelSchema) -> String {
    match rel.direction {
        LinkDirection::Inward => format!("<-[r:{}]-(:{})", rel.rel_label, rel.target_node_label),
        LinkDirection::Outward => format!("-[r:{}]->(:{})", rel.rel_label, rel.target_node_label),
    }
}

/// Stale `rel` relationships of nodes that have no sub resource.
pub fn build_cleanup_rel_query_no_sub_resource(
    schema: &NodeSchema,
    rel: &RelSchema,
) -> Result<String, SchemaError> {
    if schema.sub_resource_relationship.is_some() {
        return Err(SchemaError::UnexpectedSubResource {
            label: schema.label,
        });
    }
    Ok(format!(
        "MATCH (n:{label})\nMATCH (n){pattern}\nWHERE r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r;",
        label = schema.label,
        pattern = rel_pattern(rel),
    ))
}

/// Node and relationship cleanup for one selected relationship of a sub resource scoped schema.
///
/// For the sub resource relationship itself the pair deletes stale nodes and stale
/// `s` edges; for any other relationship it is restricted to nodes having that
/// relationship and deletes stale `r` edges.
pub fn build_cleanup_node_and_rel_queries(
    schema: &NodeSchema,
    selected: &RelSchema,
) -> Result<[String; 2], SchemaError> {
    let Some(sub_resource) = &schema.sub_resource_relationship else {
        return Err(SchemaError::UndefinedRelationship {
            rel: selected.name,
            schema: schema.name,
        });
    };
    validate_sub_resource_matcher(schema)?;

    let (selected_sub_resource, others) = filter_selected_relationships(schema, &[selected])?;

    // the sub resource edge is named `s` so scoping and deletion can both refer to it
    let scope = sub_resource_scope(schema).replacen(
        &format!("[:{}]", sub_resource.rel_label),
        &format!("[s:{}]", sub_resource.rel_label),
        1,
    );
    let scoped_match = format!("MATCH (n:{}){scope}", schema.label);

    if selected_sub_resource.is_some() {
        return Ok([
            format!("{scoped_match}\nWHERE n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n;"),
            format!("{scoped_match}\nWHERE s.lastupdated <> $UPDATE_TAG\nWITH s LIMIT $LIMIT_SIZE\nDELETE s;"),
        ]);
    }

    let rel_match = others
        .first()
        .map(|rel| format!("\nMATCH (n){}", rel_pattern(rel)))
        .unwrap_or_default();
    Ok([
        format!("{scoped_match}{rel_match}\nWHERE n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n;"),
        format!("{scoped_match}{rel_match}\nWHERE r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r;"),
    ])
}

/// Stale MatchLinks of `rel` written for one sub resource.
pub fn build_cleanup_query_for_matchlink(rel: &RelSchema) -> Result<String, SchemaError> {
    let Some(source_label) = rel.source_node_label else {
        return Err(SchemaError::MissingSourceNode { rel: rel.name });
    };
    let pattern = match rel.direction {
        LinkDirection::Inward => format!("<-[r:{}]-", rel.rel_label),
        LinkDirection::Outward => format!("-[r:{}]->", rel.rel_label),
    };
    Ok(format!(
        "MATCH (from:{source_label}){pattern}(to:{target})
WHERE r.lastupdated <> $UPDATE_TAG
    AND r._sub_resource_label = $_sub_resource_label
    AND r._sub_resource_id = $_sub_resource_id
WITH r LIMIT $LIMIT_SIZE
DELETE r;",
        target = rel.target_node_label,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::azure::network;
    use crate::models::{make_target_node_matcher, Properties, PropertyRef};

    const MODULE: &str = "cartography::models::test";

    fn rel(
        name: &'static str,
        target: &'static str,
        direction: LinkDirection,
        label: &'static str,
        matcher: PropertyRef,
    ) -> RelSchema {
        RelSchema::new(
            name,
            MODULE,
            target,
            make_target_node_matcher([("id", matcher)]),
            direction,
            label,
            Properties::from([("lastupdated", PropertyRef::kwarg("lastupdated"))]),
        )
    }

    fn sub_resource_rel() -> RelSchema {
        rel(
            "InterestingAssetToSubResourceRel",
            "SubResource",
            LinkDirection::Inward,
            "RELATIONSHIP_LABEL",
            PropertyRef::kwarg("sub_resource_id"),
        )
    }

    fn hello_rel() -> RelSchema {
        rel(
            "InterestingAssetToHelloAssetRel",
            "HelloAsset",
            LinkDirection::Outward,
            "ASSOCIATED_WITH",
            PropertyRef::new("hello_asset_id"),
        )
    }

    fn world_rel() -> RelSchema {
        rel(
            "InterestingAssetToWorldAssetRel",
            "WorldAsset",
            LinkDirection::Inward,
            "CONNECTED",
            PropertyRef::new("world_asset_id"),
        )
    }

    fn base(label: &'static str) -> NodeSchema {
        NodeSchema::new(
            "InterestingAssetSchema",
            MODULE,
            label,
            Properties::from([
                ("id", PropertyRef::new("Id")),
                ("lastupdated", PropertyRef::kwarg("lastupdated")),
            ]),
        )
    }

    fn interesting_asset() -> NodeSchema {
        base("InterestingAsset")
            .with_sub_resource(sub_resource_rel())
            .with_other_relationships(vec![hello_rel(), world_rel()])
    }

    const SCOPE: &str =
        "MATCH (n:InterestingAsset)<-[s:RELATIONSHIP_LABEL]-(:SubResource{id: $sub_resource_id})";

    #[test]
    fn test_cleanup_sub_rel() {
        let queries = build_cleanup_node_and_rel_queries(&interesting_asset(), &sub_resource_rel())
            .unwrap();
        assert_eq!(
            queries,
            [
                format!("{SCOPE}\nWHERE n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n;"),
                format!("{SCOPE}\nWHERE s.lastupdated <> $UPDATE_TAG\nWITH s LIMIT $LIMIT_SIZE\nDELETE s;"),
            ]
        );
    }

    #[test]
    fn test_cleanup_with_selected_rel() {
        let queries =
            build_cleanup_node_and_rel_queries(&interesting_asset(), &hello_rel()).unwrap();
        assert_eq!(
            queries[1],
            format!("{SCOPE}\nMATCH (n)-[r:ASSOCIATED_WITH]->(:HelloAsset)\nWHERE r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r;")
        );
        assert!(queries[0].contains("MATCH (n)-[r:ASSOCIATED_WITH]->(:HelloAsset)\nWHERE n.lastupdated"));
    }

    #[test]
    fn test_cleanup_with_invalid_selected_rel() {
        let foreign = rel(
            "EMRClusterToAWSAccountRel",
            "AWSAccount",
            LinkDirection::Inward,
            "RESOURCE",
            PropertyRef::kwarg("AWS_ID"),
        );
        let err = build_cleanup_node_and_rel_queries(&interesting_asset(), &foreign).unwrap_err();
        assert!(err
            .to_string()
            .contains("EMRClusterToAWSAccountRel is not defined on node schema InterestingAssetSchema"));
    }

    #[test]
    fn test_build_cleanup_queries_order() {
        let queries = build_cleanup_queries(&interesting_asset()).unwrap();
        assert_eq!(queries.len(), 4);
        assert!(queries[0].ends_with("DETACH DELETE n;"));
        assert!(queries[1].ends_with("DELETE s;"));
        assert!(queries[2].contains("MATCH (n)-[r:ASSOCIATED_WITH]->(:HelloAsset)"));
        assert_eq!(
            queries[3],
            format!("{SCOPE}\nMATCH (n)<-[r:CONNECTED]-(:WorldAsset)\nWHERE r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r;")
        );
    }

    #[test]
    fn test_sub_resource_matcher_must_be_kwarg() {
        let not_kwarg = rel(
            "FakeEC2InstanceToAWSAccountRel",
            "AWSAccount",
            LinkDirection::Inward,
            "RESOURCE",
            PropertyRef::new("AccountId"),
        );
        let schema = base("FakeEC2Instance").with_sub_resource(not_kwarg.clone());
        let err = build_cleanup_node_and_rel_queries(&schema, &not_kwarg).unwrap_err();
        assert!(err.to_string().contains("must have set_in_kwargs=True"));
    }

    #[test]
    fn test_no_sub_resource_only_cleans_relationships() {
        let member_of = rel(
            "GitHubUserMemberOfOrganizationRel",
            "GitHubOrganization",
            LinkDirection::Outward,
            "MEMBER_OF",
            PropertyRef::new("org"),
        );
        let schema = base("GitHubUser").with_other_relationships(vec![member_of]);
        assert_eq!(
            build_cleanup_queries(&schema).unwrap(),
            vec!["MATCH (n:GitHubUser)\nMATCH (n)-[r:MEMBER_OF]->(:GitHubOrganization)\nWHERE r.lastupdated <> $UPDATE_TAG\nWITH r LIMIT $LIMIT_SIZE\nDELETE r;"]
        );
    }

    #[test]
    fn test_no_relationships_no_queries() {
        assert!(build_cleanup_queries(&base("SimpleNode")).unwrap().is_empty());
    }

    #[test]
    fn test_rel_query_no_sub_resource_rejects_sub_resource() {
        let err = build_cleanup_rel_query_no_sub_resource(&interesting_asset(), &hello_rel())
            .unwrap_err();
        assert!(err.to_string().starts_with("Expected InterestingAsset to not exist"));
    }

    #[test]
    fn test_unscoped_cleanup() {
        let schema = base("UnscopedNode")
            .with_other_relationships(vec![hello_rel()])
            .unscoped_cleanup();
        let queries = build_cleanup_queries(&schema).unwrap();
        assert_eq!(
            queries[0],
            "MATCH (n:UnscopedNode)\nWHERE n.lastupdated <> $UPDATE_TAG\nWITH n LIMIT $LIMIT_SIZE\nDETACH DELETE n;"
        );
        assert_eq!(queries.len(), 2);

        let invalid = interesting_asset().unscoped_cleanup();
        assert_eq!(
            build_cleanup_queries(&invalid),
            Err(SchemaError::UnscopedCleanupWithSubResource {
                label: "InterestingAsset"
            })
        );
    }

    #[test]
    fn test_matchlink_cleanup() {
        assert_eq!(
            build_cleanup_query_for_matchlink(&network::subnet_to_nsg_rel()).unwrap(),
            "MATCH (from:AzureSubnet)-[r:ASSOCIATED_WITH]->(to:AzureNetworkSecurityGroup)
WHERE r.lastupdated <> $UPDATE_TAG
    AND r._sub_resource_label = $_sub_resource_label
    AND r._sub_resource_id = $_sub_resource_id
WITH r LIMIT $LIMIT_SIZE
DELETE r;"
        );
    }
}
