//! Generates ingestion, MatchLink, index and conditional label queries from schemas.
//!
//! Ingestion queries expect the records in `$DictList` and use the UNWIND + MERGE
//! pattern: one query per batch, one MERGE per record. Relationships are attached in
//! a `CALL { .. UNION .. }` subquery so a record missing one relationship target still
//! gets the others.

use crate::error::SchemaError;
use crate::models::{
    LinkDirection, MatchMode, NodeMatcher, NodeSchema, OntologyFieldMapping, OntologyValue,
    Properties, PropertyRef, RelSchema, SpecialHandling,
};
use itertools::Itertools;

const INDEX_PREFIX: &str = "CREATE INDEX IF NOT EXISTS";

/// `cartography:<provider>` for schemas under `cartography::models::<provider>`.
pub fn module_name(module: &str) -> String {
    let parts: Vec<&str> = module.split("::").collect();
    if parts.len() > 2 && parts[0] == "cartography" && parts[1] == "models" {
        format!("cartography:{}", parts[2])
    } else {
        log::warn!("Schema declared outside cartography::models: {module}");
        format!("unknown:{module}")
    }
}

pub fn module_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Escapes a value for a double quoted Cypher string literal.
pub fn escape_cypher_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_single_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

pub fn validate_node_schema(schema: &NodeSchema) -> Result<(), SchemaError> {
    for required in ["id", "lastupdated"] {
        if !schema.properties.contains(required) {
            return Err(SchemaError::MissingRequiredProperty {
                schema: schema.name,
                property: required,
            });
        }
    }
    if schema.properties.contains("firstseen") {
        return Err(SchemaError::ReservedProperty {
            schema: schema.name,
            property: "firstseen",
        });
    }
    for rel in schema.all_relationships() {
        validate_rel_properties(rel)?;
    }
    Ok(())
}

fn validate_rel_properties(rel: &RelSchema) -> Result<(), SchemaError> {
    if rel.properties.contains("firstseen") {
        return Err(SchemaError::ReservedProperty {
            schema: rel.name,
            property: "firstseen",
        });
    }
    if !rel.properties.contains("lastupdated") {
        return Err(SchemaError::MissingRequiredProperty {
            schema: rel.name,
            property: "lastupdated",
        });
    }
    Ok(())
}

/// `key: ref, key2: ref2` for use inside a node pattern.
fn build_match_clause(matcher: &NodeMatcher) -> String {
    matcher
        .iter()
        .map(|(key, prop_ref)| format!("{key}: {prop_ref}"))
        .join(", ")
}

/// Same as [`build_match_clause`] but as a WHERE clause, honouring each ref's match mode.
pub fn build_where_clause_for_rel_match(node_var: &str, matcher: &NodeMatcher) -> String {
    matcher
        .iter()
        .map(|(key, prop_ref)| match prop_ref.match_mode {
            MatchMode::Exact => format!("{node_var}.{key} = {prop_ref}"),
            MatchMode::IgnoreCase => format!("toLower({node_var}.{key}) = toLower({prop_ref})"),
            MatchMode::FuzzyIgnoreCase => {
                format!("toLower({node_var}.{key}) CONTAINS toLower({prop_ref})")
            }
            MatchMode::OneToMany => format!("{node_var}.{key} IN {prop_ref}"),
        })
        .join(" AND\n")
}

fn build_node_properties_statement(schema: &NodeSchema) -> String {
    let mut clauses: Vec<String> = schema
        .properties
        .iter()
        // `id` is already set by the MERGE
        .filter(|(key, _)| *key != "id")
        .map(|(key, prop_ref)| format!("i.{key} = {prop_ref}"))
        .collect();

    if let Some(extra) = &schema.extra_node_labels {
        let plain: Vec<&str> = extra.plain().collect();
        if !plain.is_empty() {
            clauses.push(format!("i:{}", plain.join(":")));
        }
    }
    clauses.join(",\n    ")
}

fn build_rel_properties_statement(rel_var: &str, props: &Properties) -> String {
    props
        .iter()
        .map(|(key, prop_ref)| format!("{rel_var}.{key} = {prop_ref}"))
        .join(",\n        ")
}

fn build_ontology_field_statement(
    mapping: &OntologyFieldMapping,
    props: &Properties,
) -> Option<String> {
    let target = format!("i._ont_{}", mapping.ontology_field);

    if let Some(SpecialHandling::StaticValue(value)) = &mapping.special_handling {
        let literal = match value {
            OntologyValue::Str(s) => format!("\"{}\"", escape_cypher_string(s)),
            OntologyValue::Bool(b) => b.to_string(),
            OntologyValue::Int(n) => n.to_string(),
        };
        return Some(format!("{target} = {literal}"));
    }

    let Some(prop_ref) = props.get(mapping.node_field) else {
        log::warn!(
            "Ontology field `{}` maps missing node property `{}`",
            mapping.ontology_field,
            mapping.node_field
        );
        return None;
    };

    let with_extra_fields = |fields: &[&'static str], term: fn(&PropertyRef) -> String| {
        std::iter::once(term(prop_ref))
            .chain(fields.iter().filter_map(|field| match props.get(field) {
                Some(extra) => Some(term(extra)),
                None => {
                    log::warn!(
                        "Extra field `{field}` of ontology field `{}` is not a node property",
                        mapping.ontology_field
                    );
                    None
                }
            }))
            .collect::<Vec<_>>()
    };

    let statement = match &mapping.special_handling {
        None => format!("{target} = {prop_ref}"),
        Some(SpecialHandling::InvertBoolean) => {
            format!("{target} = (NOT(coalesce(toBooleanOrNull({prop_ref}), false)))")
        }
        Some(SpecialHandling::ToBoolean) => format!(
            "{target} = coalesce(toBooleanOrNull({prop_ref}), ({prop_ref} IS NOT NULL))"
        ),
        Some(SpecialHandling::EqualBoolean(values)) => {
            let list = values
                .iter()
                .map(|v| format!("'{}'", escape_single_quoted(v)))
                .join(", ");
            format!("{target} = ({prop_ref} IN [{list}])")
        }
        Some(SpecialHandling::OrBoolean(fields)) => {
            let terms = with_extra_fields(fields, |r| {
                format!("coalesce(toBooleanOrNull({r}), false)")
            });
            format!("{target} = ({})", terms.join(" OR "))
        }
        Some(SpecialHandling::NorBoolean(fields)) => {
            let terms = with_extra_fields(fields, |r| {
                format!("NOT(coalesce(toBooleanOrNull({r}), false))")
            });
            format!("{target} = ({})", terms.join(" AND "))
        }
        Some(SpecialHandling::StaticValue(_)) => return None,
    };
    Some(statement)
}

/// The `_ont_*` SET clauses, prefixed with a separator; empty without an ontology mapping.
pub fn build_ontology_node_properties_statement(schema: &NodeSchema) -> String {
    let Some(mapping) = &schema.ontology else {
        return String::new();
    };
    let module = module_name(schema.module);
    let source = module.rsplit(':').next().unwrap_or(&module);

    let mut clauses = vec![format!("i._ont_source = '{source}'")];
    clauses.extend(
        mapping
            .fields
            .iter()
            .filter_map(|field| build_ontology_field_statement(field, &schema.properties)),
    );
    format!(",\n    {}", clauses.join(",\n    "))
}

fn rel_merge(rel_var: &str, node_var: &str, rel: &RelSchema) -> String {
    match rel.direction {
        LinkDirection::Inward => format!("MERGE (i)<-[{rel_var}:{}]-({node_var})", rel.rel_label),
        LinkDirection::Outward => format!("MERGE (i)-[{rel_var}:{}]->({node_var})", rel.rel_label),
    }
}

fn build_attach_sub_resource_statement(rel: &RelSchema) -> String {
    format!(
        "    WITH i, item
    OPTIONAL MATCH (j:{label}{{{matcher}}})
    WITH i, item, j WHERE j IS NOT NULL
    {merge}
    ON CREATE SET r.firstseen = timestamp()
    SET
        r._module_name = \"{module_name}\",
        r._module_version = \"{module_version}\",
        {props}
",
        label = rel.target_node_label,
        matcher = build_match_clause(&rel.target_node_matcher),
        merge = rel_merge("r", "j", rel),
        module_name = module_name(rel.module),
        module_version = module_version(),
        props = build_rel_properties_statement("r", &rel.properties),
    )
}

fn build_attach_additional_link_statement(num: usize, rel: &RelSchema) -> String {
    let node_var = format!("n{num}");
    let rel_var = format!("r{num}");
    format!(
        "    WITH i, item
    OPTIONAL MATCH ({node_var}:{label})
    WHERE
        {where_clause}
    WITH i, item, {node_var} WHERE {node_var} IS NOT NULL
    {merge}
    ON CREATE SET {rel_var}.firstseen = timestamp()
    SET
        {rel_var}._module_name = \"{module_name}\",
        {rel_var}._module_version = \"{module_version}\",
        {props}
",
        label = rel.target_node_label,
        where_clause = build_where_clause_for_rel_match(&node_var, &rel.target_node_matcher)
            .replace('\n', "\n        "),
        merge = rel_merge(&rel_var, &node_var, rel),
        module_name = module_name(rel.module),
        module_version = module_version(),
        props = build_rel_properties_statement(&rel_var, &rel.properties),
    )
}

fn build_attach_relationships_statement(
    sub_resource: Option<&RelSchema>,
    others: &[&RelSchema],
) -> String {
    let statements: Vec<String> = sub_resource
        .map(build_attach_sub_resource_statement)
        .into_iter()
        .chain(
            others
                .iter()
                .enumerate()
                .map(|(num, rel)| build_attach_additional_link_statement(num, rel)),
        )
        .collect();

    if statements.is_empty() {
        return String::new();
    }
    format!("\nWITH i, item\nCALL {{\n{}}}", statements.join("UNION\n"))
}

/// Which of `selected` are the schema's sub resource and other relationships.
///
/// An empty selection selects nothing. Selecting a relationship the schema does not
/// define is an error.
pub fn filter_selected_relationships<'a>(
    schema: &'a NodeSchema,
    selected: &[&RelSchema],
) -> Result<(Option<&'a RelSchema>, Vec<&'a RelSchema>), SchemaError> {
    if selected.is_empty() {
        return Ok((None, Vec::new()));
    }
    for rel in selected {
        if !schema.all_relationships().any(|defined| defined == *rel) {
            return Err(SchemaError::UndefinedRelationship {
                rel: rel.name,
                schema: schema.name,
            });
        }
    }

    let sub_resource = schema
        .sub_resource_relationship
        .as_ref()
        .filter(|sub| selected.contains(sub));
    let others = schema
        .other_relationships
        .iter()
        .flat_map(|other| other.rels.iter())
        .filter(|rel| selected.contains(rel) && Some(*rel) != sub_resource)
        .collect();
    Ok((sub_resource, others))
}

pub fn rel_present_on_node_schema(schema: &NodeSchema, rel: &RelSchema) -> bool {
    match filter_selected_relationships(schema, &[rel]) {
        Ok((sub_resource, others)) => sub_resource.is_some() || !others.is_empty(),
        Err(_) => false,
    }
}

/// Builds the query that MERGEs every record of `$DictList` as a node of `schema`.
///
/// `selected_relationships`: `None` attaches every relationship the schema defines,
/// `Some(&[])` attaches none.
pub fn build_ingestion_query(
    schema: &NodeSchema,
    selected_relationships: Option<&[&RelSchema]>,
) -> Result<String, SchemaError> {
    validate_node_schema(schema)?;

    let (sub_resource, others) = match selected_relationships {
        None => (
            schema.sub_resource_relationship.as_ref(),
            schema
                .other_relationships
                .iter()
                .flat_map(|other| other.rels.iter())
                .collect(),
        ),
        Some(selected) => filter_selected_relationships(schema, selected)?,
    };

    let id_ref = schema
        .properties
        .get("id")
        .ok_or(SchemaError::MissingRequiredProperty {
            schema: schema.name,
            property: "id",
        })?;

    Ok(format!(
        "UNWIND $DictList AS item
MERGE (i:{label}{{id: {id_ref}}})
ON CREATE SET i.firstseen = timestamp()
SET
    i._module_name = \"{module_name}\",
    i._module_version = \"{module_version}\",
    {props}{ontology}{relationships}",
        label = schema.label,
        module_name = module_name(schema.module),
        module_version = module_version(),
        props = build_node_properties_statement(schema),
        ontology = build_ontology_node_properties_statement(schema),
        relationships = build_attach_relationships_statement(sub_resource, &others),
    ))
}

fn index_query(label: &str, attr: &str) -> String {
    format!("{INDEX_PREFIX} FOR (n:{label}) ON (n.{attr});")
}

/// Indexes every property the ingestion and cleanup queries look nodes up by.
pub fn build_create_index_queries(schema: &NodeSchema) -> Vec<String> {
    let mut queries = vec![
        index_query(schema.label, "id"),
        index_query(schema.label, "lastupdated"),
    ];

    if let Some(extra) = &schema.extra_node_labels {
        queries.extend(extra.labels.iter().map(|l| index_query(l.label(), "id")));
        queries.extend(
            extra
                .conditional()
                .flat_map(|c| c.conditions.iter())
                .map(|(field, _)| index_query(schema.label, field)),
        );
    }

    for rel in schema.all_relationships() {
        queries.extend(
            rel.target_node_matcher
                .keys()
                .map(|key| index_query(rel.target_node_label, key)),
        );
    }

    queries.extend(
        schema
            .properties
            .iter()
            .filter(|(_, prop_ref)| prop_ref.extra_index)
            .map(|(key, _)| index_query(schema.label, key)),
    );

    queries.into_iter().unique().collect()
}

pub fn build_create_index_queries_for_matchlink(rel: &RelSchema) -> Vec<String> {
    let (Some(source_label), Some(source_matcher)) =
        (rel.source_node_label, rel.source_node_matcher.as_ref())
    else {
        log::warn!(
            "{} has no source node; it cannot be loaded as a MatchLink, no indexes created",
            rel.name
        );
        return Vec::new();
    };

    let mut queries: Vec<String> = source_matcher
        .keys()
        .map(|key| index_query(source_label, key))
        .chain(
            rel.target_node_matcher
                .keys()
                .map(|key| index_query(rel.target_node_label, key)),
        )
        .collect();

    let pattern = match rel.direction {
        LinkDirection::Inward => format!("()<-[r:{}]-()", rel.rel_label),
        LinkDirection::Outward => format!("()-[r:{}]->()", rel.rel_label),
    };
    queries.push(format!(
        "{INDEX_PREFIX} FOR {pattern} ON (r.lastupdated, r._sub_resource_label, r._sub_resource_id);"
    ));
    queries.into_iter().unique().collect()
}

/// Builds the query that MERGEs one relationship per record between two existing nodes.
pub fn build_matchlink_query(rel: &RelSchema) -> Result<String, SchemaError> {
    let (Some(source_label), Some(source_matcher)) =
        (rel.source_node_label, rel.source_node_matcher.as_ref())
    else {
        return Err(SchemaError::MissingSourceNode { rel: rel.name });
    };
    validate_rel_properties(rel)?;
    for property in ["_sub_resource_label", "_sub_resource_id"] {
        if !rel.properties.contains(property) {
            return Err(SchemaError::MissingMatchLinkProperty {
                rel: rel.name,
                property,
            });
        }
    }

    let merge = match rel.direction {
        LinkDirection::Inward => format!("MERGE (from)<-[r:{}]-(to)", rel.rel_label),
        LinkDirection::Outward => format!("MERGE (from)-[r:{}]->(to)", rel.rel_label),
    };

    Ok(format!(
        "UNWIND $DictList as item
MATCH (from:{source_label}{{{source_match}}})
MATCH (to:{target_label}{{{target_match}}})
{merge}
ON CREATE SET r.firstseen = timestamp()
SET
    r._module_name = \"{module_name}\",
    r._module_version = \"{module_version}\",
    {props};",
        source_match = build_match_clause(source_matcher),
        target_label = rel.target_node_label,
        target_match = build_match_clause(&rel.target_node_matcher),
        module_name = module_name(rel.module),
        module_version = module_version(),
        props = build_rel_properties_statement("r", &rel.properties).replace("\n    ", "\n"),
    ))
}

/// `<-[:REL]-(:SubLabel{key: $kwarg})` restricting a MATCH on `n` to the sub resource.
pub(crate) fn sub_resource_scope(schema: &NodeSchema) -> String {
    let Some(rel) = &schema.sub_resource_relationship else {
        return String::new();
    };
    let matcher = build_match_clause(&rel.target_node_matcher);
    match rel.direction {
        LinkDirection::Inward => format!(
            "<-[:{}]-(:{}{{{matcher}}})",
            rel.rel_label, rel.target_node_label
        ),
        LinkDirection::Outward => format!(
            "-[:{}]->(:{}{{{matcher}}})",
            rel.rel_label, rel.target_node_label
        ),
    }
}

/// Queries scoped by the sub resource run outside any `UNWIND`, so its matcher may only use kwargs.
pub(crate) fn validate_sub_resource_matcher(schema: &NodeSchema) -> Result<(), SchemaError> {
    let Some(sub_resource) = &schema.sub_resource_relationship else {
        return Ok(());
    };
    for (key, prop_ref) in sub_resource.target_node_matcher.iter() {
        if !prop_ref.set_in_kwargs {
            return Err(SchemaError::SubResourceMatcherNotInKwargs {
                label: schema.label,
                rel: sub_resource.rel_label,
                key,
            });
        }
    }
    Ok(())
}

/// For each conditional label: remove it everywhere in scope, then set it where all conditions hold.
///
/// Removing first means nodes whose properties changed since the last run lose the label.
pub fn build_conditional_label_queries(schema: &NodeSchema) -> Result<Vec<String>, SchemaError> {
    let Some(extra) = &schema.extra_node_labels else {
        return Ok(Vec::new());
    };
    validate_sub_resource_matcher(schema)?;
    let scope = sub_resource_scope(schema);

    Ok(extra
        .conditional()
        .filter(|c| !c.conditions.is_empty())
        .flat_map(|c| {
            let conditions = c
                .conditions
                .iter()
                .map(|(field, value)| format!("n.{field} = \"{}\"", escape_cypher_string(value)))
                .join(" AND ");
            [
                format!(
                    "MATCH (n:{label}:{cond}){scope}\nREMOVE n:{cond};",
                    label = schema.label,
                    cond = c.label
                ),
                format!(
                    "MATCH (n:{label}){scope}\nWHERE {conditions}\nSET n:{cond};",
                    label = schema.label,
                    cond = c.label
                ),
            ]
        })
        .collect())
}
