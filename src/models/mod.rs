//! Declarative graph schemas.
//!
//! - [`PropertyRef`] and [`Properties`] - where each graph property gets its value
//! - [`RelSchema`] - a relationship type, including MatchLinks between existing nodes
//! - [`NodeSchema`] - a node type with its sub resource and other relationships
//! - [`azure`] - schemas of the Azure intel modules
//!
//! Schemas only describe; `graph::querybuilder` and `graph::cleanupbuilder` turn them into Cypher.

pub mod azure;
mod common;
mod nodes;
mod ontology;
mod relationships;

pub use common::{MatchMode, NodeMatcher, NodeProperties, Properties, PropertyRef, RelProperties};
pub use nodes::{ConditionalNodeLabel, ExtraNodeLabel, ExtraNodeLabels, NodeSchema};
pub use ontology::{OntologyFieldMapping, OntologyMapping, OntologyValue, SpecialHandling};
pub use relationships::{
    make_source_node_matcher, make_target_node_matcher, LinkDirection, OtherRelationships,
    RelSchema,
};
