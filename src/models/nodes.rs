use super::common::NodeProperties;
use super::ontology::OntologyMapping;
use super::relationships::{OtherRelationships, RelSchema};

/// A label applied only to nodes whose properties equal every condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionalNodeLabel {
    pub label: &'static str,
    pub conditions: Vec<(&'static str, &'static str)>,
}

impl ConditionalNodeLabel {
    pub fn new(label: &'static str, conditions: Vec<(&'static str, &'static str)>) -> Self {
        ConditionalNodeLabel { label, conditions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtraNodeLabel {
    Plain(&'static str),
    Conditional(ConditionalNodeLabel),
}

impl ExtraNodeLabel {
    pub fn label(&self) -> &'static str {
        match self {
            ExtraNodeLabel::Plain(label) => label,
            ExtraNodeLabel::Conditional(c) => c.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ExtraNodeLabels {
    pub labels: Vec<ExtraNodeLabel>,
}

impl ExtraNodeLabels {
    pub fn new(labels: Vec<ExtraNodeLabel>) -> Self {
        ExtraNodeLabels { labels }
    }

    pub fn plain(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.labels.iter().filter_map(|l| match l {
            ExtraNodeLabel::Plain(label) => Some(*label),
            ExtraNodeLabel::Conditional(_) => None,
        })
    }

    pub fn conditional(&self) -> impl Iterator<Item = &ConditionalNodeLabel> + '_ {
        self.labels.iter().filter_map(|l| match l {
            ExtraNodeLabel::Conditional(c) => Some(c),
            ExtraNodeLabel::Plain(_) => None,
        })
    }
}

/// Everything the loader needs to know about one node type.
///
/// `module` should be `module_path!()` of the declaring module; it becomes the
/// `_module_name` stamped on nodes and relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSchema {
    pub name: &'static str,
    pub module: &'static str,
    pub label: &'static str,
    pub properties: NodeProperties,
    pub sub_resource_relationship: Option<RelSchema>,
    pub other_relationships: Option<OtherRelationships>,
    pub extra_node_labels: Option<ExtraNodeLabels>,
    /// When false, cleanup deletes stale nodes of this label everywhere.
    pub scoped_cleanup: bool,
    pub ontology: Option<OntologyMapping>,
}

impl NodeSchema {
    pub fn new(
        name: &'static str,
        module: &'static str,
        label: &'static str,
        properties: NodeProperties,
    ) -> Self {
        NodeSchema {
            name,
            module,
            label,
            properties,
            sub_resource_relationship: None,
            other_relationships: None,
            extra_node_labels: None,
            scoped_cleanup: true,
            ontology: None,
        }
    }

    pub fn with_sub_resource(mut self, rel: RelSchema) -> Self {
        self.sub_resource_relationship = Some(rel);
        self
    }

    pub fn with_other_relationships(mut self, rels: Vec<RelSchema>) -> Self {
        self.other_relationships = Some(OtherRelationships::new(rels));
        self
    }

    pub fn with_extra_labels(mut self, labels: Vec<ExtraNodeLabel>) -> Self {
        self.extra_node_labels = Some(ExtraNodeLabels::new(labels));
        self
    }

    pub fn with_ontology(mut self, mapping: OntologyMapping) -> Self {
        self.ontology = Some(mapping);
        self
    }

    pub fn unscoped_cleanup(mut self) -> Self {
        self.scoped_cleanup = false;
        self
    }

    /// Sub resource first, then the other relationships in declaration order.
    pub fn all_relationships(&self) -> impl Iterator<Item = &RelSchema> + '_ {
        self.sub_resource_relationship.iter().chain(
            self.other_relationships
                .iter()
                .flat_map(|other| other.rels.iter()),
        )
    }
}
