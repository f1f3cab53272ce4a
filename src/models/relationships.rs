use super::common::{NodeMatcher, PropertyRef, RelProperties};

/// Direction of a relationship as seen from the node being loaded (`i`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// `(i)<-[:REL]-(j)`
    Inward,
    /// `(i)-[:REL]->(j)`
    Outward,
}

/// Declares one relationship type: where it points, how the far node is found, and what it carries.
///
/// The source fields are only set on MatchLinks, relationships loaded between two
/// nodes that already exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelSchema {
    pub name: &'static str,
    pub module: &'static str,
    pub target_node_label: &'static str,
    pub target_node_matcher: NodeMatcher,
    pub direction: LinkDirection,
    pub rel_label: &'static str,
    pub properties: RelProperties,
    pub source_node_label: Option<&'static str>,
    pub source_node_matcher: Option<NodeMatcher>,
}

impl RelSchema {
    pub fn new(
        name: &'static str,
        module: &'static str,
        target_node_label: &'static str,
        target_node_matcher: NodeMatcher,
        direction: LinkDirection,
        rel_label: &'static str,
        properties: RelProperties,
    ) -> Self {
        RelSchema {
            name,
            module,
            target_node_label,
            target_node_matcher,
            direction,
            rel_label,
            properties,
            source_node_label: None,
            source_node_matcher: None,
        }
    }

    pub fn with_source(mut self, label: &'static str, matcher: NodeMatcher) -> Self {
        self.source_node_label = Some(label);
        self.source_node_matcher = Some(matcher);
        self
    }
}

pub fn make_target_node_matcher<I>(pairs: I) -> NodeMatcher
where
    I: IntoIterator<Item = (&'static str, PropertyRef)>,
{
    pairs.into_iter().collect()
}

pub fn make_source_node_matcher<I>(pairs: I) -> NodeMatcher
where
    I: IntoIterator<Item = (&'static str, PropertyRef)>,
{
    pairs.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OtherRelationships {
    pub rels: Vec<RelSchema>,
}

impl OtherRelationships {
    pub fn new(rels: Vec<RelSchema>) -> Self {
        OtherRelationships { rels }
    }

    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }
}
