//! Semantic `_ont_*` properties written alongside provider-specific ones, so that
//! e.g. every user-like node answers `_ont_active` the same way.

/// Literal written by [`SpecialHandling::StaticValue`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OntologyValue {
    Str(&'static str),
    Bool(bool),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecialHandling {
    /// `"false"`, `"0"` and absent become true.
    InvertBoolean,
    /// Parsable booleans as-is, any other present value is true.
    ToBoolean,
    /// True when the field equals one of the values.
    EqualBoolean(Vec<&'static str>),
    /// True when the field or any of the extra fields is true.
    OrBoolean(Vec<&'static str>),
    /// True when neither the field nor any extra field is true.
    NorBoolean(Vec<&'static str>),
    /// Ignores the node field.
    StaticValue(OntologyValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OntologyFieldMapping {
    pub ontology_field: &'static str,
    pub node_field: &'static str,
    pub special_handling: Option<SpecialHandling>,
}

impl OntologyFieldMapping {
    pub fn new(ontology_field: &'static str, node_field: &'static str) -> Self {
        OntologyFieldMapping {
            ontology_field,
            node_field,
            special_handling: None,
        }
    }

    pub fn handled(mut self, handling: SpecialHandling) -> Self {
        self.special_handling = Some(handling);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct OntologyMapping {
    pub fields: Vec<OntologyFieldMapping>,
}
