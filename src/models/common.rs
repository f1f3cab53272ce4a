use std::fmt;

/// How a [`PropertyRef`] is compared when it identifies a relationship's target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchMode {
    #[default]
    Exact,
    /// `toLower(n.key) = toLower(ref)`
    IgnoreCase,
    /// `toLower(n.key) CONTAINS toLower(ref)`
    FuzzyIgnoreCase,
    /// The record field is a list; links to every node whose key is in it.
    OneToMany,
}

/// Points at the value of a graph property: a field of the current record, or a query kwarg.
///
/// Renders as `item.<name>` or `$<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    pub name: &'static str,
    pub set_in_kwargs: bool,
    pub extra_index: bool,
    pub match_mode: MatchMode,
}

impl PropertyRef {
    pub const fn new(name: &'static str) -> Self {
        PropertyRef {
            name,
            set_in_kwargs: false,
            extra_index: false,
            match_mode: MatchMode::Exact,
        }
    }

    /// Same value for every record in the batch, passed as a query parameter.
    pub const fn kwarg(name: &'static str) -> Self {
        PropertyRef {
            set_in_kwargs: true,
            ..PropertyRef::new(name)
        }
    }

    pub const fn indexed(self) -> Self {
        PropertyRef {
            extra_index: true,
            ..self
        }
    }

    pub const fn ignore_case(self) -> Self {
        PropertyRef {
            match_mode: MatchMode::IgnoreCase,
            ..self
        }
    }

    pub const fn fuzzy_and_ignore_case(self) -> Self {
        PropertyRef {
            match_mode: MatchMode::FuzzyIgnoreCase,
            ..self
        }
    }

    pub const fn one_to_many(self) -> Self {
        PropertyRef {
            match_mode: MatchMode::OneToMany,
            ..self
        }
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.set_in_kwargs {
            write!(f, "${}", self.name)
        } else {
            write!(f, "item.{}", self.name)
        }
    }
}

/// Ordered mapping of graph property name to [`PropertyRef`].
///
/// Order is kept so generated queries are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Properties(Vec<(&'static str, PropertyRef)>);

impl Properties {
    pub fn new() -> Self {
        Properties(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&PropertyRef> {
        self.0.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyRef)> + '_ {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&'static str, PropertyRef); N]> for Properties {
    fn from(pairs: [(&'static str, PropertyRef); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl FromIterator<(&'static str, PropertyRef)> for Properties {
    /// A repeated key replaces the earlier entry in place.
    fn from_iter<I: IntoIterator<Item = (&'static str, PropertyRef)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (key, value) in iter {
            match props.0.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => props.0.push((key, value)),
            }
        }
        props
    }
}

pub type NodeProperties = Properties;
pub type RelProperties = Properties;
pub type NodeMatcher = Properties;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(PropertyRef::new("Id").to_string(), "item.Id");
        assert_eq!(PropertyRef::kwarg("UPDATE_TAG").to_string(), "$UPDATE_TAG");
    }

    #[test]
    fn test_match_modes_are_exclusive() {
        let r = PropertyRef::new("Name").ignore_case().one_to_many();
        assert_eq!(r.match_mode, MatchMode::OneToMany);
        assert!(!PropertyRef::new("Name").indexed().set_in_kwargs);
    }

    #[test]
    fn test_properties_keep_order_and_replace_duplicates() {
        let props: Properties = [
            ("id", PropertyRef::new("Id")),
            ("name", PropertyRef::new("Name")),
            ("id", PropertyRef::new("Arn")),
        ]
        .into();
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(props.get("id"), Some(&PropertyRef::new("Arn")));
    }
}
