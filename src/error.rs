//! Error types.
//!
//! - [`SchemaError`] - a node or relationship schema cannot be turned into queries
//! - [`GraphError`] - the graph database rejected or failed a statement
//! - [`Error`] - anything a sync can fail with

use thiserror::Error;

/// Schema validation and query generation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{schema} must define the `{property}` property")]
    MissingRequiredProperty {
        schema: &'static str,
        property: &'static str,
    },

    #[error("{schema} sets the reserved `{property}` property; it is managed by the loader")]
    ReservedProperty {
        schema: &'static str,
        property: &'static str,
    },

    #[error(
        "filter_selected_relationships() failed: relationship {rel} is not defined on node schema {schema}. \
         Please verify the selected relationships passed to build_ingestion_query()."
    )]
    UndefinedRelationship {
        rel: &'static str,
        schema: &'static str,
    },

    #[error(
        "This is not expected: {label} has a sub_resource_relationship but scoped_cleanup=false. \
         A node with a sub resource relationship cannot use unscoped cleanup: every stale node of this type \
         would be deleted regardless of the sub resource it is attached to."
    )]
    UnscopedCleanupWithSubResource { label: &'static str },

    #[error(
        "Expected {label} to not exist in a sub resource, but it has a sub_resource_relationship defined"
    )]
    UnexpectedSubResource { label: &'static str },

    #[error(
        "Sub resource matcher `{key}` of {label} -[:{rel}]- must have set_in_kwargs=True; \
         cleanup is scoped by a query parameter"
    )]
    SubResourceMatcherNotInKwargs {
        label: &'static str,
        rel: &'static str,
        key: &'static str,
    },

    #[error("MatchLink {rel} must define a source node label and source node matcher")]
    MissingSourceNode { rel: &'static str },

    #[error("MatchLink {rel} must define the `{property}` relationship property")]
    MissingMatchLinkProperty {
        rel: &'static str,
        property: &'static str,
    },

    #[error("Job `{job}` is missing parameters {missing:?}")]
    MissingParameters { job: String, missing: Vec<String> },

    #[error("Required kwarg `{0}` was not provided")]
    MissingKwarg(&'static str),

    #[error("Index query must start with `CREATE INDEX IF NOT EXISTS`: {0}")]
    InvalidIndexQuery(String),

    #[error("batch_size must be greater than 0")]
    InvalidBatchSize,

    #[error("Invalid job definition: {0}")]
    InvalidJob(String),
}

/// Database failures, classified so the retry loop can decide what to do.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("transient error {code}: {message}")]
    Transient { code: String, message: String },

    #[error("client error {code:?}: {message}")]
    Client {
        code: Option<String>,
        message: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
}

pub const ENTITY_NOT_FOUND: &str = "Neo.ClientError.Statement.EntityNotFound";
pub const EQUIVALENT_SCHEMA_RULE_EXISTS: &str =
    "Neo.ClientError.Schema.EquivalentSchemaRuleAlreadyExists";

impl GraphError {
    /// Builds an error from a Neo4j status code, e.g. `Neo.TransientError.General.DatabaseUnavailable`.
    pub fn from_code(code: &str, message: &str) -> Self {
        let message = message.to_string();
        if code.starts_with("Neo.TransientError.") {
            GraphError::Transient {
                code: code.to_string(),
                message,
            }
        } else if code.starts_with("Neo.ClientError.") {
            GraphError::Client {
                code: Some(code.to_string()),
                message,
            }
        } else {
            GraphError::Database(format!("{code}: {message}"))
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            GraphError::Transient { code, .. } => Some(code),
            GraphError::Client { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Dropped connections and transient server states are worth another attempt.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            GraphError::ConnectionReset(_)
                | GraphError::ServiceUnavailable(_)
                | GraphError::SessionExpired(_)
                | GraphError::Transient { .. }
        )
    }

    /// Concurrent writers can delete a node between MATCH and MERGE.
    pub fn is_entity_not_found(&self) -> bool {
        self.code() == Some(ENTITY_NOT_FOUND)
    }

    pub fn is_equivalent_index(&self) -> bool {
        self.code() == Some(EQUIVALENT_SCHEMA_RULE_EXISTS)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("vendor call failed: {0}")]
    Vendor(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
