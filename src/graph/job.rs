//! Named sequences of statements; mostly cleanup jobs built from schemas.

use super::cleanupbuilder::{build_cleanup_queries, build_cleanup_query_for_matchlink};
use super::statement::{GraphStatement, StatementDefinition};
use crate::client::{GraphSession, Params};
use crate::config::CLEANUP_ITERATION_SIZE;
use crate::error::{Error, Result, SchemaError};
use crate::models::{NodeSchema, RelSchema};
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

static PARAMETER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_parameter_regex() -> &'static Regex {
    PARAMETER_REGEX.get_or_init(|| Regex::new(r"\$(\w+)").expect("Invalid Regex"))
}

/// Names of the `$parameters` referenced by `queries`.
pub fn get_parameters<S: AsRef<str>>(queries: &[S]) -> BTreeSet<String> {
    queries
        .iter()
        .flat_map(|q| {
            get_parameter_regex()
                .captures_iter(q.as_ref())
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct JobDefinition {
    name: String,
    statements: Vec<StatementDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphJob {
    pub name: String,
    pub statements: Vec<GraphStatement>,
    pub short_name: Option<String>,
}

impl GraphJob {
    pub fn new(name: impl Into<String>, statements: Vec<GraphStatement>, short_name: Option<String>) -> Self {
        GraphJob {
            name: name.into(),
            statements,
            short_name,
        }
    }

    pub fn merge_parameters(&mut self, params: &Params) {
        for statement in &mut self.statements {
            statement.merge_parameters(params);
        }
    }

    /// Runs the statements in order and stops at the first failure.
    pub async fn run(&self, session: &dyn GraphSession) -> Result<()> {
        log::info!("Starting job '{}'", self.name.cyan());
        for statement in &self.statements {
            if let Err(e) = statement.run(session).await {
                log::error!(
                    "{} while executing statement in job '{}': {e}",
                    "Unhandled error".on_red(),
                    self.name
                );
                return Err(e);
            }
        }
        log::info!(
            "Finished job {}",
            self.short_name.as_deref().unwrap_or(&self.name)
        );
        Ok(())
    }

    /// Parses a job definition: `{"name": .., "statements": [{"query", "iterative", "iterationsize"}]}`.
    pub fn from_json(blob: &str, short_name: Option<&str>) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(blob);
        let definition: JobDefinition = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|e| SchemaError::InvalidJob(format!("path={} error={}", e.path(), e)))?;

        let statements = definition
            .statements
            .into_iter()
            .enumerate()
            .map(|(i, s)| GraphStatement::from_definition(s, &definition.name, i + 1))
            .collect();
        Ok(GraphJob::new(
            definition.name,
            statements,
            short_name.map(str::to_string),
        ))
    }

    /// Reads a job file; the short name is the file stem.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let blob = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Error reading job file {}: {e}", path.display()),
            ))
        })?;
        let short_name = path.file_stem().and_then(|s| s.to_str());
        Self::from_json(&blob, short_name)
    }

    /// Cleanup job for `schema`. Every parameter the cleanup queries reference, except
    /// `LIMIT_SIZE`, must be in `parameters`.
    pub fn from_node_schema(schema: &NodeSchema, parameters: &Params) -> Result<Self> {
        let queries = build_cleanup_queries(schema)?;
        let name = format!("Cleanup {}", schema.label);

        let missing: Vec<String> = get_parameters(&queries)
            .into_iter()
            .filter(|p| p != "LIMIT_SIZE" && !parameters.contains_key(p))
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingParameters { job: name, missing }.into());
        }

        let statements = queries
            .into_iter()
            .enumerate()
            .map(|(i, query)| GraphStatement {
                parent_job_name: Some(name.clone()),
                parent_job_sequence_num: Some(i + 1),
                ..GraphStatement::new(query, parameters.clone(), true, CLEANUP_ITERATION_SIZE)
            })
            .collect();
        Ok(GraphJob::new(name, statements, Some(schema.label.to_string())))
    }

    /// Cleanup job for MatchLinks of `rel` written under the given sub resource.
    pub fn from_matchlink(
        rel: &RelSchema,
        sub_resource_label: &str,
        sub_resource_id: &str,
        update_tag: i64,
    ) -> Result<Self> {
        let query = build_cleanup_query_for_matchlink(rel)?;
        let mut parameters = Params::new();
        parameters.insert("UPDATE_TAG".into(), Value::from(update_tag));
        parameters.insert("_sub_resource_label".into(), Value::from(sub_resource_label));
        parameters.insert("_sub_resource_id".into(), Value::from(sub_resource_id));

        let name = format!(
            "Cleanup {} between {} and {}",
            rel.rel_label,
            rel.source_node_label.unwrap_or_default(),
            rel.target_node_label
        );
        let statement = GraphStatement {
            parent_job_name: Some(name.clone()),
            parent_job_sequence_num: Some(1),
            ..GraphStatement::new(query, parameters, true, CLEANUP_ITERATION_SIZE)
        };
        Ok(GraphJob::new(name, vec![statement], Some(format!("{}_cleanup", rel.name))))
    }
}

pub async fn run_from_json(
    session: &dyn GraphSession,
    blob: &str,
    parameters: &Params,
    short_name: Option<&str>,
) -> Result<()> {
    let mut job = GraphJob::from_json(blob, short_name)?;
    job.merge_parameters(parameters);
    job.run(session).await
}

/// Runs a job stored as JSON.
pub async fn run_from_json_file(
    session: &dyn GraphSession,
    path: &Path,
    parameters: &Params,
) -> Result<()> {
    let mut job = GraphJob::from_json_file(path)?;
    job.merge_parameters(parameters);
    job.run(session).await
}
