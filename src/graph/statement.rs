use crate::client::tx::execute_write_with_retry;
use crate::client::{GraphSession, Params};
use crate::config::CLEANUP_ITERATION_SIZE;
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;

/// One statement of a [`GraphJob`](super::job::GraphJob).
///
/// Iterative statements run repeatedly with `$LIMIT_SIZE = iteration_size` until a
/// pass affects nothing, which keeps each transaction small.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStatement {
    pub query: String,
    pub parameters: Params,
    pub iterative: bool,
    pub iteration_size: i64,
    pub parent_job_name: Option<String>,
    pub parent_job_sequence_num: Option<usize>,
}

/// A statement as written in a JSON job file.
#[derive(Debug, Clone, Deserialize)]
pub struct StatementDefinition {
    pub query: String,
    #[serde(default)]
    pub iterative: bool,
    #[serde(default = "default_iteration_size", rename = "iterationsize")]
    pub iteration_size: i64,
}

fn default_iteration_size() -> i64 {
    CLEANUP_ITERATION_SIZE
}

impl GraphStatement {
    pub fn new(query: impl Into<String>, parameters: Params, iterative: bool, iteration_size: i64) -> Self {
        GraphStatement {
            query: query.into(),
            parameters,
            iterative,
            iteration_size,
            parent_job_name: None,
            parent_job_sequence_num: None,
        }
    }

    pub fn from_definition(
        definition: StatementDefinition,
        parent_job_name: &str,
        sequence_num: usize,
    ) -> Self {
        GraphStatement {
            parent_job_name: Some(parent_job_name.to_string()),
            parent_job_sequence_num: Some(sequence_num),
            ..GraphStatement::new(
                definition.query,
                Params::new(),
                definition.iterative,
                definition.iteration_size,
            )
        }
    }

    /// Adds `params`, overriding existing keys.
    pub fn merge_parameters(&mut self, params: &Params) {
        for (key, value) in params {
            self.parameters.insert(key.clone(), value.clone());
        }
    }

    fn describe(&self) -> String {
        match (&self.parent_job_name, self.parent_job_sequence_num) {
            (Some(job), Some(seq)) => format!("{job} statement #{seq}"),
            _ => "statement".to_string(),
        }
    }

    pub async fn run(&self, session: &dyn GraphSession) -> Result<()> {
        if self.iterative {
            self.run_iterative(session).await
        } else {
            execute_write_with_retry(session, &self.query, &self.parameters).await?;
            log::debug!("Completed {}", self.describe());
            Ok(())
        }
    }

    /// The query with a `TotalCompleted` count appended, so each pass reports what it did.
    pub fn iterative_query(&self) -> String {
        format!(
            "{}\nRETURN COUNT(*) AS TotalCompleted",
            self.query.trim_end().trim_end_matches(';')
        )
    }

    async fn run_iterative(&self, session: &dyn GraphSession) -> Result<()> {
        let query = self.iterative_query();
        let mut params = self.parameters.clone();
        params.insert("LIMIT_SIZE".to_string(), Value::from(self.iteration_size));

        let mut passes = 0;
        let mut total = 0;
        loop {
            let rows = execute_write_with_retry(session, &query, &params).await?;
            let completed = rows
                .first()
                .and_then(|row| row.get("TotalCompleted"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            passes += 1;
            total += completed;
            if completed == 0 {
                break;
            }
        }
        log::debug!(
            "Completed {} in {passes} passes, {total} items affected",
            self.describe()
        );
        Ok(())
    }
}
