//! Loading records through schemas, with retries.
//!
//! [`load`] is what intel modules call: it makes sure the indexes exist, writes the
//! records in batches with the generated ingestion query and refreshes conditional labels.

use super::session::{GraphSession, Params, Record};
use crate::config::{DEFAULT_BATCH_SIZE, MAX_ENTITY_NOT_FOUND_RETRIES, MAX_NETWORK_RETRIES};
use crate::error::{GraphError, Result, SchemaError};
use crate::graph::querybuilder::{
    build_conditional_label_queries, build_create_index_queries,
    build_create_index_queries_for_matchlink, build_ingestion_query, build_matchlink_query,
};
use crate::models::{NodeSchema, RelSchema};
use crate::util::{batch, graph_retry_policy, retry_notify, BackoffError};
use colored::Colorize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Attempt counts per retryable error class; each class has its own limit.
#[derive(Debug, Default)]
struct RetryCounts {
    network: AtomicU32,
    entity_not_found: AtomicU32,
}

impl RetryCounts {
    /// Network errors and EntityNotFound races are transient until their class runs out
    /// of attempts. Everything else is permanent.
    fn classify(&self, error: GraphError) -> BackoffError<GraphError> {
        let (counter, limit) = if error.is_network() {
            (&self.network, MAX_NETWORK_RETRIES)
        } else if error.is_entity_not_found() {
            (&self.entity_not_found, MAX_ENTITY_NOT_FOUND_RETRIES)
        } else {
            return BackoffError::permanent(error);
        };
        let failures = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= limit {
            log::error!("Giving up after {failures} failures: {error}");
            return BackoffError::permanent(error);
        }
        BackoffError::transient(error)
    }

    fn total(&self) -> u32 {
        self.network.load(Ordering::SeqCst) + self.entity_not_found.load(Ordering::SeqCst)
    }
}

/// Calls `op` under [`graph_retry_policy`] until it succeeds, fails permanently or a
/// retryable error class reaches its attempt limit.
async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    let counts = RetryCounts::default();
    let counts_ref = &counts;
    let result = retry_notify(
        graph_retry_policy(),
        move || {
            let attempt = op();
            async move { attempt.await.map_err(|e| counts_ref.classify(e)) }
        },
        |error: GraphError, wait: Duration| {
            log::warn!("{} {error}, retrying in {wait:?}", format!("{what} failed:").on_red());
        },
    )
    .await;

    if result.is_ok() && counts.total() > 0 {
        log::info!(
            "{what} {} after {} network and {} EntityNotFound retries",
            "recovered".green(),
            counts.network.load(Ordering::SeqCst),
            counts.entity_not_found.load(Ordering::SeqCst)
        );
    }
    result
}

/// Runs a write statement, retrying dropped connections, transient errors and
/// EntityNotFound races with exponential backoff. Other errors fail immediately.
pub async fn execute_write_with_retry(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Vec<Record>, GraphError> {
    with_retry("write", move || session.execute_write(query, params)).await
}

pub async fn run_write_query(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Vec<Record>, GraphError> {
    execute_write_with_retry(session, query, params).await
}

async fn run_index_query(session: &dyn GraphSession, query: &str) -> Result<()> {
    if !query.starts_with("CREATE INDEX IF NOT EXISTS") {
        return Err(SchemaError::InvalidIndexQuery(query.to_string()).into());
    }
    let params = Params::new();
    let params = &params;
    match with_retry("index creation", move || session.run(query, params)).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_equivalent_index() => {
            log::debug!("Index already exists (likely created by parallel sync): {query}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn ensure_indexes(session: &dyn GraphSession, schema: &NodeSchema) -> Result<()> {
    for query in build_create_index_queries(schema) {
        run_index_query(session, &query).await?;
    }
    Ok(())
}

pub async fn ensure_indexes_for_matchlinks(
    session: &dyn GraphSession,
    rel: &RelSchema,
) -> Result<()> {
    for query in build_create_index_queries_for_matchlink(rel) {
        run_index_query(session, &query).await?;
    }
    Ok(())
}

/// Writes `records` with `query` in batches; each batch is passed as `$DictList` next to `kwargs`.
pub async fn load_graph_data(
    session: &dyn GraphSession,
    query: &str,
    records: &[Record],
    batch_size: usize,
    kwargs: &Params,
) -> Result<()> {
    if batch_size == 0 {
        return Err(SchemaError::InvalidBatchSize.into());
    }
    for chunk in batch(records, batch_size) {
        let mut params = kwargs.clone();
        params.insert(
            "DictList".to_string(),
            Value::Array(chunk.iter().cloned().map(Value::Object).collect()),
        );
        execute_write_with_retry(session, query, &params).await?;
    }
    Ok(())
}

/// Upserts `records` as nodes of `schema`; `kwargs` must provide every kwarg the schema references.
pub async fn load(
    session: &dyn GraphSession,
    schema: &NodeSchema,
    records: &[Record],
    batch_size: usize,
    kwargs: &Params,
) -> Result<()> {
    if batch_size == 0 {
        return Err(SchemaError::InvalidBatchSize.into());
    }
    if records.is_empty() {
        log::debug!("Nothing to load for {}", schema.label);
        return Ok(());
    }
    ensure_indexes(session, schema).await?;
    let query = build_ingestion_query(schema, None)?;
    load_graph_data(session, &query, records, batch_size, kwargs).await?;

    for label_query in build_conditional_label_queries(schema)? {
        execute_write_with_retry(session, &label_query, kwargs).await?;
    }
    log::info!(
        "Loaded {count} {label} nodes",
        count = records.len(),
        label = schema.label.cyan()
    );
    Ok(())
}

/// [`load`] with [`DEFAULT_BATCH_SIZE`].
pub async fn load_with_defaults(
    session: &dyn GraphSession,
    schema: &NodeSchema,
    records: &[Record],
    kwargs: &Params,
) -> Result<()> {
    load(session, schema, records, DEFAULT_BATCH_SIZE, kwargs).await
}

/// Writes MatchLinks of `rel`. `kwargs` must carry `_sub_resource_label` and
/// `_sub_resource_id`, which scope their cleanup.
pub async fn load_matchlinks(
    session: &dyn GraphSession,
    rel: &RelSchema,
    records: &[Record],
    batch_size: usize,
    kwargs: &Params,
) -> Result<()> {
    for required in ["_sub_resource_label", "_sub_resource_id"] {
        if !kwargs.contains_key(required) {
            return Err(SchemaError::MissingKwarg(required).into());
        }
    }
    if records.is_empty() {
        return Ok(());
    }
    ensure_indexes_for_matchlinks(session, rel).await?;
    let query = build_matchlink_query(rel)?;
    load_graph_data(session, &query, records, batch_size, kwargs).await?;
    log::info!("Loaded {} {} links", records.len(), rel.rel_label.cyan());
    Ok(())
}

/// First column of every row.
pub async fn read_list_of_values(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Vec<Value>> {
    let rows = session.fetch(query, params).await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.into_iter().next().map(|(_, v)| v))
        .collect())
}

/// First column of the first row.
pub async fn read_single_value(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Option<Value>> {
    Ok(read_list_of_values(session, query, params)
        .await?
        .into_iter()
        .next())
}

pub async fn read_list_of_dicts(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Vec<Record>> {
    Ok(session.fetch(query, params).await?)
}

pub async fn read_single_dict(
    session: &dyn GraphSession,
    query: &str,
    params: &Params,
) -> Result<Option<Record>> {
    let rows = session.fetch(query, params).await?;
    if rows.len() > 1 {
        return Err(GraphError::UnexpectedResult(format!(
            "Expected at most one row, got {}",
            rows.len()
        ))
        .into());
    }
    Ok(rows.into_iter().next())
}
