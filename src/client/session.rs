//! The seam between query generation and the database.
//!
//! Everything above this module talks to a [`GraphSession`]; [`Neo4jSession`] is the
//! real one, `RecordingSession` the in-memory one used by tests.

use crate::config::Config;
use crate::error::GraphError;
use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, Query, Row, Txn,
};
use serde_json::Value;

/// One record to load, or one result row.
pub type Record = serde_json::Map<String, Value>;

/// Query parameters (kwargs).
pub type Params = serde_json::Map<String, Value>;

/// Builds [`Params`] from `key => value` pairs; values go through `serde_json::Value::from`.
#[macro_export]
macro_rules! params {
    () => { $crate::client::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::client::Params::new();
        $( params.insert($key.to_string(), $crate::client::Value::from($value)); )+
        params
    }};
}

#[async_trait]
pub trait GraphSession: Send + Sync {
    /// Runs a write statement and returns its rows.
    async fn execute_write(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError>;

    /// Runs a statement in an auto-commit transaction; needed for schema changes such as indexes.
    async fn run(&self, query: &str, params: &Params) -> Result<(), GraphError>;

    /// Runs a read statement and returns its rows.
    async fn fetch(&self, query: &str, params: &Params) -> Result<Vec<Record>, GraphError>;
}

/// [`GraphSession`] over a `neo4rs` connection pool.
#[derive(Clone)]
pub struct Neo4jSession {
    graph: Graph,
}

impl Neo4jSession {
    pub async fn connect(config: &Config) -> Result<Self, GraphError> {
        let mut builder = ConfigBuilder::default()
            .uri(config.neo4j_uri.as_str())
            .user(config.neo4j_user.as_str())
            .password(config.neo4j_password.as_str());
        if let Some(db) = &config.neo4j_database {
            builder = builder.db(db.as_str());
        }
        let neo4j_config = builder.build().map_err(classify)?;
        let graph = Graph::connect(neo4j_config).await.map_err(classify)?;
        log::info!("Connected to Neo4j at {}", config.neo4j_uri);
        Ok(Neo4jSession { graph })
    }

    async fn collect(&self, q: Query) -> Result<Vec<Record>, GraphError> {
        let mut result = self.graph.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await.map_err(classify)? {
            rows.push(to_record(row)?);
        }
        Ok(rows)
    }

    /// Runs `q` in an explicit transaction: commit once every row is read, roll back otherwise.
    async fn write_txn(&self, q: Query) -> Result<Vec<Record>, GraphError> {
        let mut txn = self.graph.start_txn().await.map_err(classify)?;
        let rows = match drain_txn(&mut txn, q).await {
            Ok(rows) => rows,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    log::warn!("Rollback failed after {e}: {rollback}");
                }
                return Err(e);
            }
        };
        txn.commit().await.map_err(classify)?;
        Ok(rows)
    }
}

async fn drain_txn(txn: &mut Txn, q: Query) -> Result<Vec<Record>, GraphError> {
    let mut stream = txn.execute(q).await.map_err(classify)?;
    let mut rows = Vec::new();
    while let Some(row) = stream.next(txn.handle()).await.map_err(classify)? {
        rows.push(to_record(row)?);
    }
    Ok(rows)
}

fn to_record(row: Row) -> Result<Record, GraphError> {
    row.to()
        .map_err(|e| GraphError::UnexpectedResult(format!("Cannot read row: {e}")))
}

#[async_trait]
impl GraphSession for Neo4jSession {
    async fn execute_write(&self, cypher: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        self.write_txn(build_query(cypher, params)).await
    }

    async fn run(&self, cypher: &str, params: &Params) -> Result<(), GraphError> {
        self.graph
            .run(build_query(cypher, params))
            .await
            .map_err(classify)
    }

    async fn fetch(&self, cypher: &str, params: &Params) -> Result<Vec<Record>, GraphError> {
        self.collect(build_query(cypher, params)).await
    }
}

fn build_query(cypher: &str, params: &Params) -> Query {
    params
        .iter()
        .fold(query(cypher), |q, (key, value)| q.param(key, to_bolt(value)))
}

/// JSON to Bolt. Integers stay integers so `lastupdated` compares equal to `$UPDATE_TAG`.
pub fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.as_str())),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                bolt.put(BoltString::from(key.as_str()), to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}

fn classify(e: neo4rs::Error) -> GraphError {
    match e {
        neo4rs::Error::IOError { detail } => GraphError::ConnectionReset(detail.to_string()),
        neo4rs::Error::ConnectionError => {
            GraphError::ServiceUnavailable("could not reach the database".to_string())
        }
        neo4rs::Error::Neo4j(err) => GraphError::from_code(err.code(), err.message()),
        other => GraphError::Database(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_macro() {
        let params = params! {
            "UPDATE_TAG" => 1234,
            "AZURE_SUBSCRIPTION_ID" => "sub-1",
        };
        assert_eq!(params.get("UPDATE_TAG"), Some(&json!(1234)));
        assert_eq!(params.get("AZURE_SUBSCRIPTION_ID"), Some(&json!("sub-1")));
        assert!(params!().is_empty());
    }

    #[test]
    fn test_to_bolt_scalars() {
        assert!(matches!(to_bolt(&json!(null)), BoltType::Null(_)));
        assert!(matches!(to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(to_bolt(&json!(7)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&json!(1.5)), BoltType::Float(_)));
        assert!(matches!(to_bolt(&json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_to_bolt_nested() {
        let value = json!([{"id": "a", "ips": ["10.0.0.1"]}]);
        match to_bolt(&value) {
            BoltType::List(list) => {
                assert_eq!(list.len(), 1);
                assert!(matches!(list.get(0), Some(BoltType::Map(_))));
            }
            other => panic!("expected a list, got {other:?}"),
        }
    }

    // Needs a database: NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD, run with --ignored.
    #[tokio::test]
    #[ignore]
    async fn test_execute_write_commits_or_rolls_back() {
        let session = Neo4jSession::connect(&Config::from_env().unwrap())
            .await
            .unwrap();
        let count = "MATCH (n:WriteTxnCheck {id: $id}) RETURN count(n) AS n";
        session
            .run("MATCH (n:WriteTxnCheck) DETACH DELETE n", &Params::new())
            .await
            .unwrap();

        let rows = session
            .execute_write("CREATE (n:WriteTxnCheck {id: $id}) RETURN n.id AS id", &params! { "id" => "kept" })
            .await
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!("kept")));
        let kept = session.fetch(count, &params! { "id" => "kept" }).await.unwrap();
        assert_eq!(kept[0].get("n"), Some(&json!(1)));

        let failed = session
            .execute_write(
                "CREATE (n:WriteTxnCheck {id: $id}) WITH n UNWIND [1, 0] AS d RETURN 1 / d AS x",
                &params! { "id" => "dropped" },
            )
            .await;
        assert!(failed.is_err());
        let dropped = session.fetch(count, &params! { "id" => "dropped" }).await.unwrap();
        assert_eq!(dropped[0].get("n"), Some(&json!(0)));
    }
}
