//! Graph database access.
//!
//! - [`session`] - the [`GraphSession`] trait and its Neo4j implementation
//! - [`tx`] - loading through schemas, retries, index management and read helpers
//! - [`recording`] - an in-memory session for tests

pub mod recording;
pub mod session;
pub mod tx;

pub use serde_json::Value;
pub use session::{GraphSession, Neo4jSession, Params, Record};
pub use tx::{load, load_matchlinks, load_with_defaults};
