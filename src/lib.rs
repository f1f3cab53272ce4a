//! Graph ingestion engine for cloud inventory.
//!
//! Intel modules describe their nodes and relationships as schemas in [`models`];
//! [`graph`] turns those into Cypher for ingestion and stale-data cleanup, and
//! [`client`] runs the statements against Neo4j.

pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod intel;
pub mod models;
pub mod sync;
pub mod util;

pub use config::Config;
pub use error::{Error, Result};
pub use graph::{GraphJob, GraphStatement};
pub use sync::{build_default_sync, run_with_config};
