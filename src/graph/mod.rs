//! Turns schemas into Cypher and runs cleanup jobs.
//!
//! - [`querybuilder`] - ingestion, MatchLink, index and conditional label queries
//! - [`cleanupbuilder`] - stale node and relationship deletion queries
//! - [`statement`] and [`job`] - running those queries, iteratively where needed

pub mod cleanupbuilder;
pub mod job;
pub mod querybuilder;
pub mod statement;

pub use job::GraphJob;
pub use statement::GraphStatement;
