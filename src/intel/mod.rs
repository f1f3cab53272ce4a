//! Intel modules: each one fetches a vendor's resources and loads them into the graph.

pub mod azure;
