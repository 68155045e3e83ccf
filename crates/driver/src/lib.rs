//! # noctua-driver
//!
//! A synchronous connection/result-set driver for a remote, asynchronous,
//! pay-per-query SQL execution service.
//!
//! The service runs queries asynchronously: submit returns an execution
//! identifier, status is polled, and finished output is materialized at
//! an object-storage location. This crate turns that into the familiar
//! connect / send / fetch / clear shape:
//!
//! - [`session::Session`]: capability handles, defaults, validity flag.
//! - [`result_set::ResultSet`]: per-query state machine covering
//!   submission, bounded-backoff polling, terminal-state handling, and
//!   cleanup.
//! - [`cache::QueryCache`]: process-wide LRU keyed by normalized query
//!   text, letting a repeated query reuse a prior execution's output
//!   instead of re-running (and re-paying for) it.
//! - [`fetch`]: cursor-based typed pagination over either inline
//!   token-paginated rows or parquet files read from the storage sink.
//! - [`remote`]: the capability traits the black-box services implement.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::connect(query_api, storage_api, catalog_api, config, cache);
//! let mut rs = ResultSet::execute(session.clone(), "SELECT * FROM t").await?;
//! let frame = rs.fetch(100).await?;
//! rs.clear().await?;
//! ```

pub mod cache;
pub mod fetch;
pub mod remote;
pub mod result_set;
pub mod session;

pub use cache::{normalize_query, QueryCache};
pub use fetch::{Column, ColumnType, Datum, Frame};
pub use remote::{
    CatalogApi, ColumnInfo, OutputFormat, QueryExecutionApi, QueryState, ResultsPage, StatusSnapshot,
    StorageApi, TableInfo,
};
pub use result_set::{ResultSet, Statistics};
pub use session::Session;
