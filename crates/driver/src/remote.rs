//! Capability traits for the remote services the driver drives.
//!
//! The query-execution service, its object-storage output sink, and its
//! metadata catalog are black-box collaborators. The driver only assumes
//! the operations below; wire format, authentication, and credential
//! resolution belong to the implementor.

use async_trait::async_trait;
use bytes::Bytes;
use noctua_error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote lifecycle state of one query run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// True once the remote service will not change the state again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Declared format of the materialized query output.
///
/// Decided by the service at submission time (plain SELECTs write
/// delimited text readable through the inline results API; CTAS and
/// UNLOAD write columnar files that must be read from the storage sink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

/// Point-in-time status of a remote execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: QueryState,
    /// Failure reason, populated when `state` is `Failed`
    pub reason: Option<String>,
    pub bytes_scanned: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub output_format: OutputFormat,
}

impl StatusSnapshot {
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            reason: None,
            bytes_scanned: None,
            execution_time_ms: None,
            output_format: OutputFormat::default(),
        }
    }
}

/// Column descriptor as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Remote type name, e.g. "bigint", "varchar", "decimal(10,2)"
    pub remote_type: String,
}

/// One page of inline results.
#[derive(Debug, Clone, Default)]
pub struct ResultsPage {
    pub columns: Vec<ColumnInfo>,
    /// Row-major cell values; `None` is SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
    /// Opaque continuation token; `None` means the stream is exhausted
    pub next_token: Option<String>,
}

/// Table descriptor from the metadata catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub database: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// Query submission and lifecycle operations.
#[async_trait]
pub trait QueryExecutionApi: Send + Sync {
    /// Submit a query; returns the execution identifier assigned by the service.
    async fn submit(&self, query: &str, output_location: &str) -> Result<String>;

    /// Fetch the current status of an execution.
    async fn status(&self, execution_id: &str) -> Result<StatusSnapshot>;

    /// Request cancellation of a running execution.
    async fn cancel(&self, execution_id: &str) -> Result<()>;

    /// Fetch one page of inline results. `token` of `None` starts from the
    /// beginning; the returned `next_token` continues the stream.
    async fn results_page(
        &self,
        execution_id: &str,
        token: Option<&str>,
    ) -> Result<ResultsPage>;
}

/// Object-storage output sink operations.
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// List object keys under a prefix, in lexicographic order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get_object(&self, key: &str) -> Result<Bytes>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// Metadata catalog operations.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_databases(&self) -> Result<Vec<String>>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>>;

    async fn get_table(&self, database: &str, table: &str) -> Result<Option<TableInfo>>;

    async fn delete_table(&self, database: &str, table: &str) -> Result<()>;
}
