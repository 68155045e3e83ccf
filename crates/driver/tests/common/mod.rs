//! In-process fake of the remote query service, storage sink, and
//! catalog, scriptable per query for driver integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use noctua_common::config::{DriverConfig, RetrySettings};
use noctua_driver::remote::{
    CatalogApi, ColumnInfo, OutputFormat, QueryExecutionApi, QueryState, ResultsPage,
    StatusSnapshot, StorageApi, TableInfo,
};
use noctua_driver::{normalize_query, QueryCache, Session};
use noctua_error::{DriverError, ErrorCode, Result};

pub const OUTPUT_LOCATION: &str = "s3://results/prefix";

/// Scripted behavior for one query text.
#[derive(Debug, Clone)]
pub struct QueryScript {
    /// Number of QUEUED/RUNNING snapshots before the terminal state
    pub polls_before_terminal: u32,
    pub terminal: QueryState,
    pub failure_reason: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
    pub page_size: usize,
    /// Echo the column names as the first data row of the first page
    pub header_echo: bool,
    pub output_format: OutputFormat,
    /// Parquet payloads written to the output prefix on submission
    pub parquet_parts: Vec<Bytes>,
    pub bytes_scanned: u64,
    pub execution_time_ms: u64,
    /// Transient submit failures before submission succeeds
    pub submit_failures: u32,
    /// Transient status failures before each status call succeeds
    pub status_failures: u32,
    /// Reject cancellation requests
    pub reject_cancel: bool,
}

impl Default for QueryScript {
    fn default() -> Self {
        Self {
            polls_before_terminal: 1,
            terminal: QueryState::Succeeded,
            failure_reason: None,
            columns: vec![
                ColumnInfo {
                    name: "id".to_string(),
                    remote_type: "bigint".to_string(),
                },
                ColumnInfo {
                    name: "name".to_string(),
                    remote_type: "varchar".to_string(),
                },
            ],
            rows: vec![
                vec![Some("1".to_string()), Some("alpha".to_string())],
                vec![Some("2".to_string()), Some("beta".to_string())],
            ],
            page_size: 100,
            header_echo: true,
            output_format: OutputFormat::Csv,
            parquet_parts: Vec::new(),
            bytes_scanned: 1024,
            execution_time_ms: 2500,
            submit_failures: 0,
            status_failures: 0,
            reject_cancel: false,
        }
    }
}

impl QueryScript {
    pub fn failing(reason: &str) -> Self {
        Self {
            terminal: QueryState::Failed,
            failure_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            terminal: QueryState::Cancelled,
            ..Self::default()
        }
    }

    pub fn parquet(parts: Vec<Bytes>) -> Self {
        Self {
            output_format: OutputFormat::Parquet,
            parquet_parts: parts,
            ..Self::default()
        }
    }
}

struct Execution {
    script: QueryScript,
    output_location: String,
    polls_remaining: u32,
    cancelled: bool,
}

#[derive(Default)]
struct State {
    scripts: HashMap<String, QueryScript>,
    executions: HashMap<String, Execution>,
    objects: BTreeMap<String, Bytes>,
    databases: Vec<String>,
    tables: HashMap<String, Vec<TableInfo>>,
    fail_deletes: bool,
}

pub struct FakeRemote {
    state: Mutex<State>,
    submit_count: AtomicUsize,
    cancel_count: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                databases: vec!["default".to_string()],
                ..State::default()
            }),
            submit_count: AtomicUsize::new(0),
            cancel_count: AtomicUsize::new(0),
        })
    }

    pub fn stage(&self, query: &str, script: QueryScript) {
        self.lock().scripts.insert(normalize_query(query), script);
    }

    pub fn stage_table(&self, database: &str, table: TableInfo) {
        let mut state = self.lock();
        if !state.databases.contains(&database.to_string()) {
            state.databases.push(database.to_string());
        }
        state
            .tables
            .entry(database.to_string())
            .or_default()
            .push(table);
    }

    /// Place an object in the storage sink directly, outside any
    /// scripted execution.
    pub fn put_object(&self, key: &str, data: Bytes) {
        self.lock().objects.insert(key.to_string(), data);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.lock().fail_deletes = fail;
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }

    pub fn objects_under(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake remote mutex")
    }
}

#[async_trait]
impl QueryExecutionApi for FakeRemote {
    async fn submit(&self, query: &str, output_location: &str) -> Result<String> {
        let mut state = self.lock();
        let key = normalize_query(query);
        let mut script = state.scripts.get(&key).cloned().unwrap_or_default();

        if script.submit_failures > 0 {
            script.submit_failures -= 1;
            state.scripts.insert(key, script);
            return Err(DriverError::new(
                ErrorCode::ServiceUnavailable,
                "Submission throttled",
            ));
        }

        let id = format!("exec-{:04}", self.submit_count.fetch_add(1, Ordering::SeqCst));
        let location = output_location.trim_end_matches('/').to_string();

        // Materialize the output the way the service would.
        match script.output_format {
            OutputFormat::Csv => {
                state.objects.insert(
                    format!("{}/{}.csv", location, id),
                    Bytes::from_static(b"csv-output"),
                );
                state.objects.insert(
                    format!("{}/{}.csv.metadata", location, id),
                    Bytes::from_static(b"metadata"),
                );
            }
            OutputFormat::Parquet => {
                for (i, part) in script.parquet_parts.iter().enumerate() {
                    state
                        .objects
                        .insert(format!("{}/{}/part-{:05}.parquet", location, id, i), part.clone());
                }
                state.objects.insert(
                    format!("{}/{}/manifest.metadata", location, id),
                    Bytes::from_static(b"metadata"),
                );
            }
        }

        state.executions.insert(
            id.clone(),
            Execution {
                polls_remaining: script.polls_before_terminal,
                output_location: location,
                script,
                cancelled: false,
            },
        );
        Ok(id)
    }

    async fn status(&self, execution_id: &str) -> Result<StatusSnapshot> {
        let mut state = self.lock();
        let exec = state.executions.get_mut(execution_id).ok_or_else(|| {
            DriverError::new(
                ErrorCode::UnknownExecution,
                format!("Unknown execution {}", execution_id),
            )
        })?;

        if exec.script.status_failures > 0 {
            exec.script.status_failures -= 1;
            return Err(DriverError::new(
                ErrorCode::Throttled,
                "Status request throttled",
            ));
        }

        let state_now = if exec.cancelled {
            QueryState::Cancelled
        } else if exec.polls_remaining > 0 {
            let queued = exec.polls_remaining == exec.script.polls_before_terminal;
            exec.polls_remaining -= 1;
            if queued {
                QueryState::Queued
            } else {
                QueryState::Running
            }
        } else {
            exec.script.terminal
        };

        Ok(StatusSnapshot {
            state: state_now,
            reason: if state_now == QueryState::Failed {
                exec.script.failure_reason.clone()
            } else {
                None
            },
            bytes_scanned: Some(exec.script.bytes_scanned),
            execution_time_ms: Some(exec.script.execution_time_ms),
            output_format: exec.script.output_format,
        })
    }

    async fn cancel(&self, execution_id: &str) -> Result<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        let exec = state.executions.get_mut(execution_id).ok_or_else(|| {
            DriverError::new(
                ErrorCode::UnknownExecution,
                format!("Unknown execution {}", execution_id),
            )
        })?;
        if exec.script.reject_cancel {
            return Err(DriverError::new(
                ErrorCode::RemoteFailed,
                "Cancellation rejected",
            ));
        }
        exec.cancelled = true;
        Ok(())
    }

    async fn results_page(
        &self,
        execution_id: &str,
        token: Option<&str>,
    ) -> Result<ResultsPage> {
        let state = self.lock();
        let exec = state.executions.get(execution_id).ok_or_else(|| {
            DriverError::new(
                ErrorCode::UnknownExecution,
                format!("Unknown execution {}", execution_id),
            )
        })?;

        let mut all_rows: Vec<Vec<Option<String>>> = Vec::new();
        if exec.script.header_echo {
            all_rows.push(
                exec.script
                    .columns
                    .iter()
                    .map(|c| Some(c.name.clone()))
                    .collect(),
            );
        }
        all_rows.extend(exec.script.rows.iter().cloned());

        let page_size = exec.script.page_size.max(1);
        let page_index: usize = token.map(|t| t.parse().unwrap_or(0)).unwrap_or(0);
        let start = page_index * page_size;
        let end = (start + page_size).min(all_rows.len());
        let rows = if start < all_rows.len() {
            all_rows[start..end].to_vec()
        } else {
            Vec::new()
        };
        let next_token = if end < all_rows.len() {
            Some((page_index + 1).to_string())
        } else {
            None
        };

        Ok(ResultsPage {
            columns: exec.script.columns.clone(),
            rows,
            next_token,
        })
    }
}

#[async_trait]
impl StorageApi for FakeRemote {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.lock().objects.get(key).cloned().ok_or_else(|| {
            DriverError::new(ErrorCode::StorageFailed, format!("No such object: {}", key))
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_deletes {
            return Err(DriverError::new(
                ErrorCode::StorageFailed,
                format!("Access denied deleting {}", key),
            ));
        }
        state.objects.remove(key);
        Ok(())
    }
}

#[async_trait]
impl CatalogApi for FakeRemote {
    async fn list_databases(&self) -> Result<Vec<String>> {
        Ok(self.lock().databases.clone())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tables
            .get(database)
            .map(|tables| tables.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_table(&self, database: &str, table: &str) -> Result<Option<TableInfo>> {
        Ok(self
            .lock()
            .tables
            .get(database)
            .and_then(|tables| tables.iter().find(|t| t.name == table))
            .cloned())
    }

    async fn delete_table(&self, database: &str, table: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(tables) = state.tables.get_mut(database) {
            tables.retain(|t| t.name != table);
        }
        Ok(())
    }
}

/// Opt-in log output for debugging test failures (`RUST_LOG=debug`).
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a session over the fake with a fresh cache of the given size.
pub fn make_session(remote: &Arc<FakeRemote>, cache_size: usize) -> Arc<Session> {
    init_logging();
    let mut config = DriverConfig::new(OUTPUT_LOCATION);
    config.cache.size = cache_size;
    config.retry = RetrySettings {
        max_attempts: 5,
        max_delay_ms: 60_000,
        quiet: true,
    };
    let cache = Arc::new(QueryCache::new(cache_size));
    Session::connect(
        remote.clone(),
        remote.clone(),
        remote.clone(),
        config,
        cache,
    )
}
