//! Connection/session context.
//!
//! A session bundles the three remote capability handles, the driver
//! configuration, and the shared query cache. Capability handles are
//! immutable after construction; the only mutation over a session's
//! lifetime is flipping the validity flag on close. Result sets hold an
//! `Arc` to their session and read it without coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use noctua_common::config::{CacheSettings, DriverConfig, RetrySettings};
use noctua_common::retry::retry_async;
use noctua_common::warnings::add_warning;
use noctua_error::{DriverError, ErrorCode, Result};
use tracing::{info, warn};

use crate::cache::QueryCache;
use crate::remote::{CatalogApi, QueryExecutionApi, StorageApi, TableInfo};

pub struct Session {
    query_api: Arc<dyn QueryExecutionApi>,
    storage_api: Arc<dyn StorageApi>,
    catalog_api: Arc<dyn CatalogApi>,
    config: DriverConfig,
    retry: RwLock<RetrySettings>,
    cache: Arc<QueryCache>,
    open: AtomicBool,
    interrupt: AtomicBool,
}

impl Session {
    /// Create a session over the given capability handles. The cache is
    /// passed in rather than constructed here so multiple sessions can
    /// share one process-wide instance.
    pub fn connect(
        query_api: Arc<dyn QueryExecutionApi>,
        storage_api: Arc<dyn StorageApi>,
        catalog_api: Arc<dyn CatalogApi>,
        config: DriverConfig,
        cache: Arc<QueryCache>,
    ) -> Arc<Self> {
        cache.set_capacity(config.cache.size);
        if config.cache.clear {
            cache.clear();
        }
        info!(
            target: "session",
            output_location = %config.output_location,
            cache_size = config.cache.size,
            "Session opened"
        );
        Arc::new(Self {
            query_api,
            storage_api,
            catalog_api,
            retry: RwLock::new(config.retry),
            config,
            cache,
            open: AtomicBool::new(true),
            interrupt: AtomicBool::new(false),
        })
    }

    /// True until `close` is called.
    pub fn is_valid(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Close the session. Idempotent: closing an already-closed session
    /// raises a warning, not an error.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!(target: "session", "Session closed");
        } else {
            warn!(target: "session", "Session already closed");
            add_warning("Session already closed".to_string());
        }
    }

    /// Apply new cache and retry settings, process-wide and immediately.
    /// Result sets created afterwards pick them up; in-flight result
    /// sets keep the retry settings they snapshotted at creation.
    pub fn configure(&self, cache: CacheSettings, retry: RetrySettings) {
        self.cache.set_capacity(cache.size);
        if cache.clear {
            self.cache.clear();
        }
        if let Ok(mut guard) = self.retry.write() {
            *guard = retry;
        }
        info!(
            target: "session",
            cache_size = cache.size,
            cache_cleared = cache.clear,
            max_attempts = retry.max_attempts,
            "Driver reconfigured"
        );
    }

    pub fn retry_settings(&self) -> RetrySettings {
        self.retry
            .read()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    pub fn output_location(&self) -> &str {
        &self.config.output_location
    }

    pub fn database(&self) -> Option<&str> {
        self.config.database.as_deref()
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Signal an interrupt to whatever poll loop is currently (or next)
    /// running against this session. Consumed at the next sleep point.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn query_api(&self) -> Arc<dyn QueryExecutionApi> {
        self.query_api.clone()
    }

    pub(crate) fn storage_api(&self) -> Arc<dyn StorageApi> {
        self.storage_api.clone()
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DriverError::new(
                ErrorCode::SessionClosed,
                "Operation on a closed session",
            ))
        }
    }

    /// List databases known to the metadata catalog.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        let catalog = self.catalog_api.clone();
        retry_async(
            "list-databases",
            self.retry_settings(),
            |e: &DriverError| e.is_retryable(),
            move || {
                let catalog = catalog.clone();
                async move { catalog.list_databases().await }
            },
        )
        .await
    }

    /// List tables in one database.
    pub async fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let catalog = self.catalog_api.clone();
        let database = database.to_string();
        retry_async(
            "list-tables",
            self.retry_settings(),
            |e: &DriverError| e.is_retryable(),
            move || {
                let catalog = catalog.clone();
                let database = database.clone();
                async move { catalog.list_tables(&database).await }
            },
        )
        .await
    }

    /// Fetch one table's descriptor, or `None` if absent.
    pub async fn get_table(&self, database: &str, table: &str) -> Result<Option<TableInfo>> {
        self.ensure_open()?;
        let catalog = self.catalog_api.clone();
        let database = database.to_string();
        let table = table.to_string();
        retry_async(
            "get-table",
            self.retry_settings(),
            |e: &DriverError| e.is_retryable(),
            move || {
                let catalog = catalog.clone();
                let database = database.clone();
                let table = table.clone();
                async move { catalog.get_table(&database, &table).await }
            },
        )
        .await
    }

    /// Existence check against the catalog.
    pub async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        Ok(self.get_table(database, table).await?.is_some())
    }

    /// Drop one table from the metadata catalog. Absent tables are a
    /// remote no-op, not an error.
    pub async fn delete_table(&self, database: &str, table: &str) -> Result<()> {
        self.ensure_open()?;
        let catalog = self.catalog_api.clone();
        let database = database.to_string();
        let table = table.to_string();
        retry_async(
            "delete-table",
            self.retry_settings(),
            |e: &DriverError| e.is_retryable(),
            move || {
                let catalog = catalog.clone();
                let database = database.clone();
                let table = table.clone();
                async move { catalog.delete_table(&database, &table).await }
            },
        )
        .await
    }
}
