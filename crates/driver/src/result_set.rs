//! Result-set lifecycle state machine.
//!
//! One `ResultSet` tracks one submitted query from submission through
//! polling to fetch and clear. State transitions are strictly sequential
//! (`&mut self` everywhere); the only shared mutable state it touches is
//! the process-wide query cache.
//!
//! A result set acquires at most one execution identifier for its
//! lifetime: either a fresh one from submission, or one borrowed from
//! the cache when the same normalized query succeeded before. A borrowed
//! identifier skips submission entirely and re-reads the prior run's
//! materialized output.

use std::sync::Arc;

use noctua_common::config::RetrySettings;
use noctua_common::retry::retry_async;
use noctua_common::warnings::add_warning;
use noctua_error::{DriverError, ErrorCode, ErrorContext, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fetch::{Column, FetchCursor, Frame};
use crate::remote::{QueryState, StatusSnapshot};
use crate::session::Session;

/// Local lifecycle of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Submitted,
    Finished,
    Cleared,
}

/// Read-only execution statistics derived from the last status snapshot
/// and the cursor's progress. Not persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub bytes_scanned: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub row_count: Option<u64>,
}

pub struct ResultSet {
    session: Arc<Session>,
    query: String,
    execution_id: Option<String>,
    output_location: String,
    /// Retry settings snapshotted at creation; later `configure` calls
    /// do not affect an in-flight result set.
    retry: RetrySettings,
    state: Lifecycle,
    last_status: Option<StatusSnapshot>,
    borrowed_from_cache: bool,
    cursor: Option<FetchCursor>,
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("query", &self.query)
            .field("execution_id", &self.execution_id)
            .field("output_location", &self.output_location)
            .field("retry", &self.retry)
            .field("state", &self.state)
            .field("last_status", &self.last_status)
            .field("borrowed_from_cache", &self.borrowed_from_cache)
            .finish_non_exhaustive()
    }
}

impl ResultSet {
    /// Submit a query, consulting the cache first. A cache hit adopts
    /// the prior execution identifier without a remote submission; a
    /// miss submits through the retry helper. Non-blocking: returns as
    /// soon as an identifier is known ("submit now, poll later").
    pub async fn send(session: Arc<Session>, query: &str) -> Result<ResultSet> {
        session.ensure_open()?;

        let mut rs = ResultSet {
            retry: session.retry_settings(),
            output_location: session.output_location().to_string(),
            session,
            query: query.to_string(),
            execution_id: None,
            state: Lifecycle::Created,
            last_status: None,
            borrowed_from_cache: false,
            cursor: None,
        };

        if let Some(cached_id) = rs.session.cache().lookup(query) {
            info!(
                target: "result_set",
                execution_id = %cached_id,
                "Reusing cached execution, skipping submission"
            );
            rs.execution_id = Some(cached_id);
            rs.borrowed_from_cache = true;
            rs.state = Lifecycle::Submitted;
            return Ok(rs);
        }

        let api = rs.session.query_api();
        let submit_query = rs.query.clone();
        let output_location = rs.output_location.clone();
        let execution_id = retry_async(
            "submit-query",
            rs.retry,
            |e: &DriverError| e.is_retryable(),
            move || {
                let api = api.clone();
                let query = submit_query.clone();
                let output_location = output_location.clone();
                async move { api.submit(&query, &output_location).await }
            },
        )
        .await?;

        debug!(target: "result_set", execution_id = %execution_id, "Query submitted");
        rs.execution_id = Some(execution_id);
        rs.state = Lifecycle::Submitted;
        Ok(rs)
    }

    /// The blocking path: submit and poll until a terminal state. A
    /// `FAILED` outcome is surfaced as an error carrying the remote
    /// reason; `CANCELLED` is a non-fatal empty result.
    pub async fn execute(session: Arc<Session>, query: &str) -> Result<ResultSet> {
        let mut rs = Self::send(session, query).await?;
        let status = rs.poll().await?;
        if status.state == QueryState::Failed {
            return Err(rs.failure_error(&status));
        }
        Ok(rs)
    }

    /// Poll the remote status until it leaves QUEUED/RUNNING, sleeping
    /// the session's poll interval between calls. Each status call is
    /// retry-wrapped against transient remote errors; query failure is
    /// a successful poll whose snapshot says `Failed`.
    ///
    /// The sleeps are the only cancellation points: an interrupt raised
    /// via [`Session::interrupt`] triggers a best-effort remote cancel,
    /// surfaces the partial status in the returned error, and leaves the
    /// result set re-pollable.
    pub async fn poll(&mut self) -> Result<StatusSnapshot> {
        self.ensure_usable()?;
        let execution_id = self.require_execution_id()?;

        if self.state == Lifecycle::Finished {
            // Terminal status does not change; answer from the snapshot.
            return Ok(self
                .last_status
                .clone()
                .expect("finished result set has a status"));
        }

        loop {
            let api = self.session.query_api();
            let id = execution_id.clone();
            let status = retry_async(
                "get-status",
                self.retry,
                |e: &DriverError| e.is_retryable(),
                move || {
                    let api = api.clone();
                    let id = id.clone();
                    async move { api.status(&id).await }
                },
            )
            .await?;
            self.last_status = Some(status.clone());

            if status.state.is_terminal() {
                debug!(
                    target: "result_set",
                    execution_id = %execution_id,
                    state = %status.state,
                    "Query reached terminal state"
                );
                self.state = Lifecycle::Finished;
                // Insert only on success, and only for fresh submissions;
                // the cache must never hold an identifier for a query
                // that did not reach success.
                if status.state == QueryState::Succeeded && !self.borrowed_from_cache {
                    self.session.cache().insert(&self.query, &execution_id);
                }
                return Ok(status);
            }

            if self.session.take_interrupt() {
                return Err(self.interrupted(&execution_id).await);
            }
            tokio::time::sleep(self.session.poll_interval()).await;
            if self.session.take_interrupt() {
                return Err(self.interrupted(&execution_id).await);
            }
        }
    }

    /// Fetch up to `n` rows. `n = -1` materializes all remaining rows,
    /// `n = 0` returns an empty frame with the correct column schema.
    /// Polls to completion first if the query is still in flight.
    pub async fn fetch(&mut self, n: i64) -> Result<Frame> {
        self.ensure_usable()?;
        self.require_execution_id()?;

        if self.state != Lifecycle::Finished {
            self.poll().await?;
        }

        let status = self
            .last_status
            .clone()
            .expect("finished result set has a status");
        match status.state {
            QueryState::Failed => Err(self.failure_error(&status)),
            QueryState::Cancelled => Ok(Frame::empty(Vec::new())),
            _ => {
                if self.cursor.is_none() {
                    let execution_id = self.require_execution_id()?;
                    let cursor = FetchCursor::open(
                        status.output_format,
                        self.session.query_api(),
                        self.session.storage_api(),
                        &self.output_location,
                        &execution_id,
                        self.retry,
                    )
                    .await?;
                    self.cursor = Some(cursor);
                }
                self.cursor
                    .as_mut()
                    .expect("cursor was just opened")
                    .fetch(n)
                    .await
            }
        }
    }

    /// Statistics from the last status snapshot plus cursor progress.
    pub fn statistics(&self) -> Result<Statistics> {
        self.ensure_usable()?;
        let status = self.last_status.as_ref();
        Ok(Statistics {
            bytes_scanned: status.and_then(|s| s.bytes_scanned),
            execution_time_ms: status.and_then(|s| s.execution_time_ms),
            row_count: self.cursor.as_ref().map(|c| c.rows_read()),
        })
    }

    /// Release the result set's resources. With caching disabled the
    /// remote output objects are deleted best-effort (failures degrade
    /// to warnings); with caching enabled they are deliberately left in
    /// place, since a future cache hit re-reads them.
    pub async fn clear(&mut self) -> Result<()> {
        if self.state == Lifecycle::Cleared {
            warn!(target: "result_set", "Result set already cleared");
            add_warning("Result set already cleared".to_string());
            return Ok(());
        }

        self.cursor = None;

        if !self.session.cache().is_enabled() {
            if let Some(execution_id) = self.execution_id.clone() {
                self.delete_output(&execution_id).await;
            }
        }

        self.state = Lifecycle::Cleared;
        Ok(())
    }

    /// True while the result set is usable (not cleared, session open).
    pub fn is_valid(&self) -> bool {
        self.state != Lifecycle::Cleared && self.session.is_valid()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn last_status(&self) -> Option<&StatusSnapshot> {
        self.last_status.as_ref()
    }

    /// Column schema, known once a fetch has opened the cursor.
    pub fn columns(&self) -> Option<&[Column]> {
        self.cursor.as_ref().map(|c| c.columns())
    }

    pub fn output_location(&self) -> &str {
        &self.output_location
    }

    /// Whether the execution identifier was borrowed from the cache
    /// rather than freshly submitted.
    pub fn reused_cached_execution(&self) -> bool {
        self.borrowed_from_cache
    }

    async fn interrupted(&self, execution_id: &str) -> DriverError {
        warn!(
            target: "result_set",
            execution_id = %execution_id,
            "Polling interrupted, requesting remote cancellation"
        );
        // Best-effort: the interrupt already in progress outranks cleanup.
        if let Err(e) = self.session.query_api().cancel(execution_id).await {
            warn!(
                target: "result_set",
                execution_id = %execution_id,
                error = %e,
                "Best-effort cancel failed"
            );
            add_warning(format!(
                "Failed to cancel execution {}: {}",
                execution_id, e
            ));
        }
        let state = self
            .last_status
            .as_ref()
            .map(|s| s.state.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        DriverError::new(
            ErrorCode::QueryInterrupted,
            "Polling was interrupted before the query finished",
        )
        .with_context(
            ErrorContext::new()
                .with_execution_id(execution_id)
                .with_query_state(state),
        )
    }

    async fn delete_output(&self, execution_id: &str) {
        let prefix = format!(
            "{}/{}",
            self.output_location.trim_end_matches('/'),
            execution_id
        );
        let storage = self.session.storage_api();

        let keys = match storage.list_objects(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(target: "result_set", prefix = %prefix, error = %e, "Failed to list output objects");
                add_warning(format!("Failed to list output at {}: {}", prefix, e));
                return;
            }
        };

        for key in keys {
            // Listing is by raw prefix; keep only this execution's own
            // objects (`{id}.ext` or `{id}/...`), never a sibling whose
            // identifier merely extends ours.
            if !matches!(key.as_bytes().get(prefix.len()), Some(b'.') | Some(b'/')) {
                continue;
            }
            if let Err(e) = storage.delete_object(&key).await {
                warn!(
                    target: "result_set",
                    key = %key,
                    error = %e,
                    "Failed to delete output object"
                );
                add_warning(format!(
                    "Failed to delete output object {}: {}. Enable query caching (cache size > 0) to avoid repeated deletion attempts.",
                    key, e
                ));
            } else {
                debug!(target: "result_set", key = %key, "Deleted output object");
            }
        }
    }

    fn failure_error(&self, status: &StatusSnapshot) -> DriverError {
        let reason = status
            .reason
            .clone()
            .unwrap_or_else(|| "no reason reported".to_string());
        let mut context = ErrorContext::new()
            .with_query_state(status.state.to_string())
            .with_reason(reason.clone())
            .with_output_location(self.output_location.clone());
        if let Some(id) = &self.execution_id {
            context = context.with_execution_id(id.clone());
        }
        DriverError::new(
            ErrorCode::QueryFailed,
            format!("Query execution failed: {}", reason),
        )
        .with_context(context)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == Lifecycle::Cleared {
            let mut context = ErrorContext::new();
            if let Some(id) = &self.execution_id {
                context = context.with_execution_id(id.clone());
            }
            return Err(DriverError::new(
                ErrorCode::ResultSetCleared,
                "Operation on a cleared result set",
            )
            .with_context(context));
        }
        self.session.ensure_open()
    }

    fn require_execution_id(&self) -> Result<String> {
        match &self.execution_id {
            Some(id) => Ok(id.clone()),
            None => Err(DriverError::new(
                ErrorCode::NotSubmitted,
                "Result set has no execution identifier",
            )),
        }
    }
}
