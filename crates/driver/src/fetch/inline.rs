//! Inline fetch backend.
//!
//! Streams rows straight from the remote results API, coalescing
//! token-paginated pages into one logical stream. The very first page
//! may echo the column header as its first data row (an artifact of the
//! remote API's delimited output); that row is skipped.

use std::collections::VecDeque;
use std::sync::Arc;

use noctua_common::config::RetrySettings;
use noctua_common::retry::retry_async;
use noctua_error::{DriverError, Result};
use tracing::debug;

use crate::fetch::types::{parse_inline, Column, ColumnType, Datum, Frame};
use crate::remote::{QueryExecutionApi, ResultsPage};

pub(crate) struct InlineCursor {
    api: Arc<dyn QueryExecutionApi>,
    execution_id: String,
    retry: RetrySettings,
    columns: Vec<Column>,
    buffer: VecDeque<Vec<Datum>>,
    next_token: Option<String>,
    remote_exhausted: bool,
    rows_read: u64,
}

impl InlineCursor {
    /// Open the cursor by fetching the first page eagerly, so the column
    /// schema is known even for a zero-row fetch.
    pub(crate) async fn open(
        api: Arc<dyn QueryExecutionApi>,
        execution_id: String,
        retry: RetrySettings,
    ) -> Result<Self> {
        let mut cursor = Self {
            api,
            execution_id,
            retry,
            columns: Vec::new(),
            buffer: VecDeque::new(),
            next_token: None,
            remote_exhausted: false,
            rows_read: 0,
        };

        let page = cursor.request_page().await?;
        cursor.columns = page
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                ty: ColumnType::from_remote(&c.remote_type),
            })
            .collect();
        cursor.ingest(page, true);
        Ok(cursor)
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Fetch up to `n` rows (`n < 0` drains the stream). Single-pass:
    /// consumed rows cannot be re-read.
    pub(crate) async fn fetch(&mut self, n: i64) -> Result<Frame> {
        if n == 0 {
            return Ok(Frame::empty(self.columns.clone()));
        }
        let wanted = if n < 0 { None } else { Some(n as usize) };

        while !self.remote_exhausted && wanted.map_or(true, |w| self.buffer.len() < w) {
            let page = self.request_page().await?;
            self.ingest(page, false);
        }

        let take = wanted.map_or(self.buffer.len(), |w| w.min(self.buffer.len()));
        let rows: Vec<Vec<Datum>> = self.buffer.drain(..take).collect();
        self.rows_read += rows.len() as u64;

        Ok(Frame {
            columns: self.columns.clone(),
            rows,
        })
    }

    async fn request_page(&self) -> Result<ResultsPage> {
        let api = self.api.clone();
        let id = self.execution_id.clone();
        let token = self.next_token.clone();
        retry_async(
            "get-results-page",
            self.retry,
            |e: &DriverError| e.is_retryable(),
            move || {
                let api = api.clone();
                let id = id.clone();
                let token = token.clone();
                async move { api.results_page(&id, token.as_deref()).await }
            },
        )
        .await
    }

    fn ingest(&mut self, page: ResultsPage, first_page: bool) {
        let mut rows = page.rows.into_iter();

        if first_page {
            // The first row of the first page can duplicate the column
            // header; compare against the declared names before skipping.
            if let Some(first) = rows.next() {
                let is_header_echo = first.len() == self.columns.len()
                    && first
                        .iter()
                        .zip(&self.columns)
                        .all(|(cell, col)| cell.as_deref() == Some(col.name.as_str()));
                if is_header_echo {
                    debug!(
                        target: "fetch",
                        execution_id = %self.execution_id,
                        "Skipping header echo on first results page"
                    );
                } else {
                    let converted = self.convert(first);
                    self.buffer.push_back(converted);
                }
            }
        }

        for row in rows {
            let converted = self.convert(row);
            self.buffer.push_back(converted);
        }

        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.remote_exhausted = true;
        }
    }

    fn convert(&self, row: Vec<Option<String>>) -> Vec<Datum> {
        row.into_iter()
            .zip(&self.columns)
            .map(|(cell, col)| parse_inline(col.ty, cell))
            .collect()
    }
}
