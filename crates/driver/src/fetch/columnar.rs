//! Columnar fetch backend.
//!
//! CTAS/UNLOAD executions materialize parquet files at the output
//! location instead of inline rows. This cursor lists the objects under
//! `output_location/execution_id/`, decodes them one record batch at a
//! time, and paginates over row-group boundaries rather than
//! continuation tokens.

use std::collections::VecDeque;
use std::sync::Arc;

use noctua_common::config::RetrySettings;
use noctua_common::retry::retry_async;
use noctua_error::{DriverError, Result};
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use tracing::debug;

use crate::fetch::types::{datum_from_array, Column, ColumnType, Datum, Frame};
use crate::remote::StorageApi;

pub(crate) struct ColumnarCursor {
    storage: Arc<dyn StorageApi>,
    retry: RetrySettings,
    keys: VecDeque<String>,
    reader: Option<ParquetRecordBatchReader>,
    columns: Vec<Column>,
    buffer: VecDeque<Vec<Datum>>,
    rows_read: u64,
}

impl ColumnarCursor {
    /// Open the cursor: list the output objects and decode the schema
    /// from the first file, so a zero-row fetch still reports columns.
    pub(crate) async fn open(
        storage: Arc<dyn StorageApi>,
        output_location: &str,
        execution_id: &str,
        retry: RetrySettings,
    ) -> Result<Self> {
        let prefix = format!(
            "{}/{}",
            output_location.trim_end_matches('/'),
            execution_id
        );

        let list_storage = storage.clone();
        let list_prefix = prefix.clone();
        let keys = retry_async(
            "list-output-objects",
            retry,
            |e: &DriverError| e.is_retryable(),
            move || {
                let storage = list_storage.clone();
                let prefix = list_prefix.clone();
                async move { storage.list_objects(&prefix).await }
            },
        )
        .await?;

        // Listing is by raw prefix, so an identifier that extends ours
        // (`exec-10` under a listing for `exec-1`) can slip in; anchor on
        // the `/` boundary. The service also writes a sidecar metadata
        // object alongside the data files; only the data files are
        // decodable.
        let keys: VecDeque<String> = keys
            .into_iter()
            .filter(|k| {
                matches!(k.as_bytes().get(prefix.len()), Some(b'/'))
                    && !k.ends_with(".metadata")
            })
            .collect();

        debug!(
            target: "fetch",
            prefix = %prefix,
            files = keys.len(),
            "Opened columnar cursor"
        );

        let mut cursor = Self {
            storage,
            retry,
            keys,
            reader: None,
            columns: Vec::new(),
            buffer: VecDeque::new(),
            rows_read: 0,
        };
        // Prime the first reader so the schema is available immediately.
        cursor.advance_reader().await?;
        Ok(cursor)
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Fetch up to `n` rows (`n < 0` drains the stream). Single-pass.
    pub(crate) async fn fetch(&mut self, n: i64) -> Result<Frame> {
        if n == 0 {
            return Ok(Frame::empty(self.columns.clone()));
        }
        let wanted = if n < 0 { None } else { Some(n as usize) };

        while wanted.map_or(true, |w| self.buffer.len() < w) {
            if !self.fill().await? {
                break;
            }
        }

        let take = wanted.map_or(self.buffer.len(), |w| w.min(self.buffer.len()));
        let rows: Vec<Vec<Datum>> = self.buffer.drain(..take).collect();
        self.rows_read += rows.len() as u64;

        Ok(Frame {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Pull the next record batch into the buffer. Returns false once
    /// every object has been fully decoded.
    async fn fill(&mut self) -> Result<bool> {
        loop {
            if let Some(reader) = self.reader.as_mut() {
                match reader.next() {
                    Some(batch) => {
                        let batch = batch?;
                        for row in 0..batch.num_rows() {
                            let mut cells = Vec::with_capacity(batch.num_columns());
                            for col in 0..batch.num_columns() {
                                cells.push(datum_from_array(batch.column(col).as_ref(), row)?);
                            }
                            self.buffer.push_back(cells);
                        }
                        return Ok(true);
                    }
                    None => self.reader = None,
                }
            } else if !self.advance_reader().await? {
                return Ok(false);
            }
        }
    }

    /// Open a reader over the next output object, recording the schema
    /// from the first one. Returns false when no objects remain.
    async fn advance_reader(&mut self) -> Result<bool> {
        let Some(key) = self.keys.pop_front() else {
            return Ok(false);
        };

        let storage = self.storage.clone();
        let get_key = key.clone();
        let bytes = retry_async(
            "get-output-object",
            self.retry,
            |e: &DriverError| e.is_retryable(),
            move || {
                let storage = storage.clone();
                let key = get_key.clone();
                async move { storage.get_object(&key).await }
            },
        )
        .await?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
        if self.columns.is_empty() {
            self.columns = builder
                .schema()
                .fields()
                .iter()
                .map(|f| Column {
                    name: f.name().clone(),
                    ty: ColumnType::from_arrow(f.data_type()),
                })
                .collect();
        }
        self.reader = Some(builder.build()?);
        debug!(target: "fetch", key = %key, "Decoding output object");
        Ok(true)
    }
}
