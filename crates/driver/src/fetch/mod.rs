//! Paginated fetch engine.
//!
//! Converts the remote service's result representation into a uniform
//! typed row stream behind one cursor interface. The backend is chosen
//! once per result set from the output format the service declared:
//! inline token-paginated rows for delimited output, direct parquet
//! decoding from the storage sink for columnar output.
//!
//! The stream is lazy, single-pass, and non-restartable: once the cursor
//! advances past a row it cannot be re-read without re-running the fetch
//! from the remote output. Callers needing replay must buffer, or use
//! `fetch(-1)` which materializes everything at once.

mod columnar;
mod inline;
pub mod types;

pub use types::{Column, ColumnType, Datum, Frame};

use std::sync::Arc;

use noctua_common::config::RetrySettings;
use noctua_error::Result;

use crate::remote::{OutputFormat, QueryExecutionApi, StorageApi};

use columnar::ColumnarCursor;
use inline::InlineCursor;

/// Cursor over one execution's output, dispatched on the output format
/// recorded at creation time.
pub(crate) enum FetchCursor {
    Inline(InlineCursor),
    Columnar(ColumnarCursor),
}

impl FetchCursor {
    pub(crate) async fn open(
        format: OutputFormat,
        api: Arc<dyn QueryExecutionApi>,
        storage: Arc<dyn StorageApi>,
        output_location: &str,
        execution_id: &str,
        retry: RetrySettings,
    ) -> Result<Self> {
        match format {
            OutputFormat::Csv => Ok(FetchCursor::Inline(
                InlineCursor::open(api, execution_id.to_string(), retry).await?,
            )),
            OutputFormat::Parquet => Ok(FetchCursor::Columnar(
                ColumnarCursor::open(storage, output_location, execution_id, retry).await?,
            )),
        }
    }

    pub(crate) async fn fetch(&mut self, n: i64) -> Result<Frame> {
        match self {
            FetchCursor::Inline(cursor) => cursor.fetch(n).await,
            FetchCursor::Columnar(cursor) => cursor.fetch(n).await,
        }
    }

    pub(crate) fn columns(&self) -> &[Column] {
        match self {
            FetchCursor::Inline(cursor) => cursor.columns(),
            FetchCursor::Columnar(cursor) => cursor.columns(),
        }
    }

    pub(crate) fn rows_read(&self) -> u64 {
        match self {
            FetchCursor::Inline(cursor) => cursor.rows_read(),
            FetchCursor::Columnar(cursor) => cursor.rows_read(),
        }
    }
}
