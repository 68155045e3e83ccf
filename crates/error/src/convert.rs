//! Conversions from third-party error types into `DriverError`.

use crate::{DriverError, ErrorCode};

impl From<parquet::errors::ParquetError> for DriverError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        DriverError::new(
            ErrorCode::DecodeFailed,
            format!("Parquet decode failed: {}", err),
        )
    }
}

impl From<arrow::error::ArrowError> for DriverError {
    fn from(err: arrow::error::ArrowError) -> Self {
        DriverError::new(
            ErrorCode::DecodeFailed,
            format!("Arrow decode failed: {}", err),
        )
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::new(
            ErrorCode::Internal,
            format!("Serialization failed: {}", err),
        )
    }
}
