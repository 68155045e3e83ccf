//! Column typing for the fetch engine.
//!
//! Each column's declared remote type maps to one fixed target datum
//! type; unrecognized types default to string. Decimals stay exact
//! strings rather than lossy floats.

use arrow::array::{
    Array, BooleanArray, Date32Array, Float32Array, Float64Array, Int16Array, Int32Array,
    Int64Array, Int8Array, LargeStringArray, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray, TimestampSecondArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::util::display::array_value_to_string;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use noctua_error::{DriverError, ErrorCode, Result};
use serde::Serialize;

/// Target type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Date,
    Timestamp,
    Decimal,
    Str,
}

impl ColumnType {
    /// Map a remote type name (e.g. "bigint", "decimal(10,2)") to a
    /// target type. Unrecognized names default to `Str`.
    pub fn from_remote(remote_type: &str) -> Self {
        let ty = remote_type.trim().to_lowercase();
        match ty.as_str() {
            "tinyint" | "smallint" | "int" | "integer" | "bigint" => ColumnType::Int,
            "float" | "real" | "double" => ColumnType::Float,
            "boolean" => ColumnType::Bool,
            "date" => ColumnType::Date,
            "timestamp" => ColumnType::Timestamp,
            _ if ty.starts_with("decimal") => ColumnType::Decimal,
            _ => ColumnType::Str,
        }
    }

    /// Map an arrow type from a columnar output file to a target type.
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Int,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => ColumnType::Float,
            DataType::Boolean => ColumnType::Bool,
            DataType::Date32 | DataType::Date64 => ColumnType::Date,
            DataType::Timestamp(_, _) => ColumnType::Timestamp,
            DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => ColumnType::Decimal,
            _ => ColumnType::Str,
        }
    }
}

/// One typed result column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Datum {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Exact decimal representation, not parsed to float
    Decimal(String),
    Str(String),
}

/// One fetched slice of rows with its column schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Datum>>,
}

impl Frame {
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Parse an inline (textual) cell into its target type.
///
/// Values that fail to parse fall back to `Str` rather than failing the
/// whole fetch; the remote service occasionally emits representations we
/// do not model (e.g. infinity markers).
pub fn parse_inline(ty: ColumnType, value: Option<String>) -> Datum {
    let Some(v) = value else {
        return Datum::Null;
    };
    match ty {
        ColumnType::Int => v.parse::<i64>().map(Datum::Int).unwrap_or(Datum::Str(v)),
        ColumnType::Float => v.parse::<f64>().map(Datum::Float).unwrap_or(Datum::Str(v)),
        ColumnType::Bool => match v.to_lowercase().as_str() {
            "true" => Datum::Bool(true),
            "false" => Datum::Bool(false),
            _ => Datum::Str(v),
        },
        ColumnType::Date => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(Datum::Date)
            .unwrap_or(Datum::Str(v)),
        ColumnType::Timestamp => NaiveDateTime::parse_from_str(&v, "%Y-%m-%d %H:%M:%S%.f")
            .map(Datum::Timestamp)
            .unwrap_or(Datum::Str(v)),
        ColumnType::Decimal => Datum::Decimal(v),
        ColumnType::Str => Datum::Str(v),
    }
}

fn downcast<'a, T: 'static>(array: &'a dyn Array) -> Result<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        DriverError::new(
            ErrorCode::DecodeFailed,
            format!("Unexpected array type for {:?}", array.data_type()),
        )
    })
}

/// Decode one cell of an arrow array into its target datum.
pub fn datum_from_array(array: &dyn Array, row: usize) -> Result<Datum> {
    if array.is_null(row) {
        return Ok(Datum::Null);
    }
    let datum = match array.data_type() {
        DataType::Boolean => Datum::Bool(downcast::<BooleanArray>(array)?.value(row)),
        DataType::Int8 => Datum::Int(downcast::<Int8Array>(array)?.value(row) as i64),
        DataType::Int16 => Datum::Int(downcast::<Int16Array>(array)?.value(row) as i64),
        DataType::Int32 => Datum::Int(downcast::<Int32Array>(array)?.value(row) as i64),
        DataType::Int64 => Datum::Int(downcast::<Int64Array>(array)?.value(row)),
        DataType::UInt8 => Datum::Int(downcast::<UInt8Array>(array)?.value(row) as i64),
        DataType::UInt16 => Datum::Int(downcast::<UInt16Array>(array)?.value(row) as i64),
        DataType::UInt32 => Datum::Int(downcast::<UInt32Array>(array)?.value(row) as i64),
        DataType::UInt64 => Datum::Int(downcast::<UInt64Array>(array)?.value(row) as i64),
        DataType::Float32 => Datum::Float(downcast::<Float32Array>(array)?.value(row) as f64),
        DataType::Float64 => Datum::Float(downcast::<Float64Array>(array)?.value(row)),
        DataType::Utf8 => Datum::Str(downcast::<StringArray>(array)?.value(row).to_string()),
        DataType::LargeUtf8 => {
            Datum::Str(downcast::<LargeStringArray>(array)?.value(row).to_string())
        }
        DataType::Date32 => {
            let days = downcast::<Date32Array>(array)?.value(row);
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch is a valid date");
            Datum::Date(epoch + Duration::days(days as i64))
        }
        DataType::Timestamp(unit, _) => {
            let dt = match unit {
                TimeUnit::Second => {
                    let v = downcast::<TimestampSecondArray>(array)?.value(row);
                    DateTime::from_timestamp(v, 0)
                }
                TimeUnit::Millisecond => {
                    let v = downcast::<TimestampMillisecondArray>(array)?.value(row);
                    DateTime::from_timestamp_millis(v)
                }
                TimeUnit::Microsecond => {
                    let v = downcast::<TimestampMicrosecondArray>(array)?.value(row);
                    DateTime::from_timestamp_micros(v)
                }
                TimeUnit::Nanosecond => {
                    let v = downcast::<TimestampNanosecondArray>(array)?.value(row);
                    Some(DateTime::from_timestamp_nanos(v))
                }
            };
            match dt {
                Some(dt) => Datum::Timestamp(dt.naive_utc()),
                None => Datum::Str(array_value_to_string(array, row)?),
            }
        }
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => {
            Datum::Decimal(array_value_to_string(array, row)?)
        }
        _ => Datum::Str(array_value_to_string(array, row)?),
    };
    Ok(datum)
}
