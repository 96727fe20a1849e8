//! Row decoding for each supported backend.
//!
//! Every column is turned into a [`Cell`]. Numeric types keep their numeric
//! form; decimals, dates, times and UUIDs become their text form, which is
//! what labels need and what the value column can still parse as a number.
//! Types with no dedicated arm fall back to their raw bytes.

use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::postgres::types::Oid;
use sqlx::sqlite::SqliteRow;
use sqlx::types::BigDecimal;
use sqlx::types::Uuid;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::{Cell, DatabaseError};

pub(super) fn decode_postgres_row(row: &PgRow) -> Result<Vec<Cell>, DatabaseError> {
    (0..row.len()).map(|i| decode_postgres_cell(row, i)).collect()
}

pub(super) fn decode_mysql_row(row: &MySqlRow) -> Result<Vec<Cell>, DatabaseError> {
    (0..row.len()).map(|i| decode_mysql_cell(row, i)).collect()
}

pub(super) fn decode_sqlite_row(row: &SqliteRow) -> Result<Vec<Cell>, DatabaseError> {
    (0..row.len()).map(|i| decode_sqlite_cell(row, i)).collect()
}

/// Try each listed type in order; the first that decodes wins.
macro_rules! try_decode {
    ($row:expr, $index:expr, $($ty:ty => $to_cell:expr),+ $(,)?) => {
        $(
            if let Ok(v) = $row.try_get::<$ty, _>($index) {
                let to_cell: fn($ty) -> Cell = $to_cell;
                return Ok(to_cell(v));
            }
        )+
    };
}

fn decode_postgres_cell(row: &PgRow, index: usize) -> Result<Cell, DatabaseError> {
    if row.try_get_raw(index).map_err(DatabaseError::Query)?.is_null() {
        return Ok(Cell::Null);
    }

    try_decode!(row, index,
        i64 => Cell::Int,
        i32 => |v| Cell::Int(i64::from(v)),
        i16 => |v| Cell::Int(i64::from(v)),
        f64 => Cell::Float,
        f32 => |v| Cell::Float(f64::from(v)),
        bool => Cell::Bool,
        BigDecimal => |v| Cell::Text(v.to_string()),
        Oid => |v| Cell::Int(i64::from(v.0)),
        // TEXT, VARCHAR, BPCHAR and NAME.
        String => Cell::Text,
        // The single-byte "char" type.
        i8 => |v| Cell::Text(char::from(v as u8).to_string()),
        Uuid => |v| Cell::Text(v.to_string()),
        NaiveDate => |v| Cell::Text(v.to_string()),
        NaiveTime => |v| Cell::Text(v.to_string()),
        NaiveDateTime => |v| Cell::Text(v.to_string()),
        DateTime<Utc> => |v| Cell::Text(v.to_string()),
        Vec<u8> => Cell::Bytes,
    );

    fallback(row, index)
}

fn decode_mysql_cell(row: &MySqlRow, index: usize) -> Result<Cell, DatabaseError> {
    if row.try_get_raw(index).map_err(DatabaseError::Query)?.is_null() {
        return Ok(Cell::Null);
    }

    try_decode!(row, index,
        i64 => Cell::Int,
        u64 => |v| match i64::try_from(v) {
            Ok(v) => Cell::Int(v),
            Err(_) => Cell::Float(v as f64),
        },
        f64 => Cell::Float,
        f32 => |v| Cell::Float(f64::from(v)),
        bool => Cell::Bool,
        BigDecimal => |v| Cell::Text(v.to_string()),
        // CHAR, VARCHAR, TEXT and ENUM.
        String => Cell::Text,
        NaiveDate => |v| Cell::Text(v.to_string()),
        NaiveTime => |v| Cell::Text(v.to_string()),
        NaiveDateTime => |v| Cell::Text(v.to_string()),
        DateTime<Utc> => |v| Cell::Text(v.to_string()),
        Vec<u8> => Cell::Bytes,
    );

    fallback(row, index)
}

fn decode_sqlite_cell(row: &SqliteRow, index: usize) -> Result<Cell, DatabaseError> {
    if row.try_get_raw(index).map_err(DatabaseError::Query)?.is_null() {
        return Ok(Cell::Null);
    }

    try_decode!(row, index,
        i64 => Cell::Int,
        f64 => Cell::Float,
        bool => Cell::Bool,
        String => Cell::Text,
        Vec<u8> => Cell::Bytes,
    );

    fallback(row, index)
}

/// Read a column of a type with no dedicated decoder (enums, JSON, network
/// addresses, ...) as its raw bytes, skipping the type check.
fn fallback<R>(row: &R, index: usize) -> Result<Cell, DatabaseError>
where
    R: Row,
    usize: sqlx::ColumnIndex<R>,
    for<'r> Vec<u8>: sqlx::Decode<'r, R::Database>,
    for<'r> String: sqlx::Decode<'r, R::Database>,
{
    if let Ok(v) = row.try_get_unchecked::<String, _>(index) {
        return Ok(Cell::Text(v));
    }
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
        return Ok(Cell::Bytes(v));
    }

    let column = &row.columns()[index];
    Err(DatabaseError::Decode {
        column: index,
        name: column.name().to_string(),
        type_name: column.type_info().name().to_string(),
    })
}
