//! Row mapping between Postgres and [`Value`].

use crate::error::QueryError;
use crate::target::PrimaryKey;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sentiment_sql::ColumnName;
use tokio_postgres::types::{IsNull, ToSql, Type};
use uuid::Uuid;

/// One selected row: its primary-key values (in key order) and its input text.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub key: Vec<(ColumnName, Value)>,
    pub input: Option<String>,
}

impl RowRecord {
    /// `id=1` or `tenant_id=3, review_no=7`, for logs and failure reports.
    pub fn describe_key(&self) -> String {
        self.key
            .iter()
            .map(|(col, value)| format!("{}={}", col.as_str(), value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Decode a selected row laid out as `key columns..., input column`.
    pub fn from_pg_row(pg_row: &tokio_postgres::Row, pk: &PrimaryKey) -> Result<Self, QueryError> {
        let key = pk
            .names()
            .enumerate()
            .map(|(idx, name)| Ok((name.clone(), pg_value_to_value(pg_row, idx)?)))
            .collect::<Result<Vec<_>, QueryError>>()?;

        let input_idx = key.len();
        let input_column = pg_row.columns()[input_idx].name();
        let input: Option<String> =
            pg_row
                .try_get(input_idx)
                .map_err(|source| QueryError::ColumnRead {
                    column: input_column.to_string(),
                    expected: "text",
                    source,
                })?;

        Ok(Self { key, input })
    }
}

/// Extract a value from a Postgres row at a given index, driven by the
/// column's Postgres type.
pub fn pg_value_to_value(row: &tokio_postgres::Row, idx: usize) -> Result<Value, QueryError> {
    let column = &row.columns()[idx];
    let read_error = |expected: &'static str| {
        move |source| QueryError::ColumnRead {
            column: column.name().to_string(),
            expected,
            source,
        }
    };

    let ty = column.type_();
    let value = if *ty == Type::BOOL {
        let v: Option<bool> = row.try_get(idx).map_err(read_error("bool"))?;
        v.map(Value::Bool)
    } else if *ty == Type::INT2 {
        let v: Option<i16> = row.try_get(idx).map_err(read_error("smallint"))?;
        v.map(Value::I16)
    } else if *ty == Type::INT4 {
        let v: Option<i32> = row.try_get(idx).map_err(read_error("integer"))?;
        v.map(Value::I32)
    } else if *ty == Type::INT8 {
        let v: Option<i64> = row.try_get(idx).map_err(read_error("bigint"))?;
        v.map(Value::I64)
    } else if *ty == Type::FLOAT4 {
        let v: Option<f32> = row.try_get(idx).map_err(read_error("real"))?;
        v.map(Value::F32)
    } else if *ty == Type::FLOAT8 {
        let v: Option<f64> = row.try_get(idx).map_err(read_error("double precision"))?;
        v.map(Value::F64)
    } else if *ty == Type::NUMERIC {
        let v: Option<Decimal> = row.try_get(idx).map_err(read_error("numeric"))?;
        v.map(Value::Decimal)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
        let v: Option<String> = row.try_get(idx).map_err(read_error("text"))?;
        v.map(Value::String)
    } else if *ty == Type::BYTEA {
        let v: Option<Vec<u8>> = row.try_get(idx).map_err(read_error("bytea"))?;
        v.map(Value::Bytes)
    } else if *ty == Type::UUID {
        let v: Option<Uuid> = row.try_get(idx).map_err(read_error("uuid"))?;
        v.map(Value::Uuid)
    } else if *ty == Type::DATE {
        let v: Option<NaiveDate> = row.try_get(idx).map_err(read_error("date"))?;
        v.map(Value::Date)
    } else if *ty == Type::TIMESTAMP {
        let v: Option<NaiveDateTime> = row.try_get(idx).map_err(read_error("timestamp"))?;
        v.map(Value::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        let v: Option<DateTime<Utc>> = row.try_get(idx).map_err(read_error("timestamptz"))?;
        v.map(Value::TimestampTz)
    } else {
        return Err(QueryError::UnsupportedType {
            column: column.name().to_string(),
            pg_type: ty.name().to_string(),
        });
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Postgres types a [`Value`] can be decoded from and bound to.
const KEY_TYPES: &[Type] = &[
    Type::BOOL,
    Type::INT2,
    Type::INT4,
    Type::INT8,
    Type::FLOAT4,
    Type::FLOAT8,
    Type::NUMERIC,
    Type::TEXT,
    Type::VARCHAR,
    Type::BPCHAR,
    Type::NAME,
    Type::BYTEA,
    Type::UUID,
    Type::DATE,
    Type::TIMESTAMP,
    Type::TIMESTAMPTZ,
];

/// Whether a column of type `schema.name` (as in `pg_type`) can be read
/// into a [`Value`] and bound back without going through text.
pub fn is_native_key_type(schema: &str, name: &str) -> bool {
    schema == "pg_catalog" && KEY_TYPES.iter().any(|ty| ty.name() == name)
}

/// Wrapper to make our Value usable as a ToSql parameter.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        // Delegate through the checked path so a value bound against the
        // wrong column type is a WrongType error instead of garbage bytes.
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::I16(v) => v.to_sql_checked(ty, out),
            Value::I32(v) => v.to_sql_checked(ty, out),
            Value::I64(v) => v.to_sql_checked(ty, out),
            Value::F32(v) => v.to_sql_checked(ty, out),
            Value::F64(v) => v.to_sql_checked(ty, out),
            Value::Decimal(v) => v.to_sql_checked(ty, out),
            Value::String(v) => v.to_sql_checked(ty, out),
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
            Value::TimestampTz(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        KEY_TYPES.contains(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}
