//! Schema inspection against the catalog.
//!
//! The table name is first resolved with `to_regclass`, which follows the
//! connection's `search_path` exactly as the later SELECT and UPDATE will.
//! Everything after that filters `information_schema` on the resolved schema.
//!
//! Catalog identifiers are `sql_identifier` domains, so every comparison
//! casts the bound parameter to `text` and every projected name is cast back
//! to `text` before it is read.

use crate::error::{QueryError, SchemaError};
use crate::row::is_native_key_type;
use crate::target::{KeyColumn, PrimaryKey, QualifiedTable, TargetSpec};
use crate::traced::TransactionExt;
use sentiment_sql::{ColumnName, TypeRef};
use tokio_postgres::Transaction;

const RESOLVE_SQL: &str = "\
SELECT n.nspname::text
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.oid = to_regclass($1::text)";

const PRIMARY_KEY_SQL: &str = "\
SELECT column_name::text
FROM information_schema.table_constraints
JOIN information_schema.key_column_usage
    USING (constraint_catalog, constraint_schema, constraint_name,
           table_catalog, table_schema, table_name)
WHERE constraint_type = 'PRIMARY KEY'
    AND table_schema = $1::text
    AND table_name = $2::text
ORDER BY ordinal_position";

const COLUMNS_SQL: &str = "\
SELECT column_name::text,
    data_type::text,
    COALESCE(domain_schema, udt_schema)::text,
    COALESCE(domain_name, udt_name)::text
FROM information_schema.columns
WHERE table_schema = $1::text
    AND table_name = $2::text
ORDER BY ordinal_position";

/// Data types text can be read from and the label written into.
const TEXT_TYPES: &[&str] = &["text", "character varying", "character"];

/// A column as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// SQL-standard type name, e.g. `character varying` or `USER-DEFINED`.
    pub data_type: String,
    /// Schema of the column's type (or of its domain).
    pub type_schema: String,
    /// `pg_type` name of the column's type (or of its domain).
    pub type_name: String,
}

impl ColumnInfo {
    fn is_text(&self) -> bool {
        TEXT_TYPES.contains(&self.data_type.as_str())
    }
}

/// Find the table `table` names on this connection, returning it with its
/// schema filled in.
pub async fn resolve(
    tx: &Transaction<'_>,
    table: &QualifiedTable,
) -> crate::Result<QualifiedTable> {
    let regclass = table.regclass_text();

    let row = tx
        .traced()
        .query_opt(RESOLVE_SQL, &[&regclass])
        .await
        .map_err(QueryError::postgres("resolving the table name"))?;

    let Some(row) = row else {
        return Err(SchemaError::TableNotFound {
            table: table.to_string(),
        }
        .into());
    };

    let schema: String = row.try_get(0).map_err(|source| QueryError::ColumnRead {
        column: "nspname".into(),
        expected: "text",
        source,
    })?;
    Ok(QualifiedTable::in_schema(schema, table.name.clone()))
}

/// Names of the primary-key columns of a resolved table, in key ordinal
/// order. Empty if the table has no primary key.
pub async fn primary_key_columns(
    tx: &Transaction<'_>,
    resolved: &QualifiedTable,
) -> crate::Result<Vec<ColumnName>> {
    let schema = resolved.schema_str();
    let name = resolved.name.as_str();

    let rows = tx
        .traced()
        .query(PRIMARY_KEY_SQL, &[&schema, &name])
        .await
        .map_err(QueryError::postgres("querying primary key columns"))?;

    let columns = rows
        .iter()
        .map(|row| {
            row.try_get::<_, String>(0)
                .map(ColumnName::from)
                .map_err(|source| QueryError::ColumnRead {
                    column: "column_name".into(),
                    expected: "text",
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// List the columns of a resolved table, in ordinal order.
pub async fn columns(
    tx: &Transaction<'_>,
    resolved: &QualifiedTable,
) -> crate::Result<Vec<ColumnInfo>> {
    let schema = resolved.schema_str();
    let name = resolved.name.as_str();

    let rows = tx
        .traced()
        .query(COLUMNS_SQL, &[&schema, &name])
        .await
        .map_err(QueryError::postgres("listing table columns"))?;

    rows.iter()
        .map(|row| -> crate::Result<ColumnInfo> {
            let read = |idx: usize, column: &str| {
                row.try_get::<_, String>(idx)
                    .map_err(|source| QueryError::ColumnRead {
                        column: column.into(),
                        expected: "text",
                        source,
                    })
            };
            Ok(ColumnInfo {
                name: read(0, "column_name")?,
                data_type: read(1, "data_type")?,
                type_schema: read(2, "udt_schema")?,
                type_name: read(3, "udt_name")?,
            })
        })
        .collect()
}

/// Attach type information to the key column names.
///
/// Keys whose type has no native mapping are marked to travel as text.
pub fn key_columns(
    table: &QualifiedTable,
    names: Vec<ColumnName>,
    columns: &[ColumnInfo],
) -> Result<PrimaryKey, SchemaError> {
    let keys = names
        .into_iter()
        .map(|name| {
            let info = columns
                .iter()
                .find(|c| c.name == name.as_str())
                .ok_or_else(|| SchemaError::ColumnNotFound {
                    table: table.to_string(),
                    column: name.to_string(),
                })?;
            Ok(if is_native_key_type(&info.type_schema, &info.type_name) {
                KeyColumn::native(name)
            } else {
                let ty = TypeRef::new(
                    info.type_schema.as_str().into(),
                    info.type_name.as_str().into(),
                );
                KeyColumn::via_text(name, ty)
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    PrimaryKey::new(keys).ok_or_else(|| SchemaError::NoPrimaryKey {
        table: table.to_string(),
    })
}

/// Check the input and output columns against the table's actual columns.
pub fn verify_columns(
    target: &TargetSpec,
    pk: &PrimaryKey,
    columns: &[ColumnInfo],
) -> Result<(), SchemaError> {
    let table = target.table.to_string();
    let find = |name: &ColumnName| {
        columns
            .iter()
            .find(|c| c.name == name.as_str())
            .ok_or_else(|| SchemaError::ColumnNotFound {
                table: table.clone(),
                column: name.to_string(),
            })
    };

    let input = find(&target.input)?;
    let output = find(&target.output)?;

    if !input.is_text() {
        return Err(SchemaError::InputNotText {
            table,
            column: target.input.to_string(),
            data_type: input.data_type.clone(),
        });
    }

    if pk.contains(target.output.as_str()) {
        return Err(SchemaError::OutputIsKey {
            table,
            column: target.output.to_string(),
        });
    }

    if !output.is_text() {
        return Err(SchemaError::OutputNotText {
            table,
            column: target.output.to_string(),
            data_type: output.data_type.clone(),
        });
    }

    Ok(())
}

/// Run the whole inspection step: resolve the table, discover its key,
/// check the columns.
///
/// Issues only catalog reads, so a failure here leaves the table untouched.
pub async fn inspect(tx: &Transaction<'_>, target: &TargetSpec) -> crate::Result<PrimaryKey> {
    let resolved = resolve(tx, &target.table).await?;
    let key_names = primary_key_columns(tx, &resolved).await?;
    let columns = columns(tx, &resolved).await?;
    let pk = key_columns(&target.table, key_names, &columns)?;
    verify_columns(target, &pk, &columns)?;
    Ok(pk)
}
