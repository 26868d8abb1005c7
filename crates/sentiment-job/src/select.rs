//! Selection of rows whose output column is still empty.

use crate::error::QueryError;
use crate::row::RowRecord;
use crate::target::{PrimaryKey, TargetSpec};
use crate::traced::TransactionExt;
use sentiment_sql::{Expr, OrderBy, RenderedSql, SelectStmt, TypeRef, render};
use tokio_postgres::Transaction;

/// Build the selection query:
/// key columns and the input column, for rows where the output is NULL or `''`,
/// ordered by key.
///
/// Keys without a native mapping are projected as text.
pub fn pending_rows_sql(target: &TargetSpec, pk: &PrimaryKey) -> RenderedSql {
    let keys = pk.columns().iter().map(|key| {
        let column = Expr::column(key.name.clone());
        match key.text_cast {
            Some(_) => column.cast(TypeRef::text()),
            None => column,
        }
    });

    let mut stmt = SelectStmt::new()
        .columns(keys)
        .column(Expr::column(target.input.clone()))
        .from(target.table.table_ref())
        .where_(
            Expr::column(target.output.clone())
                .coalesce(Expr::string(""))
                .eq(Expr::string("")),
        );

    for col in pk.names() {
        stmt = stmt.order_by(OrderBy::asc(Expr::column(col.clone())));
    }

    render(&stmt)
}

/// Fetch every row whose output column is empty, projected to key + input.
pub async fn select_pending(
    tx: &Transaction<'_>,
    target: &TargetSpec,
    pk: &PrimaryKey,
) -> crate::Result<Vec<RowRecord>> {
    let query = pending_rows_sql(target, pk);

    let rows = tx
        .traced()
        .query(&query.sql, &[])
        .await
        .map_err(QueryError::postgres("selecting rows with an empty output column"))?;

    let records = rows
        .iter()
        .map(|row| RowRecord::from_pg_row(row, pk))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}
