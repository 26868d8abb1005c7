//! The per-row UPDATE.

use crate::classify::Sentiment;
use crate::error::UpdateError;
use crate::row::{RowRecord, SqlParam};
use crate::target::{PrimaryKey, TargetSpec};
use crate::traced::TransactionExt;
use crate::value::Value;
use sentiment_sql::{Expr, ParamName, TypeRef, UpdateStmt, render};
use tokio_postgres::Transaction;
use tokio_postgres::types::ToSql;

/// A rendered UPDATE for one row, with the values to bind.
///
/// `$1` is the label, `$2..` are the key values in key order.
#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub sql: String,
    pub label: Sentiment,
    pub key: Vec<Value>,
}

/// Build `UPDATE <table> SET <output> = $1 WHERE <k1> = $2 AND <k2> = $3 ...`.
///
/// Keys read as text are compared as `<k> = CAST(CAST($n AS text) AS <type>)`,
/// so the parameter is bound as text and converted by the server.
///
/// Fails if the record's key columns are not exactly `pk`, or if any key
/// value is NULL (`= NULL` never matches, so the row could not be addressed).
pub fn build_update(
    target: &TargetSpec,
    pk: &PrimaryKey,
    record: &RowRecord,
    label: Sentiment,
) -> Result<UpdateStatement, UpdateError> {
    let matches_pk = record.key.len() == pk.columns().len()
        && record
            .key
            .iter()
            .zip(pk.names())
            .all(|((col, _), expected)| col == expected);
    if !matches_pk {
        return Err(UpdateError::KeyMismatch {
            expected: pk.names().map(|c| c.to_string()).collect(),
            found: record.key.iter().map(|(c, _)| c.to_string()).collect(),
        });
    }

    if let Some((col, _)) = record.key.iter().find(|(_, value)| value.is_null()) {
        return Err(UpdateError::NullKey {
            column: col.to_string(),
        });
    }

    let predicate = Expr::all(pk.columns().iter().map(|key| {
        let param = Expr::param(ParamName::from(format!("key.{}", key.name)));
        let param = match &key.text_cast {
            Some(ty) => param.cast(TypeRef::text()).cast(ty.clone()),
            None => param,
        };
        Expr::column(key.name.clone()).eq(param)
    }));

    let mut stmt = UpdateStmt::new(target.table.table_ref())
        .set(target.output.clone(), Expr::param("label".into()));
    if let Some(predicate) = predicate {
        stmt = stmt.where_(predicate);
    }

    let rendered = render(&stmt);
    Ok(UpdateStatement {
        sql: rendered.sql,
        label,
        key: record.key.iter().map(|(_, value)| value.clone()).collect(),
    })
}

/// Execute a built statement, returning the number of rows affected.
pub async fn apply(tx: &Transaction<'_>, stmt: &UpdateStatement) -> Result<u64, UpdateError> {
    let label = stmt.label.as_str();
    let key_params: Vec<SqlParam<'_>> = stmt.key.iter().map(SqlParam).collect();

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(1 + key_params.len());
    params.push(&label);
    params.extend(key_params.iter().map(|p| p as &(dyn ToSql + Sync)));

    let affected = tx.traced().execute(&stmt.sql, &params).await?;
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{KeyColumn, QualifiedTable};

    fn reviews() -> TargetSpec {
        TargetSpec {
            table: QualifiedTable::new("reviews"),
            input: "review_text".into(),
            output: "sentiment".into(),
        }
    }

    fn record(key: Vec<(&str, Value)>) -> RowRecord {
        RowRecord {
            key: key.into_iter().map(|(c, v)| (c.into(), v)).collect(),
            input: Some("great service".into()),
        }
    }

    #[test]
    fn single_key_update() {
        let pk = PrimaryKey::new(vec![KeyColumn::native("id")]).unwrap();
        let stmt = build_update(
            &reviews(),
            &pk,
            &record(vec![("id", Value::I32(1))]),
            Sentiment::Positive,
        )
        .unwrap();

        insta::assert_snapshot!(stmt.sql, @r#"
        UPDATE "reviews"
        SET "sentiment" = $1
        WHERE "id" = $2
        "#);
        assert_eq!(stmt.label, Sentiment::Positive);
        assert_eq!(stmt.key, vec![Value::I32(1)]);
    }

    #[test]
    fn composite_key_binds_every_column() {
        let pk = PrimaryKey::new(vec![
            KeyColumn::native("tenant_id"),
            KeyColumn::native("review_no"),
        ])
        .unwrap();
        let stmt = build_update(
            &reviews(),
            &pk,
            &record(vec![
                ("tenant_id", Value::I64(3)),
                ("review_no", Value::String("x'; DROP TABLE reviews; --".into())),
            ]),
            Sentiment::Negative,
        )
        .unwrap();

        insta::assert_snapshot!(stmt.sql, @r#"
        UPDATE "reviews"
        SET "sentiment" = $1
        WHERE "tenant_id" = $2 AND "review_no" = $3
        "#);
        // the hostile value only ever travels as a bound parameter
        assert!(!stmt.sql.contains("DROP"));
        assert_eq!(stmt.key.len(), 2);
    }

    #[test]
    fn text_transported_key_is_cast_back() {
        let pk = PrimaryKey::new(vec![
            KeyColumn::native("tenant_id"),
            KeyColumn::via_text("tier", TypeRef::new("public".into(), "tier".into())),
        ])
        .unwrap();
        let stmt = build_update(
            &reviews(),
            &pk,
            &record(vec![
                ("tenant_id", Value::I32(3)),
                ("tier", Value::String("gold".into())),
            ]),
            Sentiment::Positive,
        )
        .unwrap();

        insta::assert_snapshot!(stmt.sql, @r#"
        UPDATE "reviews"
        SET "sentiment" = $1
        WHERE "tenant_id" = $2 AND "tier" = CAST(CAST($3 AS "pg_catalog"."text") AS "public"."tier")
        "#);
        assert_eq!(stmt.key, vec![Value::I32(3), Value::String("gold".into())]);
    }

    #[test]
    fn null_key_is_rejected() {
        let pk = PrimaryKey::new(vec![KeyColumn::native("id")]).unwrap();
        let err = build_update(
            &reviews(),
            &pk,
            &record(vec![("id", Value::Null)]),
            Sentiment::Neutral,
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::NullKey { ref column } if column == "id"));
    }

    #[test]
    fn key_columns_must_match_primary_key() {
        let pk = PrimaryKey::new(vec![
            KeyColumn::native("tenant_id"),
            KeyColumn::native("review_no"),
        ])
        .unwrap();
        let err = build_update(
            &reviews(),
            &pk,
            &record(vec![("tenant_id", Value::I64(3))]),
            Sentiment::Neutral,
        )
        .unwrap_err();
        insta::assert_snapshot!(
            err,
            @r#"row carries key columns ["tenant_id"], expected ["tenant_id", "review_no"]"#
        );
    }
}
