//! Statement tracing.
//!
//! All of the job's statements run inside the batch transaction or one of its
//! savepoints, and all of them go through [`TracedTx`], so
//! `RUST_LOG=sentiment_job=debug` shows each statement with its parameter
//! count and how many rows it touched.

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row, Transaction};
use tracing::Instrument;

/// A transaction (or savepoint) whose statements are logged as `db.*` spans.
///
/// ```ignore
/// use sentiment_job::traced::TransactionExt;
///
/// let tx = client.transaction().await?;
/// let rows = tx.traced().query("SELECT 1", &[]).await?;
/// ```
pub struct TracedTx<'a, 'c> {
    tx: &'a Transaction<'c>,
}

impl<'a, 'c> TracedTx<'a, 'c> {
    pub fn new(tx: &'a Transaction<'c>) -> Self {
        Self { tx }
    }

    /// Run a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let affected = self
            .tx
            .execute(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self.tx.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Run a query expected to return at most one row.
    pub async fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let row = self.tx.query_opt(sql, params).instrument(span.clone()).await?;
        span.record("rows", usize::from(row.is_some()));
        Ok(row)
    }
}

/// Adds `.traced()` to transactions and savepoints.
pub trait TransactionExt<'c> {
    fn traced(&self) -> TracedTx<'_, 'c>;
}

impl<'c> TransactionExt<'c> for Transaction<'c> {
    fn traced(&self) -> TracedTx<'_, 'c> {
        TracedTx::new(self)
    }
}
