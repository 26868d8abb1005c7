use crate::classify::ClassifyError;
use crate::config::ConfigError;
use crate::driver::Phase;
use thiserror::Error;

/// Fatal errors. Any of these ends the run with the batch rolled back.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not connect to the database")]
    Connection(#[source] tokio_postgres::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("batch aborted")]
    RowFailed(#[source] RowFailure),

    #[error("postgres error in phase {phase}")]
    Transaction {
        phase: Phase,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// The target table or its columns do not match what the job needs.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table {table} does not exist")]
    TableNotFound { table: String },

    #[error("table {table} has no primary key")]
    NoPrimaryKey { table: String },

    #[error("column {column} does not exist on table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("input column {column} of {table} has type {data_type}, expected a text type")]
    InputNotText {
        table: String,
        column: String,
        data_type: String,
    },

    #[error("output column {column} is part of the primary key of {table}")]
    OutputIsKey { table: String, column: String },

    #[error("output column {column} of {table} has type {data_type}, expected a text type")]
    OutputNotText {
        table: String,
        column: String,
        data_type: String,
    },
}

/// A catalog or selection query failed, or its result could not be read.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{context}")]
    Postgres {
        context: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("column {column} has type {pg_type}, which cannot be used as a key value")]
    UnsupportedType { column: String, pg_type: String },

    #[error("could not read column {column} as {expected}")]
    ColumnRead {
        column: String,
        expected: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },
}

impl QueryError {
    pub(crate) fn postgres(context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Self {
        move |source| QueryError::Postgres { context, source }
    }
}

/// The per-row UPDATE could not be built or executed.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("key column {column} is NULL, the row cannot be addressed")]
    NullKey { column: String },

    #[error("row carries key columns {found:?}, expected {expected:?}")]
    KeyMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("update statement failed")]
    Postgres(#[from] tokio_postgres::Error),
}

/// One row that could not be labeled, identified by its key.
#[derive(Debug, Error)]
#[error("row {key}")]
pub struct RowFailure {
    /// Human-readable key, e.g. `id=1` or `tenant_id=3, review_no=7`.
    pub key: String,

    #[source]
    pub kind: RowFailureKind,
}

#[derive(Debug, Error)]
pub enum RowFailureKind {
    #[error("classification failed")]
    Classification(#[source] ClassifyError),

    #[error("update failed")]
    Update(#[source] UpdateError),
}
