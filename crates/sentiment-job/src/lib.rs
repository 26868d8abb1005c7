//! Fill a table's sentiment column from its text column.
//!
//! One run:
//! - discovers the target table's primary key from `information_schema`,
//! - selects every row whose output column is NULL or empty,
//! - labels each row's input text as `positive`, `neutral` or `negative`,
//! - writes the label back with a parameterized, key-addressed UPDATE,
//! - commits the whole batch as one transaction.
//!
//! Rows that already carry a label are never selected, so running the job
//! again only picks up rows added since.
//!
//! ```ignore
//! let config = sentiment_job::config::load()?;
//! let report = sentiment_job::run(&config, &LexiconClassifier::default()).await?;
//! println!("Updated {} records", report.updated);
//! ```

pub mod classify;
pub mod config;
pub mod driver;
mod error;
pub mod introspect;
pub mod row;
pub mod select;
pub mod target;
pub mod traced;
pub mod update;
pub mod value;

pub use classify::{Classify, ClassifyError, LexiconClassifier, Sentiment};
pub use config::{ConfigError, DeploymentEnv, JobConfig};
pub use driver::{JobReport, Phase, RowErrorPolicy, run};
pub use error::{QueryError, RowFailure, RowFailureKind, SchemaError, UpdateError};
pub use target::{PrimaryKey, QualifiedTable, TargetSpec};
pub use value::Value;

/// Fatal errors that end a run.
pub use error::Error;

/// Result type for job operations.
pub type Result<T> = std::result::Result<T, Error>;
