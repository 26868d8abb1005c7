//! One batch run: connect, inspect, select, label, commit.
//!
//! Everything after connecting happens inside a single transaction. Each row's
//! UPDATE runs in its own savepoint, so under [`RowErrorPolicy::Skip`] a failed
//! row is rolled back alone while the rest of the batch still commits.

use crate::classify::{Classify, classify_input};
use crate::config::{JobConfig, describe_connection};
use crate::error::{Error, RowFailure, RowFailureKind};
use crate::introspect;
use crate::row::RowRecord;
use crate::select;
use crate::target::{PrimaryKey, TargetSpec};
use crate::traced::TransactionExt;
use crate::update::{self, build_update};
use std::fmt;
use std::str::FromStr;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, info, warn};

const ROW_SAVEPOINT: &str = "sentiment_row";
const RELEASE_ROW_SAVEPOINT: &str = "RELEASE SAVEPOINT sentiment_row";

/// Where a run is. Moves strictly forward; `Committed` and `RolledBack` both
/// lead to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connected,
    SchemaInspected,
    RowsSelected,
    Processing,
    Committed,
    RolledBack,
    Closed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Connected => "connected",
            Phase::SchemaInspected => "schema-inspected",
            Phase::RowsSelected => "rows-selected",
            Phase::Processing => "processing",
            Phase::Committed => "committed",
            Phase::RolledBack => "rolled-back",
            Phase::Closed => "closed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a single row cannot be labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowErrorPolicy {
    /// Roll back that row's savepoint, record it, keep going.
    #[default]
    Skip,
    /// Roll back the whole batch.
    Abort,
}

impl FromStr for RowErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(RowErrorPolicy::Skip),
            "abort" => Ok(RowErrorPolicy::Abort),
            other => Err(format!("unknown row error policy {other:?}, expected skip or abort")),
        }
    }
}

impl fmt::Display for RowErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowErrorPolicy::Skip => f.write_str("skip"),
            RowErrorPolicy::Abort => f.write_str("abort"),
        }
    }
}

/// Outcome of a run that reached the end of the batch.
#[derive(Debug, Default)]
pub struct JobReport {
    /// Rows whose output column was empty.
    pub selected: usize,
    /// Rows actually written. Only meaningful if `committed`.
    pub updated: u64,
    /// Rows skipped under [`RowErrorPolicy::Skip`].
    pub failures: Vec<RowFailure>,
    /// False for dry runs.
    pub committed: bool,
}

impl JobReport {
    /// 0 if every selected row was labeled, 2 if some were skipped.
    pub fn exit_code(&self) -> u8 {
        if self.failures.is_empty() { 0 } else { 2 }
    }
}

/// A connected client plus the task driving its socket.
pub struct Session {
    client: Client,
    connection: JoinHandle<()>,
}

impl Session {
    pub async fn connect(config: &tokio_postgres::Config) -> crate::Result<Self> {
        debug!(database = %describe_connection(config), "connecting");
        let (client, connection) = config.connect(NoTls).await.map_err(Error::Connection)?;

        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "database connection error");
            }
        });

        Ok(Self { client, connection })
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Drop the client and wait for the connection task to wind down.
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            warn!(error = %e, "connection task did not shut down cleanly");
        }
    }
}

/// Run one batch against the configured database.
pub async fn run<C: Classify + Sync>(
    config: &JobConfig,
    classifier: &C,
) -> crate::Result<JobReport> {
    info!(
        env = %config.env,
        database = %describe_connection(&config.connection),
        table = %config.target.table,
        input = %config.target.input,
        output = %config.target.output,
        on_row_error = %config.on_row_error,
        dry_run = config.dry_run,
        "starting sentiment job"
    );

    let mut session = Session::connect(&config.connection).await?;
    let result = process(session.client_mut(), config, classifier).await;
    session.close().await;
    debug!(phase = %Phase::Closed, "session closed");

    result
}

/// Run one batch on an already connected client.
///
/// Returns an error only for fatal conditions; the transaction has then been
/// rolled back and the table is unchanged.
pub async fn process<C: Classify + Sync>(
    client: &mut Client,
    config: &JobConfig,
    classifier: &C,
) -> crate::Result<JobReport> {
    let mut phase = Phase::Connected;
    debug!(%phase, "entering phase");

    let mut tx = client
        .transaction()
        .await
        .map_err(|source| Error::Transaction { phase, source })?;

    let mut report = match label_rows(&mut tx, config, classifier, &mut phase).await {
        Ok(report) => report,
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback after fatal error failed");
            }
            warn!(%phase, error = %e, "batch rolled back");
            return Err(e);
        }
    };

    if config.dry_run {
        tx.rollback()
            .await
            .map_err(|source| Error::Transaction { phase, source })?;
        advance(&mut phase, Phase::RolledBack);
        info!(
            selected = report.selected,
            would_update = report.updated,
            failed = report.failures.len(),
            "dry run, rolled back"
        );
    } else {
        tx.commit()
            .await
            .map_err(|source| Error::Transaction { phase, source })?;
        advance(&mut phase, Phase::Committed);
        report.committed = true;
        info!(
            selected = report.selected,
            updated = report.updated,
            failed = report.failures.len(),
            "batch committed"
        );
    }

    Ok(report)
}

async fn label_rows<C: Classify + Sync>(
    tx: &mut Transaction<'_>,
    config: &JobConfig,
    classifier: &C,
    phase: &mut Phase,
) -> crate::Result<JobReport> {
    let target = &config.target;

    let pk = introspect::inspect(&*tx, target).await?;
    advance(phase, Phase::SchemaInspected);
    info!(table = %target.table, primary_key = %pk, "schema inspected");

    let records = select::select_pending(&*tx, target, &pk).await?;
    advance(phase, Phase::RowsSelected);
    info!(rows = records.len(), "selected rows with an empty output column");

    advance(phase, Phase::Processing);
    let mut report = JobReport {
        selected: records.len(),
        ..JobReport::default()
    };

    for record in &records {
        match label_row(tx, target, &pk, record, classifier).await? {
            Ok(affected) => report.updated += affected,
            Err(failure) => match config.on_row_error {
                RowErrorPolicy::Skip => {
                    warn!(
                        key = %failure.key,
                        error = %error_chain(&failure),
                        "row skipped"
                    );
                    report.failures.push(failure);
                }
                RowErrorPolicy::Abort => return Err(Error::RowFailed(failure)),
            },
        }
    }

    Ok(report)
}

/// Label and update one row inside its own savepoint.
///
/// The outer `Result` is fatal (the savepoint itself could not be managed);
/// the inner one is this row's outcome. Either way the savepoint is gone
/// when this returns.
pub async fn label_row<C: Classify + Sync>(
    tx: &mut Transaction<'_>,
    target: &TargetSpec,
    pk: &PrimaryKey,
    record: &RowRecord,
    classifier: &C,
) -> crate::Result<Result<u64, RowFailure>> {
    let key = record.describe_key();
    let failure = |kind| RowFailure {
        key: key.clone(),
        kind,
    };

    let label = match classify_input(classifier, record.input.as_deref()).await {
        Ok(label) => label,
        Err(e) => return Ok(Err(failure(RowFailureKind::Classification(e)))),
    };

    let stmt = match build_update(target, pk, record, label) {
        Ok(stmt) => stmt,
        Err(e) => return Ok(Err(failure(RowFailureKind::Update(e)))),
    };

    let savepoint = tx
        .savepoint(ROW_SAVEPOINT)
        .await
        .map_err(|source| Error::Transaction {
            phase: Phase::Processing,
            source,
        })?;

    match update::apply(&savepoint, &stmt).await {
        Ok(affected) => {
            savepoint
                .commit()
                .await
                .map_err(|source| Error::Transaction {
                    phase: Phase::Processing,
                    source,
                })?;
            if affected != 1 {
                warn!(%key, affected, "update did not affect exactly one row");
            }
            debug!(%key, %label, "row labeled");
            Ok(Ok(affected))
        }
        Err(e) => {
            let savepoint_error = |source| Error::Transaction {
                phase: Phase::Processing,
                source,
            };
            // ROLLBACK TO keeps the savepoint on the stack
            savepoint.rollback().await.map_err(savepoint_error)?;
            tx.traced()
                .execute(RELEASE_ROW_SAVEPOINT, &[])
                .await
                .map_err(savepoint_error)?;
            Ok(Err(failure(RowFailureKind::Update(e))))
        }
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    debug!(from = %phase, to = %next, "entering phase");
    *phase = next;
}

/// `a: b: c` from an error and its sources.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifyError;
    use crate::error::UpdateError;

    #[test]
    fn policy_parsing() {
        assert_eq!("skip".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Skip);
        assert_eq!(" ABORT ".parse::<RowErrorPolicy>().unwrap(), RowErrorPolicy::Abort);
        assert!("retry".parse::<RowErrorPolicy>().is_err());
        assert_eq!(RowErrorPolicy::default(), RowErrorPolicy::Skip);
    }

    #[test]
    fn exit_code_reflects_failures() {
        let mut report = JobReport {
            selected: 2,
            updated: 2,
            committed: true,
            ..JobReport::default()
        };
        assert_eq!(report.exit_code(), 0);

        report.failures.push(RowFailure {
            key: "id=2".into(),
            kind: RowFailureKind::Classification(ClassifyError::Failed {
                message: "timeout".into(),
            }),
        });
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn error_chain_includes_sources() {
        let failure = RowFailure {
            key: "id=7".into(),
            kind: RowFailureKind::Update(UpdateError::NullKey {
                column: "id".into(),
            }),
        };
        insta::assert_snapshot!(
            error_chain(&failure),
            @"row id=7: update failed: key column id is NULL, the row cannot be addressed"
        );

        let err = Error::RowFailed(failure);
        insta::assert_snapshot!(
            error_chain(&err),
            @"batch aborted: row id=7: update failed: key column id is NULL, the row cannot be \
              addressed"
        );
    }

    #[tokio::test]
    async fn unreachable_database_is_a_connection_error() {
        let mut connection = tokio_postgres::Config::new();
        connection
            .host("127.0.0.1")
            .port(1)
            .user("sentiment")
            .dbname("reviews")
            .connect_timeout(std::time::Duration::from_secs(5));
        let config = JobConfig {
            env: crate::config::DeploymentEnv::Testing,
            connection,
            target: TargetSpec {
                table: "reviews".parse().unwrap(),
                input: "review_text".into(),
                output: "sentiment".into(),
            },
            on_row_error: RowErrorPolicy::Skip,
            dry_run: false,
        };

        let err = run(&config, &crate::classify::LexiconClassifier::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "{err:?}");
        insta::assert_snapshot!(err, @"could not connect to the database");
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::SchemaInspected.to_string(), "schema-inspected");
        assert_eq!(Phase::RolledBack.to_string(), "rolled-back");
    }
}
