use sentiment_job::driver::error_chain;
use sentiment_job::{LexiconClassifier, config};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sentiment_job=info")),
        )
        .init();

    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            return ExitCode::from(1);
        }
    };

    let classifier = LexiconClassifier::default();

    match sentiment_job::run(&config, &classifier).await {
        Ok(report) => {
            if report.committed {
                println!("Updated {} records", report.updated);
            } else {
                println!(
                    "Dry run: would have updated {} records, nothing was written",
                    report.updated
                );
            }
            for failure in &report.failures {
                eprintln!("Skipped {}", error_chain(failure));
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            eprintln!("Error: {}", error_chain(&e));
            ExitCode::from(1)
        }
    }
}
