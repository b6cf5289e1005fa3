//! db-access - Main entry point.
//!
//! Runs SQL statements through a pooled connection and prints each result
//! as JSON, one line per statement.

use db_access::config::Config;
use db_access::{Database, DbResult, QueryResult};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout carries only results.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run_statements(db: &Database, config: &Config) -> DbResult<Vec<QueryResult>> {
    if config.transaction {
        let statements = &config.statements;
        db.transaction(async |tx| {
            let mut results = Vec::with_capacity(statements.len());
            for sql in statements {
                results.push(tx.execute(sql, &[]).await?);
            }
            Ok(results)
        })
        .await
    } else {
        let mut results = Vec::with_capacity(config.statements.len());
        for sql in &config.statements {
            results.push(db.execute(sql, &[]).await?);
        }
        Ok(results)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);

    info!(
        statements = config.statements.len(),
        transaction = config.transaction,
        "Starting db-access v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_config = config.database_config()?;
    let db = Database::connect(&db_config).await?;

    let result = run_statements(&db, &config).await;
    db.close().await;

    match result {
        Ok(results) => {
            for result in &results {
                println!("{}", serde_json::to_string(result)?);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Execution failed");
            Err(e.into())
        }
    }
}
