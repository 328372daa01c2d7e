use banking_core::config::Settings;
use banking_core::observability::{init_logging, init_metrics, LogConfig, LogFormat};
use banking_core::services::{InvariantService, ProvisioningService, ReconciliationService};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration first (needed for log level)
    let settings = Settings::new()?;

    let log_config = LogConfig {
        level: settings.application.log_level.clone(),
        format: LogFormat::from(
            std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .as_str(),
        ),
        include_target: true,
        include_file: false,
        include_line: false,
    };
    init_logging(&log_config);

    let _metrics_handle = init_metrics();
    info!("Configuration loaded, metrics initialized");

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // System reserve must exist before any operation can run.
    ProvisioningService::ensure_system_reserve(&pool, &settings.admin).await?;
    info!("System reserve verified");

    // The cached balance column is rebuilt from the ledger at startup so it
    // never carries stale values into the first reconciliation window.
    let reconciliation = ReconciliationService::new(pool.clone());
    let rebuilt = reconciliation.rebuild_cached_balances().await?;
    info!(accounts = rebuilt, "cached balances rebuilt from ledger");

    let invariants = InvariantService::new(pool.clone());

    info!(
        interval_secs = settings.reconciliation.interval_secs,
        repair = settings.reconciliation.repair,
        "starting reconciliation loop"
    );
    let mut ticker = tokio::time::interval(settings.reconciliation.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        match reconciliation
            .reconcile_all(settings.reconciliation.repair)
            .await
        {
            Ok(drifted) if drifted.is_empty() => {
                info!("reconciliation pass clean");
            }
            Ok(drifted) => {
                warn!(count = drifted.len(), "reconciliation found drifted balances");
            }
            Err(e) => warn!(error = %e, "reconciliation pass failed"),
        }

        match invariants.verify().await {
            Ok(report) if report.is_clean() => {}
            Ok(report) => {
                warn!(
                    violations = report.total_violations(),
                    "invariant sweep found violations"
                );
            }
            Err(e) => warn!(error = %e, "invariant sweep failed"),
        }
    }
}
