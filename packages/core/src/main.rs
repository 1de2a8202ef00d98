use std::env;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;

use dairy_notifier::api;
use dairy_notifier::cli::{Cli, Command, SweepKind};
use dairy_notifier::config::{Config, NotificationConfig};
use dairy_notifier::db::create_pool;
use dairy_notifier::error::AppError;
use dairy_notifier::logging::init_logging;
use dairy_notifier::metrics::AppMetrics;
use dairy_notifier::notifier::NotificationService;
use dairy_notifier::realtime::{HttpEmitter, LogEmitter, SharedEmitter};
use dairy_notifier::repository::FarmRepository;
use dairy_notifier::scheduler::{run_scheduler, run_sweep, Sweep};
use dairy_notifier::stock::StockExpiryService;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = if cli.database_url.is_none() && cli.realtime_url.is_none() {
        Config::from_env()
    } else {
        Config::from_vars(|key| match key {
            "DATABASE_URL" if cli.database_url.is_some() => cli.database_url.clone(),
            "REALTIME_URL" if cli.realtime_url.is_some() => cli.realtime_url.clone(),
            _ => env::var(key).ok(),
        })
    }
    .map_err(AppError::Config)?;

    tracing::info!("Service started with config: {:?}", config);

    let pool = create_pool(&config.database_url).await?;
    let repo = FarmRepository::new(pool);
    let settings = NotificationConfig::default();

    let emitter: SharedEmitter = match &config.realtime_url {
        Some(url) => Arc::new(
            HttpEmitter::new(url.as_str(), settings.push.timeout)
                .map_err(|err| AppError::Network(err.to_string()))?,
        ),
        None => {
            tracing::warn!("REALTIME_URL not set; notifications will be stored but not pushed");
            Arc::new(LogEmitter)
        }
    };

    let metrics = Arc::new(AppMetrics::new()?);
    if let Some(addr) = config.metrics_addr {
        let metrics = metrics.clone();
        let repo = repo.clone();
        tokio::spawn(async move {
            if let Err(err) = api::serve(addr, metrics, repo).await {
                tracing::error!("Ops endpoint stopped: {}", err);
            }
        });
    }

    let mut notifier = NotificationService::new(repo.clone(), emitter.clone(), settings.clone())
        .with_metrics(metrics.clone());
    let stock = StockExpiryService::new(repo, emitter, settings, config.stock_notify_user_id)
        .with_metrics(metrics);

    let now = Utc::now();
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_scheduler(&mut notifier, &stock, &config.intervals).await,
        Command::Sweep { kind } => {
            let sweep = match kind {
                SweepKind::Production => Sweep::Production,
                SweepKind::Expiry => Sweep::Expiry,
                SweepKind::Usage => Sweep::Usage,
                SweepKind::Stock => Sweep::Stock,
            };
            let count = run_sweep(sweep, &mut notifier, &stock).await;
            println!("{}", count);
        }
        Command::Digest => {
            println!("{}", notifier.create_daily_admin_summary(now).await);
        }
        Command::Cleanup => {
            println!("{}", notifier.cleanup_old_notifications(now).await);
        }
        Command::Stats => {
            let stats = notifier.get_notification_stats(now).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::BatchStatus { batch_id, from, to } => {
            let count = notifier
                .notify_batch_status_change(batch_id, from, to, now)
                .await;
            println!("{}", count);
        }
        Command::Alert {
            alert_type,
            message,
            cow_id,
        } => {
            let count = notifier
                .create_critical_admin_alert(&message, &alert_type, cow_id, now)
                .await;
            println!("{}", count);
        }
    }

    Ok(())
}
