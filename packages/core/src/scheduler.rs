//! Sweep scheduler.
//!
//! Every sweep has its own interval. Sweeps run one at a time on a single
//! task, so a slow sweep delays the next tick rather than overlapping it.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::config::SweepIntervals;
use crate::notifier::NotificationService;
use crate::stock::StockExpiryService;

/// Which sweep a tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    Production,
    Expiry,
    Usage,
    Stock,
    Cleanup,
    DailySummary,
}

impl Sweep {
    pub fn name(&self) -> &'static str {
        match self {
            Sweep::Production => "production",
            Sweep::Expiry => "expiry",
            Sweep::Usage => "usage",
            Sweep::Stock => "stock",
            Sweep::Cleanup => "cleanup",
            Sweep::DailySummary => "daily_summary",
        }
    }
}

/// Run every sweep on its interval until `Ctrl+C` (SIGINT) is received.
///
/// A failing sweep is logged by the sweep itself and never stops the loop.
pub async fn run_scheduler(
    notifier: &mut NotificationService,
    stock: &StockExpiryService,
    intervals: &SweepIntervals,
) {
    run_until(notifier, stock, intervals, signal::ctrl_c()).await;
}

/// Scheduler loop that stops once `shutdown` completes.
///
/// `shutdown` is polled by reference across iterations, so a signal that
/// arrives while a sweep is running stops the loop after that sweep.
async fn run_until<F: Future>(
    notifier: &mut NotificationService,
    stock: &StockExpiryService,
    intervals: &SweepIntervals,
    shutdown: F,
) {
    tokio::pin!(shutdown);

    let mut production = every(intervals.production_seconds);
    let mut expiry = every(intervals.expiry_seconds);
    let mut usage = every(intervals.usage_seconds);
    let mut stock_check = every(intervals.stock_seconds);
    let mut cleanup = every(intervals.cleanup_seconds);
    let mut daily = every(intervals.daily_summary_seconds);

    tracing::info!(
        "Scheduler started (production {}s, expiry {}s, usage {}s, stock {}s, cleanup {}s, daily summary {}s)",
        intervals.production_seconds,
        intervals.expiry_seconds,
        intervals.usage_seconds,
        intervals.stock_seconds,
        intervals.cleanup_seconds,
        intervals.daily_summary_seconds,
    );

    loop {
        let sweep = tokio::select! {
            _ = production.tick() => Sweep::Production,
            _ = expiry.tick() => Sweep::Expiry,
            _ = usage.tick() => Sweep::Usage,
            _ = stock_check.tick() => Sweep::Stock,
            _ = cleanup.tick() => Sweep::Cleanup,
            _ = daily.tick() => Sweep::DailySummary,
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping scheduler.");
                break;
            }
        };

        run_sweep(sweep, notifier, stock).await;
    }

    tracing::info!("Scheduler stopped cleanly");
}

/// Run one sweep now. Returns the number of notifications it produced
/// (rows deleted, for cleanup).
pub async fn run_sweep(
    sweep: Sweep,
    notifier: &mut NotificationService,
    stock: &StockExpiryService,
) -> u64 {
    let now = Utc::now();
    tracing::debug!("Running {} sweep", sweep.name());

    match sweep {
        Sweep::Production => notifier.check_milk_production_and_notify(now).await as u64,
        Sweep::Expiry => notifier.check_milk_expiry_and_notify(now).await as u64,
        Sweep::Usage => notifier.check_milk_usage_and_notify(now).await as u64,
        Sweep::Stock => stock.check_product_expiration(now).await as u64,
        Sweep::Cleanup => notifier.cleanup_old_notifications(now).await,
        Sweep::DailySummary => notifier.create_daily_admin_summary(now).await as u64,
    }
}

fn every(seconds: u64) -> Interval {
    let mut interval = time::interval(Duration::from_secs(seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
