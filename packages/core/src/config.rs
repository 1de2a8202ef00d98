use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Base URL of the real-time push gateway. `None` means pushes are only logged.
    pub realtime_url: Option<String>,
    pub intervals: SweepIntervals,
    /// User who receives product stock notifications in the selling service.
    pub stock_notify_user_id: i64,
    pub metrics_addr: Option<SocketAddr>,
}

/// How often each sweep runs, in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepIntervals {
    pub production_seconds: u64,
    pub expiry_seconds: u64,
    pub usage_seconds: u64,
    pub stock_seconds: u64,
    pub cleanup_seconds: u64,
    pub daily_summary_seconds: u64,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            production_seconds: 3600,
            expiry_seconds: 300,
            usage_seconds: 900,
            stock_seconds: 60,
            cleanup_seconds: 86_400,
            daily_summary_seconds: 86_400,
        }
    }
}

pub const DEFAULT_STOCK_NOTIFY_USER_ID: i64 = 2;

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL is required")?;

        let realtime_url = lookup("REALTIME_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let defaults = SweepIntervals::default();
        let intervals = SweepIntervals {
            production_seconds: parse_seconds(
                &lookup,
                "PRODUCTION_CHECK_INTERVAL_SECONDS",
                defaults.production_seconds,
            )?,
            expiry_seconds: parse_seconds(
                &lookup,
                "EXPIRY_CHECK_INTERVAL_SECONDS",
                defaults.expiry_seconds,
            )?,
            usage_seconds: parse_seconds(
                &lookup,
                "USAGE_CHECK_INTERVAL_SECONDS",
                defaults.usage_seconds,
            )?,
            stock_seconds: parse_seconds(
                &lookup,
                "STOCK_CHECK_INTERVAL_SECONDS",
                defaults.stock_seconds,
            )?,
            cleanup_seconds: parse_seconds(
                &lookup,
                "CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_seconds,
            )?,
            daily_summary_seconds: parse_seconds(
                &lookup,
                "DAILY_SUMMARY_INTERVAL_SECONDS",
                defaults.daily_summary_seconds,
            )?,
        };

        let stock_notify_user_id = match lookup("STOCK_NOTIFY_USER_ID") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| "STOCK_NOTIFY_USER_ID must be a valid integer")?,
            None => DEFAULT_STOCK_NOTIFY_USER_ID,
        };

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(raw) => Some(
                raw.parse::<SocketAddr>()
                    .map_err(|_| format!("Invalid METRICS_ADDR: {}", raw))?,
            ),
            None => None,
        };

        Ok(Self {
            database_url,
            realtime_url,
            intervals,
            stock_notify_user_id,
            metrics_addr,
        })
    }
}

fn parse_seconds<F>(lookup: &F, key: &str, default: u64) -> Result<u64, String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) => Err(format!("{} must be greater than zero", key)),
            Ok(value) => Ok(value),
            Err(_) => Err(format!("{} must be a valid number", key)),
        },
    }
}

/// Fixed thresholds and limits used by the sweeps.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Daily volume below this (liters) is low production.
    pub low_production_liters: f64,
    /// Daily volume above this (liters) is high production.
    pub high_production_liters: f64,
    pub rate_limit_per_user: u32,
    pub admin_rate_limit: u32,
    pub rate_limit_window: Duration,
    pub cleanup_days: i64,
    pub push: PushConfig,
    /// Horizon for "about to expire" milk batch warnings.
    pub expiry_warning: chrono::Duration,
    /// Look-back window for recently used batches.
    pub usage_lookback: chrono::Duration,
    pub stock_warning_far: chrono::Duration,
    pub stock_warning_near: chrono::Duration,
    /// Rupiah per liter used for the expired-milk loss estimate.
    pub milk_price_per_liter: f64,
    pub digest_low_detail_limit: usize,
    pub digest_high_detail_limit: usize,
}

/// Real-time push delivery settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Upper bound of the random jitter added to `retry_delay`.
    pub retry_jitter: Duration,
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            low_production_liters: 15.0,
            high_production_liters: 25.0,
            rate_limit_per_user: 50,
            admin_rate_limit: 100,
            rate_limit_window: Duration::from_secs(60 * 60),
            cleanup_days: 30,
            push: PushConfig::default(),
            expiry_warning: chrono::Duration::hours(4),
            usage_lookback: chrono::Duration::hours(24),
            stock_warning_far: chrono::Duration::hours(4),
            stock_warning_near: chrono::Duration::hours(2),
            milk_price_per_liter: 8000.0,
            digest_low_detail_limit: 5,
            digest_high_detail_limit: 3,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            retry_jitter: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}
