//! Prometheus metrics registry for the notification sweeps.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the notification services.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`) when `METRICS_ADDR` is set.

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

pub struct AppMetrics {
    /// Sweep runs, labelled by sweep name.
    pub sweeps_total: CounterVec,
    /// Sweeps that rolled back, labelled by sweep name.
    pub sweep_failures_total: CounterVec,
    pub sweep_duration: HistogramVec,
    /// Notifications committed, labelled by stored type.
    pub notifications_written_total: CounterVec,
    /// Pushes that failed after every retry.
    pub push_failures_total: Counter,
    /// Notifications skipped because the recipient hit the rate limit.
    pub rate_limited_total: Counter,
    pub notifications_cleaned_total: Counter,
    pub registry: Registry,
}

impl AppMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sweeps_total = CounterVec::new(
            Opts::new("dairy_notifier_sweeps_total", "Notification sweep runs"),
            &["sweep"],
        )?;

        let sweep_failures_total = CounterVec::new(
            Opts::new(
                "dairy_notifier_sweep_failures_total",
                "Notification sweeps rolled back after an error",
            ),
            &["sweep"],
        )?;

        let sweep_duration = HistogramVec::new(
            HistogramOpts::new(
                "dairy_notifier_sweep_duration_seconds",
                "Notification sweep duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["sweep"],
        )?;

        let notifications_written_total = CounterVec::new(
            Opts::new(
                "dairy_notifier_notifications_written_total",
                "Notifications committed, by type",
            ),
            &["type"],
        )?;

        let push_failures_total = Counter::with_opts(Opts::new(
            "dairy_notifier_push_failures_total",
            "Real-time pushes that failed after all retries",
        ))?;

        let rate_limited_total = Counter::with_opts(Opts::new(
            "dairy_notifier_rate_limited_total",
            "Notifications skipped by the per-user rate limit",
        ))?;

        let notifications_cleaned_total = Counter::with_opts(Opts::new(
            "dairy_notifier_notifications_cleaned_total",
            "Old notifications deleted by cleanup",
        ))?;

        registry.register(Box::new(sweeps_total.clone()))?;
        registry.register(Box::new(sweep_failures_total.clone()))?;
        registry.register(Box::new(sweep_duration.clone()))?;
        registry.register(Box::new(notifications_written_total.clone()))?;
        registry.register(Box::new(push_failures_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(notifications_cleaned_total.clone()))?;

        Ok(Self {
            sweeps_total,
            sweep_failures_total,
            sweep_duration,
            notifications_written_total,
            push_failures_total,
            rate_limited_total,
            notifications_cleaned_total,
            registry,
        })
    }

    /// Record one finished sweep.
    pub fn observe_sweep(&self, sweep: &str, seconds: f64, failed: bool) {
        self.sweeps_total.with_label_values(&[sweep]).inc();
        self.sweep_duration.with_label_values(&[sweep]).observe(seconds);
        if failed {
            self.sweep_failures_total.with_label_values(&[sweep]).inc();
        }
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
