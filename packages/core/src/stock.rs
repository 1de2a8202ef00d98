//! Expiry sweep of the selling subsystem's product stock.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::config::NotificationConfig;
use crate::error::AppError;
use crate::format::{stock_expired_message, stock_warning_message};
use crate::metrics::AppMetrics;
use crate::models::{NewNotification, NotificationType, ProductStock};
use crate::notifier::{complete_sweep, insert_and_queue};
use crate::realtime::{Outbox, SharedEmitter};
use crate::repository::{notifications, stock, FarmRepository};

/// Stock history change type written when a product expires.
const EXPIRED_CHANGE_TYPE: &str = "expired";

pub struct StockExpiryService {
    repo: FarmRepository,
    emitter: SharedEmitter,
    config: NotificationConfig,
    /// Selling-service user who receives every stock notification.
    notify_user_id: i64,
    metrics: Option<Arc<AppMetrics>>,
}

impl StockExpiryService {
    pub fn new(
        repo: FarmRepository,
        emitter: SharedEmitter,
        config: NotificationConfig,
        notify_user_id: i64,
    ) -> Self {
        Self {
            repo,
            emitter,
            config,
            notify_user_id,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Warn about available stock close to expiry and expire overdue stock.
    ///
    /// Each product gets at most one notification of each type over its
    /// lifetime. Returns the number of notifications created.
    pub async fn check_product_expiration(&self, now: DateTime<Utc>) -> usize {
        let started = Instant::now();
        let result = self.run_check(now).await;
        complete_sweep(
            "stock_expiry_check",
            started,
            result,
            self.emitter.as_ref(),
            &self.config.push,
            self.metrics.as_deref(),
        )
        .await
    }

    async fn run_check(&self, now: DateTime<Utc>) -> Result<(usize, Outbox), AppError> {
        let mut tx = self.repo.begin().await?;
        let mut outbox = Outbox::new();

        let products = stock::available_stock(&mut tx).await?;
        tracing::info!("Found {} available products to check", products.len());

        let mut count = 0;
        for product in &products {
            if self.check_product(&mut tx, &mut outbox, product, now).await? {
                count += 1;
            }
        }

        tx.commit().await?;
        Ok((count, outbox))
    }

    /// Returns whether a notification was created for `product`.
    async fn check_product(
        &self,
        conn: &mut SqliteConnection,
        outbox: &mut Outbox,
        product: &ProductStock,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let time_to_expiry = product.expiry_at - now;
        let far = self.config.stock_warning_far;
        let near = self.config.stock_warning_near;

        let (kind, message) = if time_to_expiry <= far && time_to_expiry > near {
            (
                NotificationType::StockExpiryWarn4h,
                stock_warning_message(&product.product_type, far.num_hours(), product.expiry_at),
            )
        } else if time_to_expiry <= near && time_to_expiry > chrono::Duration::zero() {
            (
                NotificationType::StockExpiryWarn2h,
                stock_warning_message(&product.product_type, near.num_hours(), product.expiry_at),
            )
        } else if product.expiry_at <= now {
            stock::mark_stock_expired(conn, product.id).await?;
            stock::insert_stock_history(conn, product.id, EXPIRED_CHANGE_TYPE, product.quantity, now)
                .await?;
            tracing::info!("Marked product {} as expired", product.id);
            (
                NotificationType::StockExpired,
                stock_expired_message(&product.product_type, product.expiry_at),
            )
        } else {
            return Ok(false);
        };

        if notifications::exists_for_product(conn, product.id, kind.as_str()).await? {
            return Ok(false);
        }

        let new = NewNotification::for_product(
            self.notify_user_id,
            product.id,
            kind.as_str(),
            message,
            now,
        );
        insert_and_queue(conn, outbox, new, None).await?;
        tracing::info!("Sent {} notification for product {}", kind, product.id);
        Ok(true)
    }
}
