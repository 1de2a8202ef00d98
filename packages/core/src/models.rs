//! Records read and written by the notification sweeps.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Type tags of the notifications this crate writes.
///
/// Admin digests are stored as `admin_{kind}` and are not listed here;
/// see [`admin_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationType {
    LowProduction,
    HighProduction,
    MilkExpiry,
    MilkWarning,
    MilkUsed,
    StockExpiryWarn4h,
    StockExpiryWarn2h,
    StockExpired,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::LowProduction => "low_production",
            NotificationType::HighProduction => "high_production",
            NotificationType::MilkExpiry => "milk_expiry",
            NotificationType::MilkWarning => "milk_warning",
            NotificationType::MilkUsed => "milk_used",
            NotificationType::StockExpiryWarn4h => "EXPIRY_WARN_4H",
            NotificationType::StockExpiryWarn2h => "EXPIRY_WARN_2H",
            NotificationType::StockExpired => "PROD_EXPIRED",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored type tag of an admin digest of the given kind.
pub fn admin_type(kind: &str) -> String {
    format!("admin_{}", kind)
}

/// Priority attached to pushed admin notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Medium,
    High,
    Critical,
}

/// A persisted notification row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub cow_id: Option<i64>,
    pub product_stock_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub additional_data: Option<serde_json::Value>,
}

/// A notification about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: i64,
    pub cow_id: Option<i64>,
    pub product_stock_id: Option<i64>,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub additional_data: Option<serde_json::Value>,
}

impl NewNotification {
    pub fn for_cow(
        user_id: i64,
        cow_id: i64,
        kind: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            cow_id: Some(cow_id),
            product_stock_id: None,
            message: message.into(),
            kind: kind.into(),
            created_at,
            additional_data: None,
        }
    }

    pub fn for_product(
        user_id: i64,
        product_stock_id: i64,
        kind: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            cow_id: None,
            product_stock_id: Some(product_stock_id),
            message: message.into(),
            kind: kind.into(),
            created_at,
            additional_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cow {
    pub id: i64,
    pub name: String,
}

/// Per-cow aggregate for one day, joined with the cow's name.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyMilkSummary {
    pub id: i64,
    pub cow_id: i64,
    pub cow_name: String,
    pub date: NaiveDate,
    pub total_volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilkStatus {
    Fresh,
    Expired,
    Used,
}

impl MilkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilkStatus::Fresh => "fresh",
            MilkStatus::Expired => "expired",
            MilkStatus::Used => "used",
        }
    }
}

impl FromStr for MilkStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "fresh" => Ok(MilkStatus::Fresh),
            "expired" => Ok(MilkStatus::Expired),
            "used" => Ok(MilkStatus::Used),
            other => Err(format!("Unknown milk status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MilkBatch {
    pub id: i64,
    pub batch_number: String,
    pub total_volume: f64,
    pub status: MilkStatus,
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockStatus {
    Available,
    Expired,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Available => "available",
            StockStatus::Expired => "expired",
        }
    }
}

impl FromStr for StockStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "available" => Ok(StockStatus::Available),
            "expired" => Ok(StockStatus::Expired),
            other => Err(format!("Unknown stock status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductStock {
    pub id: i64,
    pub product_type: String,
    pub quantity: i64,
    pub expiry_at: DateTime<Utc>,
    pub status: StockStatus,
}

/// Notification counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationStats {
    pub total_today: i64,
    pub unread_count: i64,
    pub by_type: std::collections::BTreeMap<String, i64>,
}
