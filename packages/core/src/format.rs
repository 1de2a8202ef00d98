//! User-facing notification texts.
//!
//! Messages are shown to farmers and admins in the dairy app, which is in
//! Indonesian. Volumes are rendered the way the milk-production service
//! renders them elsewhere (`12.0`, `12.5`) so the UI stays consistent.

use chrono::{DateTime, NaiveDate, Utc};

/// Timestamp format used inside batch messages.
const BATCH_TIME_FORMAT: &str = "%H:%M:%S on %d/%m/%Y";

/// Render a volume with at least one decimal (`12.0`, `12.5`, `12.25`).
pub fn fmt_volume(volume: f64) -> String {
    if volume.is_finite() && volume.fract() == 0.0 {
        format!("{:.1}", volume)
    } else {
        format!("{}", volume)
    }
}

/// Render a threshold without trailing decimals when it is whole (`15`, `12.5`).
fn fmt_threshold(liters: f64) -> String {
    if liters.fract() == 0.0 {
        format!("{:.0}", liters)
    } else {
        format!("{}", liters)
    }
}

/// Round to a whole number and group thousands with commas (`1,234,567`).
pub fn group_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value);
    let (sign, digits) = match rounded.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rounded.as_str()),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}", sign, grouped)
}

/// Escape HTML metacharacters before a message is stored.
pub fn sanitize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for ch in message.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

pub fn admin_message(message: &str) -> String {
    format!("[ADMIN] {}", message)
}

pub fn critical_alert_message(message: &str) -> String {
    format!("🚨 CRITICAL ALERT: {}", message)
}

// ---- Production ----

pub fn low_production_message(cow_id: i64, cow_name: &str, volume: f64, threshold: f64) -> String {
    format!(
        "Produksi susu rendah! Sapi #{} ({}) hanya memproduksi {} liter hari ini (di bawah standar {}L)",
        cow_id,
        cow_name,
        fmt_volume(volume),
        fmt_threshold(threshold)
    )
}

pub fn high_production_message(cow_id: i64, cow_name: &str, volume: f64, threshold: f64) -> String {
    format!(
        "Produksi susu tinggi! Sapi #{} ({}) memproduksi {} liter hari ini (di atas standar {}L)",
        cow_id,
        cow_name,
        fmt_volume(volume),
        fmt_threshold(threshold)
    )
}

// ---- Milk batches ----

pub fn batch_expired_message(
    batch_number: &str,
    volume: f64,
    cow_name: &str,
    expiry: DateTime<Utc>,
) -> String {
    format!(
        "Batch {} dengan {} liter dari sapi {} telah kadaluarsa pada {}.",
        batch_number,
        fmt_volume(volume),
        cow_name,
        expiry.format(BATCH_TIME_FORMAT)
    )
}

pub fn batch_warning_message(
    batch_number: &str,
    volume: f64,
    cow_name: &str,
    expiry: DateTime<Utc>,
    now: DateTime<Utc>,
) -> String {
    let hours_remaining = (expiry - now).num_milliseconds() as f64 / 3_600_000.0;
    format!(
        "PERINGATAN: Batch {} dengan {} liter dari sapi {} akan kadaluarsa dalam {:.1} jam pada {}. Segera gunakan atau olah!",
        batch_number,
        fmt_volume(volume),
        cow_name,
        hours_remaining,
        expiry.format(BATCH_TIME_FORMAT)
    )
}

pub fn batch_used_message(
    batch_number: &str,
    volume: f64,
    cow_name: &str,
    used_at: DateTime<Utc>,
    produced_at: Option<DateTime<Utc>>,
) -> String {
    let age = produced_at
        .filter(|produced| *produced != used_at)
        .map(|produced| {
            let hours = (used_at - produced).num_seconds() / 3600;
            format!(" (digunakan setelah {} jam dari produksi)", hours)
        })
        .unwrap_or_default();

    format!(
        "✅ BATCH DIGUNAKAN: Batch {} dengan {} liter dari sapi {} telah digunakan pada {}{}.",
        batch_number,
        fmt_volume(volume),
        cow_name,
        used_at.format(BATCH_TIME_FORMAT),
        age
    )
}

/// Short notice sent when a batch is switched to `used` through the API.
pub fn batch_status_used_message(batch_number: &str, volume: f64, cow_name: Option<&str>) -> String {
    format!(
        "✅ Batch {} ({}L) dari sapi {} telah digunakan.",
        batch_number,
        fmt_volume(volume),
        cow_name.unwrap_or("Unknown")
    )
}

/// Substring identifying a batch inside stored messages.
///
/// The trailing space keeps `B-1` from matching messages about `B-10`.
pub fn batch_marker(batch_number: &str) -> String {
    format!("Batch {} ", batch_number)
}

// ---- Admin digests ----

/// One problematic cow in a digest.
#[derive(Debug, Clone, PartialEq)]
pub struct CowVolume {
    pub name: String,
    pub volume: f64,
}

/// Bulleted list of out-of-range cows, truncated per group.
pub fn cow_details_summary(
    low: &[CowVolume],
    high: &[CowVolume],
    low_limit: usize,
    high_limit: usize,
) -> String {
    let mut details: Vec<String> = Vec::new();

    if !low.is_empty() {
        details.push("Produksi Rendah:".to_string());
        push_cow_lines(&mut details, low, low_limit);
    }

    if !high.is_empty() {
        if !details.is_empty() {
            details.push(String::new());
        }
        details.push("Produksi Tinggi:".to_string());
        push_cow_lines(&mut details, high, high_limit);
    }

    if details.is_empty() {
        "Tidak ada detail tersedia".to_string()
    } else {
        details.join("\n")
    }
}

fn push_cow_lines(details: &mut Vec<String>, cows: &[CowVolume], limit: usize) {
    for cow in cows.iter().take(limit) {
        details.push(format!("  • {}: {:.1}L", cow.name, cow.volume));
    }
    if cows.len() > limit {
        details.push(format!("  • ... dan {} sapi lainnya", cows.len() - limit));
    }
}

#[derive(Debug, Clone)]
pub struct ProductionDigest<'a> {
    pub date: NaiveDate,
    pub total_cows: i64,
    pub total_production: f64,
    pub low: &'a [CowVolume],
    pub high: &'a [CowVolume],
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub low_limit: usize,
    pub high_limit: usize,
}

pub fn production_digest(digest: &ProductionDigest<'_>) -> String {
    let average = average_per_cow(digest.total_production, digest.total_cows);
    let lines = [
        format!("📊 RINGKASAN PRODUKSI HARIAN ({})", digest.date.format("%d/%m/%Y")),
        String::new(),
        format!("🐄 Total Sapi: {}", digest.total_cows),
        format!(
            "🥛 Produksi Hari Ini: {:.1}L (Rata-rata: {:.1}L/sapi)",
            digest.total_production, average
        ),
        String::new(),
        "⚠️ Perhatian Produksi:".to_string(),
        format!(
            "• {} sapi produksi rendah (<{}L)",
            digest.low.len(),
            fmt_threshold(digest.low_threshold)
        ),
        format!(
            "• {} sapi produksi tinggi (>{}L)",
            digest.high.len(),
            fmt_threshold(digest.high_threshold)
        ),
        String::new(),
        "Detail Sapi Bermasalah:".to_string(),
        cow_details_summary(digest.low, digest.high, digest.low_limit, digest.high_limit),
    ];
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct ExpiryDigest {
    pub at: DateTime<Utc>,
    pub fresh_batches: i64,
    pub expired_today: usize,
    pub expired_volume: f64,
    pub warning_batches: usize,
    pub warning_volume: f64,
    pub warning_hours: i64,
    pub price_per_liter: f64,
}

pub fn expiry_digest(digest: &ExpiryDigest) -> String {
    let loss = digest.expired_volume * digest.price_per_liter;
    let lines = [
        format!("🥛 RINGKASAN STATUS SUSU ({})", digest.at.format("%d/%m/%Y %H:%M")),
        String::new(),
        "📊 Status Batch:".to_string(),
        format!("• {} batch susu segar tersedia", digest.fresh_batches),
        format!(
            "• {} batch KADALUARSA hari ini ({:.1}L)",
            digest.expired_today, digest.expired_volume
        ),
        format!(
            "• {} batch AKAN KADALUARSA dalam {} jam ({:.1}L)",
            digest.warning_batches, digest.warning_hours, digest.warning_volume
        ),
        String::new(),
        format!("💰 Estimasi Kerugian: Rp {}", group_thousands(loss)),
        format!(
            "⚡ Tindakan Diperlukan: {} batch perlu segera diproses",
            digest.warning_batches
        ),
    ];
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct UsageDigest {
    pub at: DateTime<Utc>,
    pub batches_used: usize,
    pub used_today: usize,
    pub total_volume: f64,
}

pub fn usage_digest(digest: &UsageDigest) -> String {
    let average = if digest.batches_used > 0 {
        digest.total_volume / digest.batches_used as f64
    } else {
        0.0
    };
    let lines = [
        format!("📊 RINGKASAN PENGGUNAAN SUSU ({})", digest.at.format("%d/%m/%Y")),
        String::new(),
        "✅ BATCH DIGUNAKAN:".to_string(),
        format!(
            "• {} batch telah digunakan (24 jam terakhir)",
            digest.batches_used
        ),
        format!("• {} batch digunakan hari ini", digest.used_today),
        format!("• Total volume: {:.1}L", digest.total_volume),
        format!("• Rata-rata per batch: {:.1}L", average),
        String::new(),
        "📈 EFISIENSI:".to_string(),
        "• Tingkat pemanfaatan: Baik".to_string(),
        "• Minimalisasi waste: Optimal".to_string(),
        String::new(),
        "💡 INSIGHT:".to_string(),
        "• Manajemen batch inventory efektif".to_string(),
        "• Pola konsumsi teratur".to_string(),
    ];
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct DailyDigest {
    pub date: NaiveDate,
    pub total_cows: i64,
    pub total_production: f64,
    pub low_cows: usize,
    pub high_cows: usize,
    pub fresh_batches: i64,
    pub expired_today: i64,
    pub notifications_today: i64,
    pub low_threshold: f64,
    pub high_threshold: f64,
}

/// Daily notification volume at or above which system load is reported as high.
const BUSY_NOTIFICATION_VOLUME: i64 = 100;

/// Liters per cow used as the daily farm target.
const DAILY_TARGET_PER_COW: f64 = 20.0;

pub fn daily_digest(digest: &DailyDigest) -> String {
    let average = average_per_cow(digest.total_production, digest.total_cows);
    let system_status = if digest.notifications_today < BUSY_NOTIFICATION_VOLUME {
        "Baik"
    } else {
        "Tinggi"
    };
    let lines = [
        format!("📊 RINGKASAN HARIAN FARM ({})", digest.date.format("%d %B %Y")),
        String::new(),
        "🐄 PRODUKSI SUSU:".to_string(),
        format!("• Total Sapi: {}", digest.total_cows),
        format!("• Produksi Hari Ini: {:.1}L", digest.total_production),
        format!("• Rata-rata per Sapi: {:.1}L", average),
        format!(
            "• Target Harian: {:.1}L",
            digest.total_cows as f64 * DAILY_TARGET_PER_COW
        ),
        String::new(),
        "⚠️ MONITORING:".to_string(),
        format!(
            "• {} sapi produksi rendah (<{}L)",
            digest.low_cows,
            fmt_threshold(digest.low_threshold)
        ),
        format!(
            "• {} sapi produksi tinggi (>{}L)",
            digest.high_cows,
            fmt_threshold(digest.high_threshold)
        ),
        format!("• {} batch susu segar", digest.fresh_batches),
        format!("• {} batch kadaluarsa hari ini", digest.expired_today),
        String::new(),
        "📱 SISTEM:".to_string(),
        format!("• {} notifikasi dikirim hari ini", digest.notifications_today),
        format!("• Status sistem: {}", system_status),
        String::new(),
        "💡 REKOMENDASI:".to_string(),
        daily_recommendations(digest.low_cows, digest.high_cows, digest.expired_today),
    ];
    lines.join("\n")
}

pub fn daily_recommendations(low_cows: usize, high_cows: usize, expired_today: i64) -> String {
    let mut recommendations: Vec<&str> = Vec::new();

    if low_cows > 3 {
        recommendations.push("• Periksa kesehatan sapi dengan produksi rendah");
        recommendations.push("• Evaluasi pakan dan kondisi kandang");
    }
    if high_cows > 2 {
        recommendations.push("• Monitor sapi produksi tinggi untuk stress");
        recommendations.push("• Pastikan asupan nutrisi mencukupi");
    }
    if expired_today > 2 {
        recommendations.push("• Review proses handling susu");
        recommendations.push("• Pertimbangkan optimasi jadwal distribusi");
    }
    if recommendations.is_empty() {
        recommendations.push("• Pertahankan performa operasional yang baik");
        recommendations.push("• Lakukan maintenance rutin peralatan");
    }

    recommendations.join("\n")
}

fn average_per_cow(total: f64, cows: i64) -> f64 {
    if cows > 0 {
        total / cows as f64
    } else {
        0.0
    }
}

// ---- Product stock ----

fn fmt_stock_expiry(expiry: DateTime<Utc>) -> String {
    expiry.format("%Y-%m-%d %H:%M:%S%:z").to_string()
}

pub fn stock_warning_message(product_type: &str, hours: i64, expiry: DateTime<Utc>) -> String {
    format!(
        "Produk {} expires in less than {} hours on {}!",
        product_type,
        hours,
        fmt_stock_expiry(expiry)
    )
}

pub fn stock_expired_message(product_type: &str, expiry: DateTime<Utc>) -> String {
    format!(
        "Produk {} telah kadaluarsa pada {}!",
        product_type,
        fmt_stock_expiry(expiry)
    )
}
