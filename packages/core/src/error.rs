use thiserror::Error;

/// Unified application error.
///
/// Sweeps never hand this to their caller; it travels up to the sweep
/// boundary where it is logged and the transaction is rolled back.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a single real-time push attempt.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Push gateway rejected notification with HTTP {status}")]
    Rejected { status: u16 },

    #[error("No subscriber is listening on the real-time channel")]
    ChannelClosed,

    #[error("Failed to encode notification payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EmitError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}
