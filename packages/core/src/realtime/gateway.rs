//! HTTP push gateway client.
//!
//! The socket server exposes `POST {base}/notifications/{user_id}` and
//! forwards the JSON body to every open connection of that user.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{NotificationPayload, RealtimeEmitter};
use crate::error::EmitError;

#[derive(Clone)]
pub struct HttpEmitter {
    base_url: String,
    http: Client,
}

impl HttpEmitter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EmitError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmitError::network(err.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RealtimeEmitter for HttpEmitter {
    async fn emit(&self, user_id: i64, payload: &NotificationPayload) -> Result<(), EmitError> {
        let url = format!("{}/notifications/{}", self.base_url, user_id);
        let body = serde_json::to_vec(payload)?;

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| EmitError::network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(EmitError::Rejected {
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
