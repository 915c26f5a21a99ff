//! ZincSearch bulk-v2 forwarder

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::trace;

use super::Forwarder;
use crate::errors::{ForwardError, ForwardResult};
use crate::models::Record;
use crate::utils::normalize_url_scheme;

/// Posts one `{"index", "records"}` document per record with basic auth.
pub struct ZincForwarder {
    client: Client,
    endpoint: String,
    username: String,
    password: Option<String>,
}

impl ZincForwarder {
    pub fn new(endpoint: &str, username: &str, password: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint: normalize_url_scheme(endpoint),
            username: username.to_string(),
            password,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Build the bulk document for `record`; the index is prefixed with the
/// month of `now` (`YYYYMM-<index>`).
pub fn bulk_document(record: &Record, now: DateTime<Utc>) -> Value {
    json!({
        "index": format!("{}-{}", now.format("%Y%m"), record.index),
        "records": record.entries,
    })
}

#[async_trait]
impl Forwarder for ZincForwarder {
    async fn forward(&self, record: &Record) -> ForwardResult<()> {
        let body = serde_json::to_vec(&bulk_document(record, Utc::now()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .basic_auth(&self.username, self.password.as_deref())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        trace!("Forwarded record for index '{}'", record.index);
        Ok(())
    }
}
