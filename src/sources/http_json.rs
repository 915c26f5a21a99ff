//! HTTP JSON worker
//!
//! Fetches one or more JSON endpoints concurrently. A JSON object becomes one
//! entry, a JSON array contributes one entry per element. Individual endpoint
//! failures are logged and skipped; the fetch only fails when every endpoint
//! failed.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::Worker;
use crate::errors::{SourceError, SourceResult};
use crate::models::Record;

pub struct HttpJsonWorker {
    index: String,
    urls: Vec<String>,
    client: Client,
}

impl HttpJsonWorker {
    pub fn new<I: Into<String>>(index: I, urls: Vec<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("records/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            index: index.into(),
            urls,
            client,
        }
    }

    async fn fetch_one(&self, url: &str) -> SourceResult<Value> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout {
                    url: url.to_string(),
                }
            } else {
                SourceError::request(url, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                message: format!("unexpected status from {}", url),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::parse_error("json", format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl Worker for HttpJsonWorker {
    fn name(&self) -> &str {
        "http_json"
    }

    async fn fetch(&self) -> SourceResult<Record> {
        if self.urls.is_empty() {
            return Err(SourceError::NoEndpoints {
                index: self.index.clone(),
            });
        }

        let results = join_all(self.urls.iter().map(|url| self.fetch_one(url))).await;

        let mut record = Record::new(&self.index);
        let mut last_error = None;
        let mut succeeded = 0usize;

        for (url, result) in self.urls.iter().zip(results) {
            match result {
                Ok(Value::Array(items)) => {
                    succeeded += 1;
                    items.into_iter().for_each(|item| record.push_entry(item));
                }
                Ok(value) => {
                    succeeded += 1;
                    record.push_entry(value);
                }
                Err(e) => {
                    warn!("HTTP worker failed to fetch {}: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        debug!(
            "HTTP worker fetched {}/{} endpoints ({} entries)",
            succeeded,
            self.urls.len(),
            record.entries.len()
        );
        Ok(record)
    }
}
