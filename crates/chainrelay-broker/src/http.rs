//! HTTP producer backed by `reqwest`.
//!
//! Each publish is one `POST {base}/topics/{topic}/messages` with the
//! envelope body as JSON. The topic is percent-encoded as a single path
//! segment. The producer group travels in `X-Producer-Group`;
//! credentials, when configured, as HTTP basic auth. No retries: a non-2xx
//! status or transport error is returned to the forwarder as is.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;

use chainrelay_core::{BrokerClient, BrokerError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpBrokerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub group: String,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl HttpBrokerConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

pub struct HttpBroker {
    config: HttpBrokerConfig,
    base_url: String,
    http: RwLock<Option<reqwest::Client>>,
}

impl HttpBroker {
    pub fn new(config: HttpBrokerConfig) -> Self {
        let base_url = config.base_url();
        Self { config, base_url, http: RwLock::new(None) }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/topics/{topic}/messages` with the topic as one encoded segment.
    fn topic_url(&self, topic: &str) -> Result<reqwest::Url, BrokerError> {
        let invalid = |reason: String| BrokerError::Publish { topic: topic.into(), reason };
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["topics", topic, "messages"]);
        Ok(url)
    }
}

#[async_trait]
impl BrokerClient for HttpBroker {
    fn name(&self) -> &str {
        "http"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .build()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        *self.http.write() = Some(http);
        tracing::info!(url = %self.base_url, group = %self.config.group, "http broker producer started");
        Ok(())
    }

    async fn publish(&self, topic: &str, body: &[u8]) -> Result<(), BrokerError> {
        let http = self.http.read().clone().ok_or(BrokerError::NotStarted)?;

        let mut req = http
            .post(self.topic_url(topic)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_vec());
        if !self.config.group.is_empty() {
            req = req.header("X-Producer-Group", &self.config.group);
        }
        if !self.config.user_name.is_empty() {
            req = req.basic_auth(&self.config.user_name, Some(&self.config.password));
        }

        let resp = req.send().await.map_err(|e| BrokerError::Publish {
            topic: topic.into(),
            reason: e.to_string(),
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(BrokerError::Publish {
                topic: topic.into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        if self.http.write().take().is_some() {
            tracing::info!(url = %self.base_url, "http broker producer stopped");
        }
        Ok(())
    }
}
