//! Relay configuration, loaded from YAML.
//!
//! ```yaml
//! server:
//!   port: 8080
//!   shutdown_timeout_secs: 10
//! mq:
//!   type: http            # http | log
//!   host: 127.0.0.1
//!   port: 9876
//!   userName: relay
//!   password: secret
//!   topic: relay-events
//!   group: relay-producers
//! fabric:
//!   fabric-main:
//!     configFilePath: ./profiles/fabric-main.yaml
//!     chainId: fabric-main-1
//! pool:
//!   idle_ttl_secs: 0      # 0 disables idle eviction
//!   sweep_interval_secs: 60
//! subscription:
//!   channel_capacity: 1024
//!   join_timeout_secs: 5
//! logging:
//!   level: info
//!   json: false
//! ```
//!
//! `CHAINRELAY_PORT` overrides `server.port`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use chainrelay_broker::{HttpBroker, HttpBrokerConfig, LogBroker};
use chainrelay_core::{BrokerHandle, ConnectionFlags};

use crate::observability::LogConfig;

pub const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub mq: MqConfig,
    #[serde(default)]
    pub fabric: BTreeMap<String, ChainConfig>,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port(), shutdown_timeout_secs: default_shutdown_timeout() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqKind {
    #[default]
    Http,
    Log,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqConfig {
    #[serde(rename = "type", default)]
    pub kind: MqKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    pub topic: String,
    #[serde(default)]
    pub group: String,
}

impl MqConfig {
    pub fn build_broker(&self) -> BrokerHandle {
        match self.kind {
            MqKind::Log => Arc::new(LogBroker::new()),
            MqKind::Http => Arc::new(HttpBroker::new(HttpBrokerConfig {
                host: self.host.clone(),
                port: self.port,
                user_name: self.user_name.clone(),
                password: self.password.clone(),
                group: self.group.clone(),
                request_timeout_ms: 10_000,
            })),
        }
    }
}

/// One named chain under `fabric:`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub config_file_path: PathBuf,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub gm_tls: bool,
    #[serde(default)]
    pub tx_timestamp: bool,
}

impl ChainConfig {
    pub fn flags(&self) -> ConnectionFlags {
        ConnectionFlags { gm_tls: self.gm_tls, tx_timestamp: self.tx_timestamp }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { idle_ttl_secs: 0, sweep_interval_secs: default_sweep_interval() }
    }
}

impl PoolConfig {
    /// `None` when idle eviction is disabled.
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
}

fn default_capacity() -> usize {
    1024
}

fn default_join_timeout() -> u64 {
    5
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { channel_capacity: default_capacity(), join_timeout_secs: default_join_timeout() }
    }
}

impl RelayConfig {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).context("parse relay config yaml")?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, apply env overrides, and resolve relative profile paths
    /// against the config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let mut config = Self::from_yaml(&contents)?;

        if let Ok(port) = std::env::var("CHAINRELAY_PORT") {
            config.server.port = port.parse().with_context(|| "parse CHAINRELAY_PORT")?;
        }

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for chain in config.fabric.values_mut() {
            if chain.config_file_path.is_relative() {
                chain.config_file_path = base.join(&chain.config_file_path);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mq.topic.is_empty() {
            bail!("mq.topic must be set");
        }
        if self.mq.kind == MqKind::Http && (self.mq.host.is_empty() || self.mq.port == 0) {
            bail!("mq.host and mq.port must be set for mq.type=http");
        }
        if self.subscription.channel_capacity == 0 {
            bail!("subscription.channel_capacity must be > 0");
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.subscription.join_timeout_secs)
    }
}
