//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! Eight requests in flight. Fifty documents each. The cluster is GREEN, for now.
//! Somewhere a shard is relocating and nobody told us.
//!
//! 🚀 This module POSTs rendered chunks to `/_bulk` and reads back what happened to every
//! document. It rotates across the configured hosts, authenticates with basic auth or an API
//! key, and says hello to the cluster once at startup so a typo in the URL fails in the first
//! second instead of the first chunk.
//!
//! 🔄 No retries here. A failed request is a failed run.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::backends::BulkWriter;
use crate::common::{Chunk, ItemResult};
use crate::transforms::elasticsearch::{parse_bulk_response, render_chunk};

// -- 🔌 the port everyone forgets to type
const DEFAULT_PORT: u16 = 9200;

/// 📡 How to reach the cluster.
///
/// 🔒 auth is tri-modal: username+password, api_key, or "I hope anonymous works".
/// API key wins when both are set.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ElasticsearchConfig {
    /// 📡 `host`, `host:port`, or a full URL. Bare hosts get `http://` and port 9200.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ per-request timeout. Bulk requests on a busy cluster can be slow, so this is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 👋 GET `/` at startup and log who answered.
    #[serde(default = "default_ping")]
    pub ping: bool,
}

fn default_hosts() -> Vec<String> {
    vec!["localhost".to_string()]
}

// -- ⏱️ ten minutes. The cluster has been through a lot.
fn default_timeout_secs() -> u64 {
    600
}

fn default_ping() -> bool {
    true
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            ping: default_ping(),
        }
    }
}

/// 🔧 `localhost` → `http://localhost:9200`, `es:9201` → `http://es:9201`,
/// `https://es.example.com/` → `https://es.example.com`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        return host.to_string();
    }
    let authority = host.split('/').next().unwrap_or(host);
    let has_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));
    if has_port {
        format!("http://{host}")
    } else {
        match host.split_once('/') {
            Some((authority, path)) => format!("http://{authority}:{DEFAULT_PORT}/{path}"),
            None => format!("http://{host}:{DEFAULT_PORT}"),
        }
    }
}

/// 📡 The `_bulk` client.
pub struct ElasticsearchWriter {
    client: reqwest::Client,
    base_urls: Vec<String>,
    next_host: AtomicUsize,
    config: ElasticsearchConfig,
}

// 🔒 hand-rolled so passwords and API keys stay out of debug logs
impl std::fmt::Debug for ElasticsearchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchWriter")
            .field("base_urls", &self.base_urls)
            .field("username", &self.config.username)
            .field("api_key", &self.config.api_key.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}

impl ElasticsearchWriter {
    /// 🚀 Builds the HTTP client and, unless told not to, pings the first host.
    pub async fn connect(config: ElasticsearchConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.hosts.is_empty(),
            "💀 No Elasticsearch hosts configured. We need at least one place to send things."
        );

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a TLS thing. It is usually a TLS thing.")?;

        let base_urls: Vec<String> = config.hosts.iter().map(|h| normalize_host(h)).collect();
        debug!("📡 Elasticsearch hosts: {:?}", base_urls);

        let writer = Self {
            client,
            base_urls,
            next_host: AtomicUsize::new(0),
            config,
        };
        if writer.config.ping {
            writer.ping().await?;
        }
        Ok(writer)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("ApiKey {api_key}"))
        } else if let Some(ref username) = self.config.username {
            request.basic_auth(username, self.config.password.as_ref())
        } else if let Some(ref password) = self.config.password {
            // -- 🤷 a password with no user. Odd, but some proxies want exactly that.
            request.basic_auth("", Some(password))
        } else {
            request
        }
    }

    // -- 🔄 round-robin; ordering across tasks does not matter, fairness roughly does
    fn pick_base_url(&self) -> &str {
        let i = self.next_host.fetch_add(1, Ordering::Relaxed) % self.base_urls.len();
        &self.base_urls[i]
    }

    /// 👋 "Hello? Is this thing on?" GET `/` and log the cluster's name and version.
    pub async fn ping(&self) -> Result<serde_json::Value> {
        let url = &self.base_urls[0];
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .with_context(|| format!("💀 Could not reach Elasticsearch at {url}. Is it running? Is it there?"))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("💀 Elasticsearch said hello but the sentence trailed off")?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 Elasticsearch at {} answered the hello with {}: {}",
                url,
                status,
                String::from_utf8_lossy(&body)
            );
        }

        let cluster_info: serde_json::Value =
            serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        info!(
            "👋 connected to cluster '{}' (version {}) at {}",
            cluster_info["cluster_name"].as_str().unwrap_or("?"),
            cluster_info["version"]["number"].as_str().unwrap_or("?"),
            url
        );
        Ok(cluster_info)
    }
}

#[async_trait]
impl BulkWriter for ElasticsearchWriter {
    /// 📡 POST one chunk to `/_bulk`, return one result per action.
    async fn write_chunk(&self, chunk: &Chunk) -> Result<Vec<ItemResult>> {
        let request_body = render_chunk(chunk)?;
        let bulk_url = format!("{}/_bulk", self.pick_base_url());
        trace!(
            "📡 chunk #{}: {} actions, {} bytes → {}",
            chunk.seq,
            chunk.len(),
            request_body.len(),
            bulk_url
        );

        let response = self
            .authorize(self.client.post(&bulk_url))
            // ⚠️ not application/json. The bulk API is particular about this.
            .header("Content-Type", "application/x-ndjson")
            .body(request_body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 The bulk request for chunk #{} never made it to {}. Check connectivity, check timeouts, check your feelings.",
                    chunk.seq, bulk_url
                )
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("💀 Lost the response body for chunk #{} mid-read", chunk.seq))?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 The bulk request for chunk #{} arrived, but Elasticsearch said '{}'. The body read: '{}'",
                chunk.seq,
                status,
                String::from_utf8_lossy(&body)
            );
        }

        parse_bulk_response(chunk, &body)
    }
}
