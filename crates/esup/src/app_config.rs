//! 🔧 App Configuration: the sacred TOML-to-struct pipeline, now with CLI flags on top.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Layers, lowest precedence first:
//!
//! ```text
//!   serde defaults ─▶ ESUP_* env vars ─▶ --config file.toml ─▶ command-line flags
//! ```
//!
//! Nested keys in env vars are split on `__`, so `ESUP_ELASTICSEARCH__PASSWORD=hunter2` lands
//! in `elasticsearch.password`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backends::ElasticsearchConfig;
use crate::common::{OpType, Target};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub input: InputConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 📄 Where the records come from.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InputConfig {
    /// 📂 JSON-lines file, gzipped when it ends in `.gz`
    pub path: PathBuf,
    /// 🩹 forgive an unparseable last line (the file was being written when we copied it)
    #[serde(default)]
    pub broken: bool,
    /// ✂️ stop after this many records. `0` is an empty run, not "unlimited".
    #[serde(default)]
    pub limit: Option<usize>,
}

/// 🎯 Where the records go and what happens to them there.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TargetConfig {
    pub index: String,
    /// 🏷️ `_type` for every action. Empty string leaves `_type` out entirely.
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
    #[serde(default)]
    pub op_type: OpType,
}

fn default_doc_type() -> String {
    "document".to_string()
}

impl TargetConfig {
    pub fn to_target(&self) -> Target {
        let doc_type = self.doc_type.trim();
        Target {
            index: self.index.clone(),
            doc_type: (!doc_type.is_empty()).then(|| doc_type.to_string()),
            op_type: self.op_type,
        }
    }
}

/// 🧵 Knobs for the pipeline itself.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 🚚 actions per `_bulk` request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 🧵 max `_bulk` requests in flight
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// 📊 seconds between progress lines
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// 🎭 read, build and "send" everything, but to an in-memory writer that says yes
    #[serde(default)]
    pub dry_run: bool,
}

fn default_chunk_size() -> usize {
    50
}

fn default_threads() -> usize {
    8
}

fn default_report_interval_secs() -> u64 {
    10
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            threads: default_threads(),
            report_interval_secs: default_report_interval_secs(),
            dry_run: false,
        }
    }
}

/// 🎛️ The top layer: whatever the command line said. `None` means "not said", so the layers
/// below get their way.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigOverrides {
    pub input: InputOverrides,
    pub target: TargetOverrides,
    pub elasticsearch: ElasticsearchOverrides,
    pub runtime: RuntimeOverrides,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct InputOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TargetOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_type: Option<OpType>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ElasticsearchOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<bool>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl AppConfig {
    /// 🔒 The checks serde can't express. Zero-sized chunks, zero threads, nowhere to send.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.runtime.chunk_size >= 1,
            "💀 runtime.chunk_size must be at least 1. A chunk of nothing is a very expensive no-op."
        );
        ensure!(
            self.runtime.threads >= 1,
            "💀 runtime.threads must be at least 1. Somebody has to do the work."
        );
        ensure!(
            !self.elasticsearch.hosts.is_empty(),
            "💀 elasticsearch.hosts is empty. Documents need somewhere to go."
        );
        ensure!(
            !self.target.index.trim().is_empty(),
            "💀 target.index is empty. Which index? The void is not an index."
        );
        Ok(())
    }
}

/// 🚀 Load the config: env vars, then the optional TOML file, then `overrides` on top.
///
/// 📐 `config_file_name` of `None` means no file, not "look for a default one".
///
/// 💀 Errors when a layer is unparseable, a required key (`input.path`, `target.index`) is
/// missing from every layer, or the result fails [`AppConfig::validate`].
pub fn load_config(config_file_name: Option<&Path>, overrides: &ConfigOverrides) -> Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {}",
        config_file_name
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(no file, env and flags only)".to_string())
    );

    let config = Figment::new().merge(Env::prefixed("ESUP_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };
    let config = config.merge(Serialized::defaults(overrides));

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (ESUP_*) \
             and flags. The file exists in our hearts, but apparently not in a form we can read.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (ESUP_*) and flags. \
                 No file was provided. Did you forget the input path or the index?"
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 The configuration parsed, but it does not make sense")?;
    Ok(app_config)
}
