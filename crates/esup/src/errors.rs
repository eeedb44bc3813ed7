//! 💀 The named failures of esup. Everything else is an `anyhow` with a sad context string.
//!
//! These are the ones callers (and tests) want to catch by name, so they get a `thiserror`
//! enum. They travel inside `anyhow::Error` like everything else and come back out via
//! `downcast_ref::<UploadError>()`. 🦆

use thiserror::Error;

/// 💀 Fatal conditions of an upload run.
///
/// None of these are retried. None of these are skipped. They stop the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    /// 📄 A line that is not JSON (or not a JSON object), and not the forgivable trailing line.
    #[error("💀 line {line} of the input is not a JSON object: {reason}")]
    InputParse {
        /// 1-based line number in the (decompressed) input
        line: u64,
        reason: String,
    },

    /// 🪪 A record with no usable `_id`.
    #[error("💀 record on line {line} has no usable `{field}` field. Every document needs a name.")]
    MissingIdentifier { line: u64, field: &'static str },

    /// 🧨 The cluster said no in a way this op type does not forgive.
    #[error("💀 `{op_type}` of id {id:?} failed with outcome `{outcome}`; server said: {detail}")]
    UnexpectedBulkFailure {
        op_type: String,
        id: Option<String>,
        outcome: String,
        /// the raw per-item response, for whoever is debugging this at 3am
        detail: serde_json::Value,
    },

    /// 📦 The `_bulk` response did not answer every action we asked about.
    #[error("💀 bulk response carried {received} items for a chunk of {sent} actions")]
    BulkResponseMismatch { sent: usize, received: usize },

    /// 🎛️ An op type nobody has heard of.
    #[error("💀 unknown op type `{0}`, expected one of index, create, delete, update")]
    UnknownOpType(String),
}
