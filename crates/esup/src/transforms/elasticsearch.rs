//! 📡 Elasticsearch Bulk wire format: both directions 🚀🔄
//!
//! Going out: each [`Action`] becomes an action line plus (unless it is a delete) a source
//! line. The whole chunk is one NDJSON body with a trailing newline, because the bulk API
//! counts newlines the way a bouncer counts wristbands.
//!
//! ```text
//! {"index":{"_index":"crawl","_type":"document","_id":"x"}}
//! {"a":1,"timestamp_index":"2016-08-16T14:22:03.245Z"}
//! {"delete":{"_index":"crawl","_type":"document","_id":"gone"}}
//! ```
//!
//! Coming back: the response's `items` array, one entry per action, same order, each keyed by
//! the op name. We turn those into [`ItemResult`]s and refuse responses that lost count.
//!
//! ⚠️ `update` bodies go out as `{"doc": ...}`, the partial-document form, unless the record
//! already speaks update (a top-level `doc` or `script`), in which case it goes out as written
//! with the timestamp tucked inside its `doc`. 🦆

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::common::{Action, Chunk, ItemResult, OpType, TIMESTAMP_FIELD};
use crate::errors::UploadError;

/// 🏷️ Outcome label for failed items that came back without a `result`.
pub(crate) const UNLABELED_OUTCOME: &str = "error";

/// 📋 The metadata line for one action.
pub(crate) fn action_line(action: &Action) -> Value {
    let mut the_action_metadata = Map::new();
    the_action_metadata.insert("_index".to_string(), Value::String(action.index.clone()));
    if let Some(ref doc_type) = action.doc_type {
        the_action_metadata.insert("_type".to_string(), Value::String(doc_type.clone()));
    }
    the_action_metadata.insert("_id".to_string(), Value::String(action.id.clone()));

    let mut the_envelope = Map::new();
    the_envelope.insert(
        action.op_type.as_str().to_string(),
        Value::Object(the_action_metadata),
    );
    Value::Object(the_envelope)
}

/// 📦 Renders a chunk into a complete `_bulk` request body, trailing newline included.
pub(crate) fn render_chunk(chunk: &Chunk) -> Result<String> {
    let mut payload = String::with_capacity(chunk.len() * 256);
    for action in &chunk.actions {
        let the_action_serialized = serde_json::to_string(&action_line(action))
            .context("💀 The JSON that describes JSON has failed to become JSON.")?;
        payload.push_str(&the_action_serialized);
        payload.push('\n');

        if let Some(ref source) = action.payload {
            let source_line = match action.op_type {
                OpType::Update => serde_json::to_string(&update_body(source)),
                _ => serde_json::to_string(source),
            }
            .with_context(|| format!("💀 Failed to serialize the body of document '{}'", action.id))?;
            payload.push_str(&source_line);
            payload.push('\n');
        }
    }
    Ok(payload)
}

/// ✏️ The body line of an update.
///
/// A plain record becomes `{"doc": record}`. A record with a top-level `doc` or `script` is
/// already an update request and is not wrapped again. Its `timestamp_index` moves into `doc`
/// when there is one, and is dropped for a script-only update, since the update API rejects
/// unknown top-level keys.
pub(crate) fn update_body(source: &Map<String, Value>) -> Value {
    if !source.contains_key("doc") && !source.contains_key("script") {
        return json!({ "doc": source });
    }
    let mut body = source.clone();
    let stamp = body.remove(TIMESTAMP_FIELD);
    if let (Some(stamp), Some(Value::Object(doc))) = (stamp, body.get_mut("doc")) {
        doc.insert(TIMESTAMP_FIELD.to_string(), stamp);
    }
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

/// 📬 Parses a `_bulk` response body into one [`ItemResult`] per action of `chunk`.
///
/// # Errors
/// 💀 unparseable body, or [`UploadError::BulkResponseMismatch`] when the item count is off.
pub(crate) fn parse_bulk_response(chunk: &Chunk, body: &[u8]) -> Result<Vec<ItemResult>> {
    let response: BulkResponse = serde_json::from_slice(body).with_context(|| {
        format!(
            "💀 Elasticsearch answered chunk #{} with something that is not a bulk response",
            chunk.seq
        )
    })?;

    if response.items.len() != chunk.len() {
        return Err(UploadError::BulkResponseMismatch {
            sent: chunk.len(),
            received: response.items.len(),
        }
        .into());
    }

    let results: Vec<ItemResult> = chunk
        .actions
        .iter()
        .zip(response.items)
        .map(|(action, item)| item_result(action.op_type, item))
        .collect();

    if response.errors {
        tracing::debug!(
            "⚠️ chunk #{} came back with errors={}, {} of {} items failed",
            chunk.seq,
            response.errors,
            results.iter().filter(|r| !r.success).count(),
            results.len()
        );
    }
    Ok(results)
}

fn item_result(op_type: OpType, mut item: Map<String, Value>) -> ItemResult {
    // -- 🔑 the item is keyed by op name; anything else means the server improvised
    let detail = match item.remove(op_type.as_str()) {
        Some(detail) => detail,
        None => item.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null),
    };

    let status = detail
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(500);
    let outcome = detail
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or(UNLABELED_OUTCOME)
        .to_string();
    let id = detail.get("_id").and_then(Value::as_str).map(str::to_string);

    ItemResult {
        success: (200..300).contains(&status),
        outcome,
        id,
        status,
        detail,
    }
}
