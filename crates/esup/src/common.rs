//! 📦 Common data structures: the building blocks of esup.
//!
//! 🎬 A line leaves the file. It becomes a [`Record`]. The record gets a timestamp and loses
//! its `_id` to an [`Action`]. Actions ride to the cluster in a [`Chunk`]. The cluster answers
//! with one [`ItemResult`] per action. Nobody keeps the record. Nobody writes it a postcard.
//!
//! 🦆

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::UploadError;

/// 📄 One input line, parsed. Field name → value. Order is not promised, and not needed.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// 🪪 The field every record must carry. It becomes the document id.
pub const ID_FIELD: &str = "_id";

/// ⏰ The field stamped onto every record right before it becomes an action.
pub const TIMESTAMP_FIELD: &str = "timestamp_index";

/// ⚖️ What an op type ships and what failures it shrugs off.
///
/// Each [`OpType`] maps to exactly one of these. New op type? New const. One place.
#[derive(Debug, PartialEq, Eq)]
pub struct SuccessPolicy {
    /// 📦 whether the record body travels with the action
    pub carries_payload: bool,
    /// 🤷 outcome labels that are non-success but not an error
    pub tolerated_outcomes: &'static [&'static str],
}

const WRITE_POLICY: SuccessPolicy = SuccessPolicy {
    carries_payload: true,
    tolerated_outcomes: &[],
};

// -- 🗑️ deleting something that is already gone is a win with extra steps
const DELETE_POLICY: SuccessPolicy = SuccessPolicy {
    carries_payload: false,
    tolerated_outcomes: &["not_found"],
};

/// 🎛️ The four bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    #[default]
    Index,
    Create,
    Delete,
    Update,
}

impl OpType {
    pub const ALL: [OpType; 4] = [OpType::Index, OpType::Create, OpType::Delete, OpType::Update];

    /// 🏷️ The name the bulk API uses for this operation.
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Delete => "delete",
            OpType::Update => "update",
        }
    }

    pub fn policy(self) -> &'static SuccessPolicy {
        match self {
            OpType::Index | OpType::Create | OpType::Update => &WRITE_POLICY,
            OpType::Delete => &DELETE_POLICY,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpType::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UploadError::UnknownOpType(s.to_string()))
    }
}

/// 🎯 Where every action of a run goes, and what it does when it gets there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub index: String,
    /// 🏷️ `_type` label. `None` = leave it out of the action line (servers that outgrew types).
    pub doc_type: Option<String>,
    pub op_type: OpType,
}

/// 📨 One bulk operation, fully addressed. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub op_type: OpType,
    pub index: String,
    pub doc_type: Option<String>,
    pub id: String,
    /// 📦 the record minus its `_id`. `None` for delete, and only for delete.
    pub payload: Option<Record>,
}

/// 🚚 A bounded run of consecutive actions that ships as one `_bulk` request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 🔢 0-based position in the partitioned stream
    pub seq: u64,
    pub actions: Vec<Action>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 📬 What the cluster said about one action.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub success: bool,
    /// 🏷️ `created`, `updated`, `deleted`, `not_found`, ... or `error` when the server gave no label
    pub outcome: String,
    pub id: Option<String>,
    pub status: u16,
    /// 🧾 the raw item, kept for diagnostics
    pub detail: serde_json::Value,
}
