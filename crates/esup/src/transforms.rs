//! 🔄 Transforms: turning records into bulk actions, and actions into chunks 🎭🚀
//!
//! 🎬 COLD OPEN — INT. LOADING DOCK — 2:47 AM
//!
//! A record arrives. It gets a timestamp. It hands over its `_id` at the desk. For every op
//! type except delete, the rest of it gets packed as the payload. Delete travels light: the
//! cluster only needs an address to forget something.
//!
//! ```text
//!   LineRecord ──build_action──▶ Action ──Chunker──▶ Chunk(seq, ≤ chunk_size actions)
//! ```
//!
//! ## Knowledge Graph 🧠
//! - Input: `records::RecordSource` items
//! - Output: `Chunk`s for `dispatch`
//! - Wire format lives next door in [`elasticsearch`]
//! - 🦆

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::common::{Action, Chunk, ID_FIELD, TIMESTAMP_FIELD, Target};
use crate::errors::UploadError;
use crate::records::LineRecord;

pub(crate) mod elasticsearch;

/// ⏰ UTC, millisecond precision, `Z` suffix. e.g. `2016-08-16T14:22:03.245Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// 🏗️ Stamps records and turns them into actions for one [`Target`].
#[derive(Debug, Clone)]
pub struct ActionBuilder {
    target: Target,
    clock: fn() -> DateTime<Utc>,
}

impl ActionBuilder {
    pub fn new(target: Target) -> Self {
        Self::with_clock(target, Utc::now)
    }

    /// 🧪 Same builder, with a clock you control.
    pub fn with_clock(target: Target, clock: fn() -> DateTime<Utc>) -> Self {
        Self { target, clock }
    }

    /// 🔄 One record in, one action out.
    ///
    /// # Errors
    /// 💀 [`UploadError::MissingIdentifier`] when `_id` is absent, null, or not a scalar id.
    pub fn build(&self, line_record: LineRecord) -> Result<Action> {
        let LineRecord { line, mut record } = line_record;
        record.insert(
            TIMESTAMP_FIELD.to_string(),
            serde_json::Value::String(format_timestamp((self.clock)())),
        );

        let id = match record.remove(ID_FIELD) {
            Some(serde_json::Value::String(id)) => id,
            // -- 🔢 numeric ids are ids too, they just don't know it yet
            Some(serde_json::Value::Number(id)) => id.to_string(),
            _ => {
                return Err(UploadError::MissingIdentifier {
                    line,
                    field: ID_FIELD,
                }
                .into());
            }
        };

        let op_type = self.target.op_type;
        let payload = op_type.policy().carries_payload.then_some(record);

        Ok(Action {
            op_type,
            index: self.target.index.clone(),
            doc_type: self.target.doc_type.clone(),
            id,
            payload,
        })
    }
}

/// 🚚 Packs a fallible stream of actions into numbered chunks of at most `chunk_size`.
///
/// The first error ends the stream. The half-packed chunk in hand at that moment is dropped,
/// so nothing after (or alongside) a bad record ever ships.
#[derive(Debug)]
pub struct Chunker<I> {
    actions: I,
    chunk_size: usize,
    next_seq: u64,
    done: bool,
}

impl<I> Chunker<I>
where
    I: Iterator<Item = Result<Action>>,
{
    pub fn new(actions: I, chunk_size: usize) -> Self {
        Self {
            actions,
            chunk_size: chunk_size.max(1),
            next_seq: 0,
            done: false,
        }
    }
}

impl<I> Iterator for Chunker<I>
where
    I: Iterator<Item = Result<Action>>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut actions = Vec::with_capacity(self.chunk_size);
        while actions.len() < self.chunk_size {
            match self.actions.next() {
                Some(Ok(action)) => actions.push(action),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if actions.is_empty() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Ok(Chunk { seq, actions }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{OpType, Record};
    use chrono::TimeZone;
    use serde_json::json;

    fn frozen_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 8, 16, 14, 22, 3).unwrap()
            + chrono::Duration::milliseconds(245)
    }

    fn target(op_type: OpType) -> Target {
        Target {
            index: "crawl".to_string(),
            doc_type: Some("document".to_string()),
            op_type,
        }
    }

    fn line(value: serde_json::Value) -> LineRecord {
        let serde_json::Value::Object(record) = value else {
            panic!("💀 test fixture must be an object");
        };
        LineRecord { line: 1, record }
    }

    #[test]
    fn the_one_where_the_timestamp_looks_like_every_other_timestamp() {
        assert_eq!(format_timestamp(frozen_clock()), "2016-08-16T14:22:03.245Z");
    }

    #[test]
    fn the_one_where_index_keeps_everything_but_the_id() -> Result<()> {
        let builder = ActionBuilder::with_clock(target(OpType::Index), frozen_clock);
        let action = builder.build(line(json!({"_id": "x", "a": 1, "b": 2})))?;

        assert_eq!(action.id, "x");
        assert_eq!(action.op_type, OpType::Index);
        assert_eq!(action.index, "crawl");
        assert_eq!(action.doc_type.as_deref(), Some("document"));
        let expected: Record = serde_json::from_value(json!({
            "a": 1,
            "b": 2,
            "timestamp_index": "2016-08-16T14:22:03.245Z"
        }))?;
        assert_eq!(action.payload, Some(expected));
        Ok(())
    }

    #[test]
    fn the_one_where_delete_travels_light() -> Result<()> {
        let builder = ActionBuilder::with_clock(target(OpType::Delete), frozen_clock);
        let action = builder.build(line(json!({"_id": "gone", "a": 1})))?;
        assert_eq!(action.id, "gone");
        assert!(action.payload.is_none());
        Ok(())
    }

    #[test]
    fn the_one_where_create_and_update_carry_payloads_too() -> Result<()> {
        for op in [OpType::Create, OpType::Update] {
            let action = ActionBuilder::with_clock(target(op), frozen_clock)
                .build(line(json!({"_id": "x", "a": 1})))?;
            let payload = action.payload.expect("💀 payload should be present");
            assert_eq!(payload["a"], 1);
            assert!(payload.get("_id").is_none());
        }
        Ok(())
    }

    #[test]
    fn the_one_where_numeric_ids_get_stringified() -> Result<()> {
        let action = ActionBuilder::with_clock(target(OpType::Index), frozen_clock)
            .build(line(json!({"_id": 42, "a": 1})))?;
        assert_eq!(action.id, "42");
        Ok(())
    }

    #[test]
    fn the_one_where_a_nameless_record_stops_everything() {
        let builder = ActionBuilder::with_clock(target(OpType::Index), frozen_clock);
        for nameless in [json!({"a": 1}), json!({"_id": null}), json!({"_id": {"nested": 1}})] {
            let err = builder.build(line(nameless)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<UploadError>(),
                Some(UploadError::MissingIdentifier { line: 1, field: "_id" })
            ));
        }
    }

    fn actions(n: usize) -> impl Iterator<Item = Result<Action>> {
        (0..n).map(|i| {
            Ok(Action {
                op_type: OpType::Index,
                index: "crawl".to_string(),
                doc_type: None,
                id: i.to_string(),
                payload: Some(Record::new()),
            })
        })
    }

    #[test]
    fn the_one_where_205_actions_make_five_chunks() -> Result<()> {
        let chunks = Chunker::new(actions(205), 50).collect::<Result<Vec<_>>>()?;
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![50, 50, 50, 50, 5]);
        let seqs: Vec<u64> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

        let ids: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.actions.iter().map(|a| a.id.clone()))
            .collect();
        let expected: Vec<String> = (0..205).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected, "no action dropped, duplicated, or shuffled");
        Ok(())
    }

    #[test]
    fn the_one_where_nothing_in_means_no_chunks_out() {
        assert_eq!(Chunker::new(actions(0), 50).count(), 0);
        assert_eq!(Chunker::new(actions(100), 50).count(), 2);
    }

    #[test]
    fn the_one_where_an_error_ends_the_chunk_stream() {
        let poisoned = actions(7).chain(std::iter::once(Err(anyhow::anyhow!("boom")))).chain(actions(3));
        let out: Vec<_> = Chunker::new(poisoned, 5).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap().len(), 5);
        assert!(out[1].is_err(), "the half-packed chunk never ships");
    }
}
