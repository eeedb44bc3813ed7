//! ⚖️ Outcomes: the judge, the jury, and the tally sheet.
//!
//! Every item result passes through here exactly once. The op type's [`SuccessPolicy`]
//! decides whether a non-success is a shrug or a stop. Shrugs and successes get counted.
//! Stops get an [`UploadError::UnexpectedBulkFailure`] and end the run on the spot.
//!
//! [`SuccessPolicy`]: crate::common::SuccessPolicy

use std::collections::BTreeMap;

use crate::common::{ItemResult, OpType};
use crate::errors::UploadError;

/// 📊 Outcome label → running total. Sorted by label, so printing it is already tidy.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultCounts(BTreeMap<String, u64>);

impl ResultCounts {
    pub fn increment(&mut self, outcome: &str) {
        match self.0.get_mut(outcome) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(outcome.to_string(), 1);
            }
        }
    }

    pub fn get(&self, outcome: &str) -> u64 {
        self.0.get(outcome).copied().unwrap_or(0)
    }

    /// 🔢 Sum over every label. Equals the number of items counted so far.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// 🔄 Non-zero `(label, count)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(label, count)| (label.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// ⚖️ Applies one op type's success policy to item results.
#[derive(Debug, Clone, Copy)]
pub struct OutcomeClassifier {
    op_type: OpType,
}

impl OutcomeClassifier {
    pub fn new(op_type: OpType) -> Self {
        Self { op_type }
    }

    /// ✅ or 💀. Successes pass. Tolerated outcomes pass. Everything else is fatal.
    pub fn classify(&self, item: &ItemResult) -> Result<(), UploadError> {
        if item.success
            || self
                .op_type
                .policy()
                .tolerated_outcomes
                .contains(&item.outcome.as_str())
        {
            return Ok(());
        }
        Err(UploadError::UnexpectedBulkFailure {
            op_type: self.op_type.to_string(),
            id: item.id.clone(),
            outcome: item.outcome.clone(),
            detail: item.detail.clone(),
        })
    }

    /// 📝 Classify, then count. A fatal item is not counted.
    pub fn observe(&self, item: &ItemResult, counts: &mut ResultCounts) -> Result<(), UploadError> {
        self.classify(item)?;
        counts.increment(&item.outcome);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(success: bool, outcome: &str) -> ItemResult {
        ItemResult {
            success,
            outcome: outcome.to_string(),
            id: Some("doc-1".to_string()),
            status: if success { 200 } else { 404 },
            detail: json!({"_id": "doc-1", "result": outcome}),
        }
    }

    #[test]
    fn the_one_where_deleting_the_already_deleted_is_fine() {
        let classifier = OutcomeClassifier::new(OpType::Delete);
        let mut counts = ResultCounts::default();
        classifier.observe(&item(true, "deleted"), &mut counts).unwrap();
        classifier.observe(&item(false, "not_found"), &mut counts).unwrap();
        classifier.observe(&item(false, "not_found"), &mut counts).unwrap();
        assert_eq!(counts.get("deleted"), 1);
        assert_eq!(counts.get("not_found"), 2);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn the_one_where_delete_still_has_standards() {
        let classifier = OutcomeClassifier::new(OpType::Delete);
        let mut counts = ResultCounts::default();
        let err = classifier
            .observe(&item(false, "error"), &mut counts)
            .unwrap_err();
        match err {
            UploadError::UnexpectedBulkFailure { op_type, id, outcome, detail } => {
                assert_eq!(op_type, "delete");
                assert_eq!(id.as_deref(), Some("doc-1"));
                assert_eq!(outcome, "error");
                assert_eq!(detail["result"], "error");
            }
            other => panic!("💀 wrong error: {other:?}"),
        }
        assert!(counts.is_empty(), "fatal items are not counted");
    }

    #[test]
    fn the_one_where_everyone_else_forgives_nothing() {
        for op in [OpType::Index, OpType::Create, OpType::Update] {
            let classifier = OutcomeClassifier::new(op);
            assert!(classifier.classify(&item(true, "created")).is_ok());
            for outcome in ["not_found", "noop", "error", "created"] {
                assert!(
                    classifier.classify(&item(false, outcome)).is_err(),
                    "{op} must not tolerate a failed `{outcome}`"
                );
            }
        }
    }

    #[test]
    fn the_one_where_counts_come_out_sorted() {
        let mut counts = ResultCounts::default();
        for label in ["updated", "created", "updated", "deleted"] {
            counts.increment(label);
        }
        let pairs: Vec<(&str, u64)> = counts.iter().collect();
        assert_eq!(pairs, vec![("created", 1), ("deleted", 1), ("updated", 2)]);
    }
}
