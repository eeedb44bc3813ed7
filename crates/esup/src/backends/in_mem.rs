//! # Previously, on esup...
//!
//! 🎬 The cluster was down. The tests still had to run. Someone wrote a writer so simple it
//! lives entirely in RAM and agrees with everything you say. Unless you script it not to.
//!
//! `InMemoryWriter` answers every chunk without a network. By default every action succeeds
//! with the outcome its op type would normally get (`created`, `updated`, `deleted`). Tests
//! can swap in a responder to script failures, and a delay to shuffle completion order.
//! `--dry-run` uses the default one.
//!
//! ⚠️ This is NOT a cluster. If you're deploying this to prod, please also deploy a therapist.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::BulkWriter;
use crate::common::{Action, Chunk, ItemResult, OpType};

/// 🎭 Decides what happened to one action.
pub type Responder = Arc<dyn Fn(&Action) -> ItemResult + Send + Sync>;

/// 🐌 How long to pretend a chunk took.
pub type Delay = Arc<dyn Fn(&Chunk) -> Duration + Send + Sync>;

/// 📦 A writer that never forgets. Every chunk it receives is kept for later inspection.
#[derive(Clone)]
pub struct InMemoryWriter {
    /// 🔒 The evidence locker. One entry per `write_chunk` call, in call order.
    pub received: Arc<Mutex<Vec<Chunk>>>,
    responder: Responder,
    delay: Option<Delay>,
    /// 🧠 keep received chunks around. Off for dry runs, which would otherwise hoard the file.
    retain: bool,
}

impl std::fmt::Debug for InMemoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWriter")
            .field("scripted_delay", &self.delay.is_some())
            .field("retain", &self.retain)
            .finish()
    }
}

impl Default for InMemoryWriter {
    fn default() -> Self {
        Self::accepting()
    }
}

/// ✅ What a happy cluster would have said.
pub fn accepted(action: &Action) -> ItemResult {
    let (status, outcome) = match action.op_type {
        OpType::Index | OpType::Create => (201, "created"),
        OpType::Update => (200, "updated"),
        OpType::Delete => (200, "deleted"),
    };
    ItemResult {
        success: true,
        outcome: outcome.to_string(),
        id: Some(action.id.clone()),
        status,
        detail: serde_json::json!({ "_id": action.id, "status": status, "result": outcome }),
    }
}

impl InMemoryWriter {
    /// 🚀 Says yes to everything.
    pub fn accepting() -> Self {
        Self::with_responder(Arc::new(accepted))
    }

    pub fn with_responder(responder: Responder) -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            responder,
            delay: None,
            retain: true,
        }
    }

    /// 🫥 Answer every chunk, remember none of them. What `--dry-run` uses.
    pub fn forgetful(mut self) -> Self {
        self.retain = false;
        self
    }

    /// 🐌 Make each chunk take a while before answering.
    pub fn with_delay(mut self, delay: Delay) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 🔢 Total actions received across all chunks so far.
    pub async fn received_actions(&self) -> usize {
        self.received.lock().await.iter().map(Chunk::len).sum()
    }
}

#[async_trait]
impl BulkWriter for InMemoryWriter {
    async fn write_chunk(&self, chunk: &Chunk) -> Result<Vec<ItemResult>> {
        if let Some(ref delay) = self.delay {
            tokio::time::sleep(delay(chunk)).await;
        }
        let results = chunk.actions.iter().map(|a| (self.responder)(a)).collect();
        if self.retain {
            // 🔒 The Mutex is load-bearing. Writers are called from many tasks at once.
            self.received.lock().await.push(chunk.clone());
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(op_type: OpType) -> Chunk {
        Chunk {
            seq: 0,
            actions: vec![Action {
                op_type,
                index: "crawl".to_string(),
                doc_type: None,
                id: "a".to_string(),
                payload: None,
            }],
        }
    }

    #[tokio::test]
    async fn the_one_where_the_happy_cluster_agrees_with_everything() -> Result<()> {
        let writer = InMemoryWriter::accepting();
        for (op, expected) in [
            (OpType::Index, "created"),
            (OpType::Create, "created"),
            (OpType::Update, "updated"),
            (OpType::Delete, "deleted"),
        ] {
            let results = writer.write_chunk(&chunk(op)).await?;
            assert!(results[0].success);
            assert_eq!(results[0].outcome, expected);
        }
        assert_eq!(writer.received_actions().await, 4);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_dry_run_writer_keeps_no_souvenirs() -> Result<()> {
        let writer = InMemoryWriter::accepting().forgetful();
        let results = writer.write_chunk(&chunk(OpType::Index)).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(writer.received_actions().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_scripted_writer_says_no() -> Result<()> {
        let writer = InMemoryWriter::with_responder(Arc::new(|action: &Action| ItemResult {
            success: false,
            outcome: "not_found".to_string(),
            id: Some(action.id.clone()),
            status: 404,
            detail: serde_json::Value::Null,
        }));
        let results = writer.write_chunk(&chunk(OpType::Delete)).await?;
        assert!(!results[0].success);
        assert_eq!(results[0].status, 404);
        Ok(())
    }
}
