//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 One question, asked many times: "here is a chunk, what happened to each action?"
//! The [`BulkWriter`] trait is that question. The dispatcher asks it. The backends answer it.
//! Nobody upstream knows whether the answer came from a cluster or a `Vec`.
//!
//! ⚠️ Writers are shared across concurrent requests (`&self`, `Send + Sync`). Connection
//! pooling is the HTTP client's business.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{Chunk, ItemResult};

pub mod elasticsearch;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchWriter};
pub use in_mem::InMemoryWriter;

/// 📡 Something that can take a chunk of bulk actions and report back on every one of them.
///
/// # Contract 📜
/// - One call = one round trip. No retries at this layer.
/// - `Ok(results)` has exactly `chunk.len()` entries, in submission order.
/// - Per-item failures are `ItemResult { success: false, .. }`, NOT `Err`. `Err` is for the
///   whole request going sideways (network, non-2xx, garbage body).
#[async_trait]
pub trait BulkWriter: std::fmt::Debug + Send + Sync {
    async fn write_chunk(&self, chunk: &Chunk) -> Result<Vec<ItemResult>>;
}

/// 🎭 The many faces of a writer. The supervisor holds one of these and stays blissfully
/// ignorant of where the documents land.
#[derive(Debug)]
pub enum WriterBackend {
    Elasticsearch(ElasticsearchWriter),
    InMemory(InMemoryWriter),
}

#[async_trait]
impl BulkWriter for WriterBackend {
    async fn write_chunk(&self, chunk: &Chunk) -> Result<Vec<ItemResult>> {
        match self {
            WriterBackend::Elasticsearch(writer) => writer.write_chunk(chunk).await,
            WriterBackend::InMemory(writer) => writer.write_chunk(chunk).await,
        }
    }
}
