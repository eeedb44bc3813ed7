//! 🧵 The Bulk Dispatcher: many requests in flight, one orderly line of results out.
//!
//! 🎬 *[eight tasks sprint to the cluster. chunk #3 comes back first. it waits its turn.]*
//!
//! Chunks are pulled lazily from upstream, each is handed to its own tokio task, and at most
//! `threads` of those tasks exist at any moment. Results are released in chunk order no matter
//! who finishes first, then flattened into one item-per-action stream.
//!
//! ```text
//!   chunks ──▶ [task][task][task]...(≤ threads) ──▶ ordered merge ──▶ ItemResult, ItemResult, ...
//! ```
//!
//! Dropping the output stream stops pulling new chunks. Tasks already in flight finish (or
//! fail) on their own; nobody is listening any more.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::backends::BulkWriter;
use crate::common::{Action, Chunk, ItemResult};
use crate::errors::UploadError;
use crate::transforms::Chunker;

/// 🚀 Fan a stream of chunks out to `writer` with at most `threads` requests in flight.
///
/// An `Err` chunk (bad input upstream) flows through in its place and ends things there.
pub fn dispatch<S, W>(
    chunks: S,
    writer: Arc<W>,
    threads: usize,
) -> impl Stream<Item = Result<ItemResult>>
where
    S: Stream<Item = Result<Chunk>>,
    W: BulkWriter + 'static,
{
    chunks
        .map(move |chunk| {
            let writer = Arc::clone(&writer);
            async move {
                let chunk = chunk?;
                let (seq, sent) = (chunk.seq, chunk.len());
                debug!("🚚 chunk #{} ({} actions) heading out", seq, sent);

                let results = tokio::spawn(async move { writer.write_chunk(&chunk).await })
                    .await
                    .with_context(|| format!("💀 the task writing chunk #{seq} died before answering"))?
                    .with_context(|| format!("💀 chunk #{seq} could not be written"))?;

                if results.len() != sent {
                    return Err(UploadError::BulkResponseMismatch {
                        sent,
                        received: results.len(),
                    }
                    .into());
                }
                debug!("📬 chunk #{} answered", seq);
                Ok::<_, anyhow::Error>(results)
            }
        })
        .buffered(threads.max(1))
        .map_ok(|results| stream::iter(results.into_iter().map(Ok::<_, anyhow::Error>)))
        .try_flatten()
}

/// 🧰 The whole dispatcher contract in one call: partition `actions` into chunks of
/// `chunk_size`, then [`dispatch`] them over `threads` concurrent requests.
pub fn dispatch_actions<I, W>(
    actions: I,
    writer: Arc<W>,
    chunk_size: usize,
    threads: usize,
) -> impl Stream<Item = Result<ItemResult>>
where
    I: Iterator<Item = Result<Action>>,
    W: BulkWriter + 'static,
{
    dispatch(stream::iter(Chunker::new(actions, chunk_size)), writer, threads)
}
