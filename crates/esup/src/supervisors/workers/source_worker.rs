//! 🎬 *[a file opens. lines pour out. a channel, bounded and patient, fills up.]*
//!
//! 📂 The SourceWorker reads records, stamps them into actions, packs them into chunks and
//! pushes the chunks down a bounded channel. It runs on tokio's blocking pool because file
//! reads and gunzipping block, and the async runtime has better things to do.
//!
//! 🚦 The channel is the back-pressure: when the dispatcher has enough chunks queued, the
//! send blocks and the worker stops reading. When the receiver is dropped (the run ended
//! early), the send fails and the worker quietly goes home.

use anyhow::Result;
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::app_config::InputConfig;
use crate::common::Chunk;
use crate::records;
use crate::transforms::{ActionBuilder, Chunker};

/// 📂 Reads one input file into a channel of chunks.
#[derive(Debug)]
pub(crate) struct SourceWorker {
    input: InputConfig,
    builder: ActionBuilder,
    chunk_size: usize,
    tx: Sender<Result<Chunk>>,
}

impl SourceWorker {
    pub(crate) fn new(
        input: InputConfig,
        builder: ActionBuilder,
        chunk_size: usize,
        tx: Sender<Result<Chunk>>,
    ) -> Self {
        Self {
            input,
            builder,
            chunk_size,
            tx,
        }
    }

    /// 🚰 The blocking loop. Every failure goes down the channel in place of the chunk it
    /// spoiled, and then the worker stops: nothing after a bad record ever ships.
    fn pump(self) -> Result<()> {
        let mut source = match records::open(&self.input.path, self.input.broken) {
            Ok(source) => source,
            Err(err) => {
                // -- 📭 nobody listening is fine, the run is already over
                let _ = self.tx.send_blocking(Err(err));
                return Ok(());
            }
        };

        let limit = self.input.limit.unwrap_or(usize::MAX);
        let builder = &self.builder;
        let actions = source
            .by_ref()
            .take(limit)
            .map(|line_record| line_record.and_then(|lr| builder.build(lr)));

        let mut chunks_sent: u64 = 0;
        for chunk in Chunker::new(actions, self.chunk_size) {
            let failed = chunk.is_err();
            if self.tx.send_blocking(chunk).is_err() {
                debug!("📭 SourceWorker: receiver is gone after {} chunks, stopping", chunks_sent);
                return Ok(());
            }
            if failed {
                debug!("💀 SourceWorker: sent a failure downstream, stopping");
                return Ok(());
            }
            chunks_sent += 1;
        }

        info!(
            "🏁 SourceWorker: '{}' done after {} lines, {} chunks queued",
            self.input.path.display(),
            source.lines_read(),
            chunks_sent
        );
        Ok(())
    }
}

impl Worker for SourceWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        // -- 🔌 tx is moved in and dropped on return, which is what closes the channel
        tokio::task::spawn_blocking(move || self.pump())
    }
}
