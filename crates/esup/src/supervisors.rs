//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where documents wait patiently in a JSON-lines file..."
//! 🎬 "One supervisor dared to upload them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor wires the whole run together and stays in charge of it:
//!
//! ```text
//!   SourceWorker ──(bounded channel of chunks)──▶ dispatch ──▶ classify ──▶ count ──▶ report
//!   (blocking pool)                              (≤ threads      (this task, one item at a time)
//!                                                 in flight)
//! ```
//!
//! The first fatal anything ends the run. Dropping the result stream drops the channel
//! receiver, which is how the source worker learns it can stop reading.
//!
//! ⚠️ DO NOT MAKE THIS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::{BulkWriter, ElasticsearchWriter, InMemoryWriter, WriterBackend};
use crate::dispatch::dispatch;
use crate::outcomes::{OutcomeClassifier, ResultCounts};
use crate::progress::{ConsoleSink, Snapshot, StatsReporter, StatsSink};
use crate::transforms::ActionBuilder;
use workers::{SourceWorker, Worker};

/// 🧾 What a finished run has to show for itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// 🔢 items counted, which is also `counts.total()`
    pub items: u64,
    pub counts: ResultCounts,
    pub elapsed: Duration,
    pub final_snapshot: Snapshot,
}

/// 📦 The Supervisor: because even async tasks need someone hovering over them
/// asking "is it done yet?" every 5 milliseconds.
pub(crate) struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub(crate) fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Connect (or don't, on a dry run), then upload everything with console progress.
    pub(crate) async fn run(&self) -> Result<RunSummary> {
        let writer = if self.app_config.runtime.dry_run {
            info!("🎭 Dry run: nothing leaves this machine, every action is accepted");
            WriterBackend::InMemory(InMemoryWriter::accepting().forgetful())
        } else {
            let writer = ElasticsearchWriter::connect(self.app_config.elasticsearch.clone())
                .await
                .context("💀 Could not get Elasticsearch on the line")?;
            WriterBackend::Elasticsearch(writer)
        };

        let reporter = StatsReporter::new(
            ConsoleSink::new(),
            Duration::from_secs(self.app_config.runtime.report_interval_secs),
        );
        self.run_with(Arc::new(writer), reporter).await
    }

    /// 🧵 The pipeline itself, with the writer and the progress sink handed in.
    pub(crate) async fn run_with<W, S>(
        &self,
        writer: Arc<W>,
        mut reporter: StatsReporter<S>,
    ) -> Result<RunSummary>
    where
        W: BulkWriter + 'static,
        S: StatsSink,
    {
        let AppConfig { input, target, runtime, .. } = &self.app_config;
        let target = target.to_target();
        let threads = runtime.threads.max(1);
        let started = Instant::now();

        info!(
            "🚀 Uploading '{}' to index '{}' as `{}` (chunks of {}, {} in flight)",
            input.path.display(),
            target.index,
            target.op_type,
            runtime.chunk_size,
            threads
        );

        let classifier = OutcomeClassifier::new(target.op_type);
        // -- 🚦 one queued chunk per request slot keeps the dispatcher fed without reading ahead
        let (tx, rx) = async_channel::bounded(threads);
        let source = SourceWorker::new(
            input.clone(),
            ActionBuilder::new(target),
            runtime.chunk_size,
            tx,
        )
        .start();

        let mut counts = ResultCounts::default();
        let mut results = pin!(dispatch(rx, writer, threads));
        while let Some(item) = results.next().await {
            let item = item?;
            classifier.observe(&item, &mut counts)?;
            reporter.tick(&counts, Instant::now());
        }

        source
            .await
            .context("💀 The source worker fell over before finishing its shift")??;

        let final_snapshot = reporter.finish(&counts, Instant::now());
        let elapsed = started.elapsed();
        info!(
            "🏁 Done: {} items in {:.1}s",
            final_snapshot.items,
            elapsed.as_secs_f64()
        );

        Ok(RunSummary {
            items: counts.total(),
            counts,
            elapsed,
            final_snapshot,
        })
    }
}
