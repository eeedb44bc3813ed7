//! 🚀 esup: pour a JSON-lines file into an Elasticsearch index, one `_bulk` chunk at a time.
//!
//! 🎬 *[a crawler finishes. it leaves behind twelve gigabytes of `items.jl.gz`.]*
//! *[somebody has to put them somewhere searchable. that somebody is us.]* 🦆
//!
//! ```text
//!   records ─▶ transforms (stamp + address) ─▶ dispatch (≤ threads in flight, ordered)
//!           ─▶ outcomes (judge + count) ─▶ progress (every 10s, and once at the end)
//! ```

pub mod app_config;
pub mod backends;
pub mod common;
pub mod dispatch;
pub mod errors;
pub mod outcomes;
pub mod progress;
pub mod records;
pub mod transforms;
// ⚠️ private. The supervisor and its workers are nobody else's business.
mod supervisors;

use anyhow::Result;

use crate::app_config::AppConfig;
use crate::supervisors::Supervisor;

pub use crate::supervisors::RunSummary;

/// 🚀 Upload everything `app_config` describes, printing progress as it goes.
///
/// 💀 Stops at the first fatal condition: an unreadable or malformed input line, a record
/// without an `_id`, a failed request, or an item outcome its op type does not tolerate.
pub async fn run(app_config: AppConfig) -> Result<RunSummary> {
    Supervisor::new(app_config).run().await
}
