//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the credit
//! in the sprint retro.
//!
//! 🚀 Right now the crew is one worker strong: the source worker, who reads the file so the
//! async side never has to block on disk. 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

mod source_worker;
pub(super) use source_worker::SourceWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(super) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}
