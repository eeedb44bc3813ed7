//! 📊 progress.rs: "Are we there yet?" Every upload, every time, forever.
//!
//! 🚀 Every so often (10 seconds by default) we print how many items made it, how they turned
//! out, and how fast the last window went. At the end, one more line for the whole run plus
//! a little table, because a run that finished deserves a receipt.
//!
//! ```text
//! 12,345 items processed (created: 12,000, updated: 345) at 1234 items/s
//! ```
//!
//! ⚠️ Watching this output will not make it go faster. We've tried. Science says no.

use std::fmt;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::outcomes::ResultCounts;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000" → "1,000,000". You're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    // -- 🧵 pre-allocate like we know what we're doing (we do, we read the book)
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📸 One progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// 🔢 cumulative items since the run started
    pub items: u64,
    pub counts: ResultCounts,
    /// 🚀 items in the window / window length
    pub items_per_sec: f64,
    /// ⏱️ length of the window the rate was measured over
    pub window: Duration,
    /// 🏁 true for the whole-run summary
    pub is_final: bool,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self
            .counts
            .iter()
            .map(|(label, count)| format!("{}: {}", label, format_number(count)))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{} items processed ({}) at {:.0} items/s",
            format_number(self.items),
            stats,
            self.items_per_sec
        )
    }
}

/// 🕳️ Where snapshots go. The reporter decides when; the sink decides how.
pub trait StatsSink {
    /// 🔄 Called after every item. Cheap, or it had better be.
    fn tick(&mut self, _items: u64) {}
    /// 📸 A periodic snapshot.
    fn emit(&mut self, snapshot: &Snapshot);
    /// 🏁 The whole-run snapshot. Defaults to just another `emit`.
    fn finish(&mut self, snapshot: &Snapshot) {
        self.emit(snapshot);
    }
}

/// 📊 Tracks the reporting window and decides when a snapshot is due.
///
/// Counts themselves live in [`ResultCounts`], owned by the consumer loop and passed in on
/// every tick. The cumulative item count is their total.
pub struct StatsReporter<S> {
    sink: S,
    interval: Duration,
    started: Instant,
    window_start: Instant,
    window_base: u64,
}

impl<S> std::fmt::Debug for StatsReporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsReporter")
            .field("interval", &self.interval)
            .field("window_base", &self.window_base)
            .finish()
    }
}

fn rate(items: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs > 0.0 { items as f64 / secs } else { 0.0 }
}

impl<S: StatsSink> StatsReporter<S> {
    pub fn new(sink: S, interval: Duration) -> Self {
        Self::starting_at(sink, interval, Instant::now())
    }

    pub fn starting_at(sink: S, interval: Duration, now: Instant) -> Self {
        Self {
            sink,
            interval,
            started: now,
            window_start: now,
            window_base: 0,
        }
    }

    /// 🔄 Call once per counted item. Emits and returns a snapshot when the window is up.
    pub fn tick(&mut self, counts: &ResultCounts, now: Instant) -> Option<Snapshot> {
        let items = counts.total();
        self.sink.tick(items);

        let window = now.saturating_duration_since(self.window_start);
        if window <= self.interval {
            return None;
        }
        let snapshot = Snapshot {
            items,
            counts: counts.clone(),
            items_per_sec: rate(items.saturating_sub(self.window_base), window),
            window,
            is_final: false,
        };
        self.sink.emit(&snapshot);
        self.window_start = now;
        self.window_base = items;
        Some(snapshot)
    }

    /// 🏁 The whole-run snapshot: baseline 0, window = everything since the start.
    pub fn finish(&mut self, counts: &ResultCounts, now: Instant) -> Snapshot {
        let items = counts.total();
        let window = now.saturating_duration_since(self.started);
        let snapshot = Snapshot {
            items,
            counts: counts.clone(),
            items_per_sec: rate(items, window),
            window,
            is_final: true,
        };
        self.sink.finish(&snapshot);
        snapshot
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// 🖥️ Prints snapshot lines to stdout, with a spinner on stderr in between.
///
/// The spinner hides itself when stderr is not a terminal, so piping output to a file gets
/// plain lines only.
pub struct ConsoleSink {
    spinner: ProgressBar,
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("hidden", &self.spinner.is_hidden())
            .finish()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {human_pos} items uploaded ({per_sec}) [{elapsed}]")
        {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self { spinner }
    }

    fn print_line(&self, line: &str) {
        self.spinner.suspend(|| println!("{line}"));
    }
}

impl StatsSink for ConsoleSink {
    fn tick(&mut self, items: u64) {
        self.spinner.set_position(items);
    }

    fn emit(&mut self, snapshot: &Snapshot) {
        self.print_line(&snapshot.to_string());
    }

    fn finish(&mut self, snapshot: &Snapshot) {
        self.spinner.finish_and_clear();
        println!("{snapshot}");
        if !snapshot.counts.is_empty() {
            println!("{}", summary_table(snapshot));
        }
    }
}

/// 🍽️ The receipt: one row per outcome, plus the totals.
pub fn summary_table(snapshot: &Snapshot) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    for (label, count) in snapshot.counts.iter() {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(format_number(count)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(format_number(snapshot.items)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("elapsed"),
        Cell::new(format_duration(snapshot.window)).set_alignment(CellAlignment::Right),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 🧪 A sink with a perfect memory.
    #[derive(Debug, Default)]
    struct Notebook {
        ticks: u64,
        snapshots: Vec<Snapshot>,
        finals: Vec<Snapshot>,
    }

    impl StatsSink for Notebook {
        fn tick(&mut self, _items: u64) {
            self.ticks += 1;
        }
        fn emit(&mut self, snapshot: &Snapshot) {
            self.snapshots.push(snapshot.clone());
        }
        fn finish(&mut self, snapshot: &Snapshot) {
            self.finals.push(snapshot.clone());
        }
    }

    fn counts(pairs: &[(&str, u64)]) -> ResultCounts {
        let mut counts = ResultCounts::default();
        for (label, n) in pairs {
            for _ in 0..*n {
                counts.increment(label);
            }
        }
        counts
    }

    #[test]
    fn the_one_where_commas_make_numbers_friendlier() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_the_snapshot_line_reads_like_a_sentence() {
        let snapshot = Snapshot {
            items: 12345,
            counts: counts(&[("updated", 345), ("created", 12000)]),
            items_per_sec: 1234.4,
            window: Duration::from_secs(10),
            is_final: false,
        };
        assert_eq!(
            snapshot.to_string(),
            "12,345 items processed (created: 12,000, updated: 345) at 1234 items/s"
        );
    }

    #[test]
    fn the_one_where_snapshots_wait_for_the_window_to_close() {
        let t0 = Instant::now();
        let mut reporter = StatsReporter::starting_at(Notebook::default(), Duration::from_secs(10), t0);

        let mut running = ResultCounts::default();
        for _ in 0..100 {
            running.increment("created");
            assert!(reporter.tick(&running, t0 + Duration::from_secs(5)).is_none());
        }
        // -- ⏰ a hair past ten seconds: time to report
        running.increment("created");
        let snap = reporter
            .tick(&running, t0 + Duration::from_secs(20))
            .expect("💀 the window closed, a snapshot was due");
        assert_eq!(snap.items, 101);
        assert!((snap.items_per_sec - 101.0 / 20.0).abs() < 1e-9);

        // -- 🔄 the next window starts from 101 items at t=20s
        for _ in 0..50 {
            running.increment("updated");
        }
        let snap = reporter
            .tick(&running, t0 + Duration::from_secs(45))
            .expect("💀 second window closed too");
        assert_eq!(snap.items, 151);
        assert!((snap.items_per_sec - 50.0 / 25.0).abs() < 1e-9);

        let notebook = reporter.into_sink();
        assert_eq!(notebook.snapshots.len(), 2);
        assert_eq!(notebook.ticks, 102);
    }

    #[test]
    fn the_one_where_the_final_snapshot_covers_the_whole_run() {
        let t0 = Instant::now();
        let mut reporter = StatsReporter::starting_at(Notebook::default(), Duration::from_secs(10), t0);
        let running = counts(&[("deleted", 30), ("not_found", 10)]);
        reporter.tick(&running, t0 + Duration::from_secs(15));

        let last = reporter.finish(&running, t0 + Duration::from_secs(20));
        assert!(last.is_final);
        assert_eq!(last.items, 40);
        assert_eq!(last.items, last.counts.iter().map(|(_, n)| n).sum::<u64>());
        assert!((last.items_per_sec - 2.0).abs() < 1e-9);
        assert_eq!(reporter.into_sink().finals.len(), 1);
    }

    #[test]
    fn the_one_where_an_instant_run_does_not_divide_by_zero() {
        let t0 = Instant::now();
        let mut reporter = StatsReporter::starting_at(Notebook::default(), Duration::from_secs(10), t0);
        let last = reporter.finish(&ResultCounts::default(), t0);
        assert_eq!(last.items_per_sec, 0.0);
        assert_eq!(last.to_string(), "0 items processed () at 0 items/s");
    }

    #[test]
    fn the_one_where_the_receipt_lists_every_outcome() {
        let snapshot = Snapshot {
            items: 3,
            counts: counts(&[("created", 2), ("updated", 1)]),
            items_per_sec: 3.0,
            window: Duration::from_secs(61),
            is_final: true,
        };
        let rendered = summary_table(&snapshot).to_string();
        assert!(rendered.contains("created"));
        assert!(rendered.contains("updated"));
        assert!(rendered.contains("01:01"));
    }
}
