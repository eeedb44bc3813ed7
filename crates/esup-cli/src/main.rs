//! 🚀 esup-cli: the front door, the bouncer, the maitre d' of esup.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use esup::app_config::{ConfigOverrides, load_config};
use esup::common::OpType;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 📡 Upload a JSON-lines file (optionally gzipped) into an Elasticsearch index.
///
/// Every flag can also come from a TOML file (`--config`) or an `ESUP_*` environment
/// variable, e.g. `ESUP_ELASTICSEARCH__PASSWORD`. Flags win.
#[derive(Parser, Debug)]
#[command(name = "esup", version)]
struct Cli {
    /// JSON-lines input file, one document per line. `.gz` is decompressed.
    input: Option<PathBuf>,

    /// Target index
    index: Option<String>,

    /// Document `_type` for every action. Pass an empty string to leave it out.
    #[arg(long = "type", value_name = "TYPE")]
    doc_type: Option<String>,

    /// Bulk operation: index, create, delete or update. Update sends each record as
    /// `{"doc": record}`, unless the record already has a top-level `doc` or `script`.
    #[arg(long)]
    op_type: Option<OpType>,

    /// Tolerate an unparseable last line (and a truncated gzip tail)
    #[arg(long)]
    broken: bool,

    /// Elasticsearch host, `host`, `host:port` or a URL. Repeat for several hosts.
    #[arg(long = "host", value_name = "HOST")]
    hosts: Vec<String>,

    /// Basic auth username
    #[arg(long = "user")]
    username: Option<String>,

    /// Basic auth password
    #[arg(long)]
    password: Option<String>,

    /// API key, sent as `Authorization: ApiKey ...`. Wins over basic auth.
    #[arg(long)]
    api_key: Option<String>,

    /// Actions per bulk request
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Max bulk requests in flight
    #[arg(long)]
    threads: Option<usize>,

    /// Upload at most this many records
    #[arg(long)]
    limit: Option<usize>,

    /// Seconds between progress lines
    #[arg(long)]
    report_interval: Option<u64>,

    /// Skip the cluster info request at startup
    #[arg(long)]
    no_ping: bool,

    /// Read and build everything, send nothing
    #[arg(long)]
    dry_run: bool,

    /// TOML config file
    #[arg(long, env = "ESUP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    /// 🎛️ Flags become the top config layer. Switches only count when they are on, so an
    /// absent `--broken` does not overrule `broken = true` in the file.
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::default();
        overrides.input.path = self.input.clone();
        overrides.input.broken = self.broken.then_some(true);
        overrides.input.limit = self.limit;
        overrides.target.index = self.index.clone();
        overrides.target.doc_type = self.doc_type.clone();
        overrides.target.op_type = self.op_type;
        overrides.elasticsearch.hosts = (!self.hosts.is_empty()).then(|| self.hosts.clone());
        overrides.elasticsearch.username = self.username.clone();
        overrides.elasticsearch.password = self.password.clone();
        overrides.elasticsearch.api_key = self.api_key.clone();
        overrides.elasticsearch.ping = self.no_ping.then_some(false);
        overrides.runtime.chunk_size = self.chunk_size;
        overrides.runtime.threads = self.threads;
        overrides.runtime.report_interval_secs = self.report_interval;
        overrides.runtime.dry_run = self.dry_run.then_some(true);
        overrides
    }
}

/// 🚀 main(): where it all begins. The genesis. The big bang.
/// The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Logs go to stderr, so stdout is nothing but progress lines
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("esup=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = async {
        let app_config = load_config(cli.config.as_deref(), &cli.overrides())
            .context("💀 In esup-cli, main, we couldn't assemble a configuration. Check the flags, the config file and any ESUP_* variables. Make sure you didn't forget the input file or the index")?;
        esup::run(app_config).await
    }
    .await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            // -- 🕵️ sniff the cause like a truffle pig hunting for connection problems
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like Elasticsearch isn't reachable. \
                Double-check the --host value and that the cluster is actually running. \
                If you're using Docker, try `docker ps` to see what's up. \
                Even clusters need a nudge sometimes. ☕"
            );
        }

        // 🗑️ Exit with prejudice. Process exitus maximus.
        std::process::exit(1);
    }

    // ✅ If we got here, everything worked. Pop the champagne. 🍾
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn the_one_where_clap_agrees_with_itself() {
        Cli::command().debug_assert();
    }

    #[test]
    fn the_one_where_flags_become_the_top_layer() {
        let cli = Cli::try_parse_from([
            "esup",
            "items.jl.gz",
            "crawl",
            "--op-type",
            "DELETE",
            "--host",
            "es1",
            "--host",
            "es2:9201",
            "--threads",
            "2",
            "--no-ping",
            "--broken",
        ])
        .expect("💀 these flags should parse");
        let overrides = cli.overrides();
        assert_eq!(overrides.input.path, Some(PathBuf::from("items.jl.gz")));
        assert_eq!(overrides.input.broken, Some(true));
        assert_eq!(overrides.target.index.as_deref(), Some("crawl"));
        assert_eq!(overrides.target.op_type, Some(OpType::Delete));
        assert_eq!(
            overrides.elasticsearch.hosts,
            Some(vec!["es1".to_string(), "es2:9201".to_string()])
        );
        assert_eq!(overrides.elasticsearch.ping, Some(false));
        assert_eq!(overrides.runtime.threads, Some(2));
        assert_eq!(overrides.runtime.dry_run, None);
        assert_eq!(overrides.runtime.chunk_size, None);
    }

    #[test]
    fn the_one_where_an_unknown_op_type_is_turned_away_at_the_door() {
        assert!(Cli::try_parse_from(["esup", "items.jl", "crawl", "--op-type", "upsert"]).is_err());
    }
}
