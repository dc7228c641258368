//! Run exploration tool calls against a design file and print JSON envelopes.
//!
//! Reads the access token from `FIGMA_ACCESS_TOKEN` (and an optional API
//! base URL from `FIGMA_API_URL`).
//!
//! # Examples
//!
//! ```sh
//! # One-shot call
//! framescope call '{"tool": "list_pages", "fileId": "AbC123"}'
//!
//! # Long-lived session: one JSON request per stdin line
//! printf '%s\n' \
//!   '{"tool": "list_frames", "fileId": "AbC123", "pageName": "Home"}' \
//!   '{"tool": "list_frames", "fileId": "AbC123", "pageName": "Home", "continue": true}' \
//!   | framescope session --page-size 10
//! ```

use std::process;

use clap::{Parser, Subcommand};
use framescope::envelope::DEFAULT_PAGE_SIZE;
use framescope::{
    CachingGateway, Explorer, ExplorerConfig, GatewayConfig, GatewayError, ThrottleRetry,
    ToolRequest,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Rate-limited, caching explorer for design files.
#[derive(Parser)]
#[command(name = "framescope")]
struct Cli {
    // ── Paging ─────────────────────────────────────────────────
    /// Items per page for paginated results
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Outline depth used when listing frames (0 = full document)
    #[arg(long, default_value_t = 3)]
    outline_depth: u32,

    /// Omit the token estimate from envelopes
    #[arg(long)]
    no_token_estimates: bool,

    /// Calibrated characters per token for estimates (default 4)
    #[arg(long)]
    chars_per_token: Option<f64>,

    // ── Gateway ────────────────────────────────────────────────
    /// Give up after this many throttled retries (default: retry forever)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Make cache hits consume a rate-limit slot
    #[arg(long)]
    charge_cache_hits: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single tool request given as JSON
    Call {
        /// e.g. '{"tool": "list_pages", "fileId": "AbC123"}'
        request: String,
    },
    /// Read tool requests from stdin, one JSON object per line
    Session,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_explorer(cli: &Cli, cancel: CancellationToken) -> Result<Explorer, GatewayError> {
    let mut retry = ThrottleRetry::default();
    if let Some(max) = cli.max_retries {
        retry = retry.with_max_retries(max);
    }
    let config = GatewayConfig::from_env()?
        .with_retry(retry)
        .with_charge_cache_hits(cli.charge_cache_hits);
    let gateway = CachingGateway::connect(&config)?.with_cancellation(cancel);

    let outline_depth = (cli.outline_depth > 0).then_some(cli.outline_depth);
    let explorer_config = ExplorerConfig::default()
        .with_page_size(cli.page_size)
        .with_outline_depth(outline_depth)
        .with_token_estimates(!cli.no_token_estimates)
        .with_chars_per_token(cli.chars_per_token);
    Ok(Explorer::new(gateway, explorer_config))
}

/// Parse and run one request, rendering either the envelope or an error
/// object as a single JSON line.
async fn run_line(explorer: &Explorer, line: &str) -> Result<String, String> {
    let request: ToolRequest = serde_json::from_str(line)
        .map_err(|e| json!({"error": format!("invalid request: {e}")}).to_string())?;
    match explorer.handle(request).await {
        Ok(envelope) => Ok(envelope.to_value().to_string()),
        Err(e) => Err(json!({"error": e.to_string()}).to_string()),
    }
}

async fn run_session(explorer: &Explorer) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))?
    {
        if line.trim().is_empty() {
            continue;
        }
        match run_line(explorer, &line).await {
            Ok(out) | Err(out) => println!("{out}"),
        }
        if explorer.gateway().cancellation_token().is_cancelled() {
            break;
        }
    }
    let stats = explorer.gateway().cache_stats();
    info!(
        "Session finished: {} cached response(s), {} hit(s), {} miss(es), hit rate {:.0}%",
        stats.entries,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling pending waits");
            ctrl_c.cancel();
        }
    });

    let explorer = match build_explorer(&cli, cancel) {
        Ok(explorer) => explorer,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    match &cli.command {
        Command::Call { request } => match run_line(&explorer, request).await {
            Ok(out) => println!("{out}"),
            Err(out) => {
                println!("{out}");
                process::exit(1);
            }
        },
        Command::Session => {
            if let Err(e) = run_session(&explorer).await {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
