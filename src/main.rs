//! Tail engine demo bootstrap.
//!
//! Minimal newline-delimited-JSON-over-TCP listener wiring client
//! sockets to the core `Engine`. This binary is ambient plumbing around
//! the library crate, not part of the core's specified contract — a real
//! deployment would put an HTTP/WebSocket surface (listing files, serving
//! a UI) in front of the same `Engine`, as spec.md §1 scopes it.

use clap::Parser;
use std::sync::Arc;
use tail_engine::{Engine, EngineConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Tail engine demo server — accepts NDJSON `watch`/`unwatch` control
/// messages and streams back `line`/`status`/`error` events.
#[derive(Parser, Debug)]
#[command(name = "tail-engine-server")]
#[command(about = "Demo bootstrap for the tail engine core", long_about = None)]
struct Args {
    /// Address to bind the demo TCP listener on.
    #[arg(short, long, default_value = "127.0.0.1:7777")]
    bind: String,

    /// Number of backfill lines delivered at attach time.
    #[arg(long, default_value_t = tail_engine::config::DEFAULT_BACKFILL_LINES)]
    backfill: usize,

    /// Verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = EngineConfig::default().with_backfill_lines(args.backfill);
    let engine = Engine::new(config);

    let listener = TcpListener::bind(&args.bind).await?;
    tracing::info!(addr = %args.bind, "tail engine listening");

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!(%peer, "client connected");
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(engine, socket).await {
                tracing::warn!(%peer, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(engine: Arc<Engine>, socket: TcpStream) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(256);
    let session = engine.new_session(tx);

    let writer_task = tokio::spawn(async move {
        while let Some(mut bytes) = rx.recv().await {
            bytes.push(b'\n');
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        engine.handle_inbound(&session, line.as_bytes());
    }

    engine.disconnect(&session);
    writer_task.abort();
    Ok(())
}
