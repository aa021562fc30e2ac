use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use kvdict::codec::DEFAULT_MAX_LINE_LENGTH;
use kvdict::config::{Config, DEFAULT_BACKEND_URL, DEFAULT_LISTEN};
use kvdict::store::{DEFAULT_MAX_SCAN_ROUNDS, DEFAULT_SCAN_COUNT};
use kvdict::{server, Error};

#[derive(Parser, Debug)]
#[command(version, about = "Serves dictionary lookups and iterations from a Redis database")]
struct Args {
    /// Where to listen for clients: tcp://host:port or unix:///path/to/socket
    #[arg(long, env = "KVDICT_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Backend to read from: redis://, rediss:// or memory://
    #[arg(long, env = "KVDICT_BACKEND", default_value = DEFAULT_BACKEND_URL)]
    backend: String,

    /// Log at debug level, including every line sent and received
    #[arg(short, long, env = "KVDICT_DEBUG")]
    debug: bool,

    /// Give up on a backend call after this many milliseconds
    #[arg(long, env = "KVDICT_BACKEND_TIMEOUT_MS")]
    backend_timeout_ms: Option<u64>,

    /// Longest request line accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Keys requested per scan round when no row limit is given
    #[arg(
        long,
        default_value_t = DEFAULT_SCAN_COUNT as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    scan_count: u64,

    /// Scan rounds allowed for a single iteration
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_SCAN_ROUNDS as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    max_scan_rounds: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            listen: args.listen,
            backend_url: args.backend,
            debug: args.debug,
            backend_timeout: args.backend_timeout_ms.map(Duration::from_millis),
            max_line_length: args.max_line_length,
            scan_count: saturating_usize(args.scan_count),
            max_scan_rounds: saturating_usize(args.max_scan_rounds),
        }
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from(Args::parse());

    let level = if config.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, shutting down");
                signal.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for the interrupt signal"),
        }
    });

    server::run(config, shutdown).await
}
