//! Example of using the chia-peers crawler against an address book.

use chia_peers_crawler::{
    ConnectionConfiguration, CrawlerBuilder, PeerConnector, TlsIdentity, DEFAULT_ADDRESS_BOOK,
};
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the address book.
    #[arg(short, long, default_value = DEFAULT_ADDRESS_BOOK)]
    address_book: String,

    /// Node certificate presented to peers, defaults to the public full node certificate.
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Key of the node certificate.
    #[arg(long)]
    key: Option<PathBuf>,

    /// Network id expected in peer handshakes.
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Number of concurrent workers.
    #[arg(short, long, default_value = "128")]
    workers: usize,

    /// Seconds allowed for connect and handshake.
    #[arg(long, default_value = "2")]
    attempt_timeout: u64,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Where a chia install keeps the public full node certificate.
fn default_ssl_path(file: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".chia/mainnet/config/ssl/full_node").join(file)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    log::info!("CRAWLING THE CHIA NETWORK");

    let cert = args
        .cert
        .unwrap_or_else(|| default_ssl_path("public_full_node.crt"));
    let key = args
        .key
        .unwrap_or_else(|| default_ssl_path("public_full_node.key"));
    log::debug!("Using certificate {}", cert.display());
    let identity = TlsIdentity::from_pem_files(&cert, &key)
        .map_err(|e| format!("Failed to load {}: {e}", cert.display()))?;

    let config = ConnectionConfiguration::full_node(args.network, Some(identity));
    let crawler = CrawlerBuilder::new()
        .with_workers(args.workers)
        .with_attempt_timeout(Duration::from_secs(args.attempt_timeout))
        .build(PeerConnector::new(config));

    tokio::select! {
        result = crawler.run(args.address_book) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, shutting down"),
    }

    Ok(())
}
