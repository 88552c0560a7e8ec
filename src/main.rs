use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use server_scan_rs::config::{DEFAULT_PORT_RANGE_END, DEFAULT_SERVER_PORT};
use server_scan_rs::netdetect;
use server_scan_rs::{DiscoveredServer, ResultSink, ScanConfig, ScanRequest, ScanResults, Scanner};

/// server-scan — headless front end for the server scanning engine.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "server-scan",
    version,
    about = "Find game servers on the local network with bounded-parallel TCP probes.",
    long_about = None
)]
struct Cli {
    /// Address to scan around (e.g. 192.168.1.7 or 10.0.0.).
    /// If omitted, the first local /24 is used.
    #[arg(long)]
    address: Option<String>,

    /// Fixed port for the address sweep.
    #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Port-sweep --address over the default game server span.
    #[arg(long = "port-sweep", requires = "address")]
    port_sweep: bool,

    /// Port-sweep --address starting at this port.
    #[arg(long = "start-port", requires = "address")]
    start_port: Option<u16>,

    /// Last port of the port sweep.
    #[arg(long = "end-port", default_value_t = DEFAULT_PORT_RANGE_END)]
    end_port: u16,

    /// Max concurrent TCP connect attempts.
    #[arg(long, default_value_t = 50)]
    concurrency: usize,

    /// Socket connect timeout in milliseconds. Defaults to 200 for address
    /// sweeps and 100 for port sweeps.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Prints progress on one line and servers as they turn up.
struct ConsoleSink {
    last_percent: i32,
}

impl ResultSink for ConsoleSink {
    fn on_progress(&mut self, percent: f32, processed: u64, total: u64) {
        let whole = percent.floor() as i32;
        if whole != self.last_percent {
            self.last_percent = whole;
            print!("\rScanning: {percent:.1}% ({processed}/{total})");
            let _ = std::io::stdout().flush();
        }
    }

    fn on_server_found(&mut self, server: DiscoveredServer) {
        println!("\rFound {} at {}", server.label, server.address);
    }

    fn on_scan_complete(&mut self, servers: Vec<DiscoveredServer>, cancelled: bool) {
        println!();
        if cancelled {
            println!("Scanning stopped. Found {} servers", servers.len());
        } else {
            println!("Scanning completed! Found {} servers", servers.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let address = match cli.address.clone() {
        Some(a) => a,
        None => default_address()?,
    };

    let request = match (cli.start_port, cli.port_sweep) {
        (Some(start), _) => ScanRequest::port_range(&address, start.into(), cli.end_port.into())?,
        (None, true) => ScanRequest::default_port_range(&address)?,
        (None, false) => ScanRequest::local_sweep(address.trim_end_matches('.'), cli.port.into())
            .or_else(|_| ScanRequest::address_range(&address, cli.port.into()))?,
    };

    let config = match cli.timeout_ms {
        Some(ms) => ScanConfig::new(cli.concurrency, Duration::from_millis(ms)),
        None => ScanConfig {
            concurrency: cli.concurrency,
            ..ScanConfig::default()
        },
    };
    let (scanner, mut events) = Scanner::new(config);
    let handle = scanner.start(request)?;

    let config = scanner.config();
    println!("server-scan configuration:");
    println!("  request      : {:?}", handle.request().mode());
    println!("  targets      : {}", handle.request().total());
    println!("  concurrency  : {}", config.effective_concurrency());
    println!(
        "  timeout_ms   : {}",
        config.timeout_for(&handle.request().mode()).as_millis()
    );

    let canceller = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mut sink = ConsoleSink { last_percent: -1 };
    events.dispatch_until_complete(&mut sink).await;

    let results = handle.results();
    if let Some(reason) = &results.aborted {
        eprintln!("Scan aborted: {reason}");
    }
    print_results_table(&results);
    if let Some(path) = cli.output.as_deref() {
        write_results_json(path, &results)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON results to {}", path.display());
    }
    Ok(())
}

fn default_address() -> Result<String> {
    let cidrs = netdetect::detect_local_cidrs().context("failed to detect local networks")?;
    let first = cidrs
        .first()
        .context("no local IPv4 network found; pass --address")?;
    let o = first.network().octets();
    Ok(format!("{}.{}.{}.", o[0], o[1], o[2]))
}

fn print_results_table(results: &ScanResults) {
    let label_w = results
        .servers
        .iter()
        .map(|s| s.label.len())
        .fold("label".len(), usize::max);
    let addr_w = results
        .servers
        .iter()
        .map(|s| s.address.len())
        .fold("address".len(), usize::max);
    let lat_w = "latency_ms".len();

    println!(
        "\nServers: {} (scanned: {}/{})",
        results.found_count, results.scanned_done, results.scanned_total
    );
    println!(
        "{:<label_w$}  {:<addr_w$}  {:>lat_w$}",
        "label", "address", "latency_ms"
    );
    println!("{:-<label_w$}  {:-<addr_w$}  {:-<lat_w$}", "", "", "");
    for s in &results.servers {
        println!(
            "{:<label_w$}  {:<addr_w$}  {:>lat_w$}",
            s.label, s.address, s.latency_ms
        );
    }
}

fn write_results_json(path: &std::path::Path, results: &ScanResults) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_sweep_flags_need_an_address() {
        assert!(Cli::try_parse_from(["server-scan", "--start-port", "25565"]).is_err());
        assert!(Cli::try_parse_from(["server-scan", "--port-sweep"]).is_err());

        let cli = Cli::try_parse_from([
            "server-scan",
            "--address",
            "127.0.0.1",
            "--start-port",
            "8000",
        ])
        .unwrap();
        assert_eq!(cli.start_port, Some(8000));
        assert_eq!(cli.end_port, DEFAULT_PORT_RANGE_END);
        assert_eq!(cli.timeout_ms, None);
    }
}
