use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arp_sentinel::arp::{ArpCommand, ProcNetArp, SystemSource, TableSource};
use arp_sentinel::detect::{DetectorConfig, DEFAULT_DUPLICATE_THRESHOLD, DEFAULT_ROUTER_SUFFIXES};
use arp_sentinel::gateway::{RouteSource, StaticRoute, SystemRoute};
use arp_sentinel::metrics::ScanMetrics;
use arp_sentinel::monitor::{Monitor, ScanEvent};
use arp_sentinel::{ScanReport, Scanner};
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::{Args, Parser, Subcommand, ValueEnum};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

#[derive(Parser, Debug)]
#[command(version, about = "Passive ARP spoofing detector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the ARP table once and print a report
    Scan(ScanArgs),
    /// Scan periodically until interrupted
    Watch(WatchArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// procfs on Linux, the arp tool elsewhere
    Auto,
    /// /proc/net/arp
    Proc,
    /// the platform arp tool
    Arp,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Use built-in demo data instead of the live ARP table
    #[arg(long)]
    demo: bool,

    /// Where to read the ARP table from
    #[arg(long, value_enum, default_value_t = SourceKind::Auto)]
    source: SourceKind,

    /// Gateway IP, skips default route detection
    #[arg(long)]
    gateway: Option<Ipv4Addr>,

    /// Timeout for external commands (arp, ip, netstat, ipconfig)
    #[arg(long, default_value = "5s")]
    command_timeout: humantime::Duration,

    /// Hardware addresses shared by more hosts than this are flagged
    #[arg(long, default_value_t = DEFAULT_DUPLICATE_THRESHOLD)]
    duplicate_threshold: usize,

    /// Last octet of probable router addresses, excluded from duplicate checks
    #[arg(long = "router-suffix", default_values_t = DEFAULT_ROUTER_SUFFIXES)]
    router_suffixes: Vec<u8>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Time between scans
    #[arg(long, default_value = "30s")]
    interval: humantime::Duration,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    bind_addr: Option<SocketAddr>,
}

fn build_scanner(args: &CommonArgs) -> Scanner {
    let config = DetectorConfig { duplicate_threshold: args.duplicate_threshold, router_suffixes: args.router_suffixes.clone() };
    if args.demo {
        log::warn!("Demo mode: reporting fixture data, not the live ARP table");
        return Scanner::demo(config);
    }

    let timeout: Duration = args.command_timeout.into();
    let source: Box<dyn TableSource> = match args.source {
        SourceKind::Auto => Box::new(SystemSource::new(timeout)),
        SourceKind::Proc => Box::new(ProcNetArp::new()),
        SourceKind::Arp => Box::new(ArpCommand::for_platform(timeout)),
    };
    let routes: Box<dyn RouteSource> = match args.gateway {
        Some(ip) => Box::new(StaticRoute(ip)),
        None => Box::new(SystemRoute::new(timeout)),
    };
    Scanner::new(source, routes, config)
}

fn print_report(report: &ScanReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report).context("failed to encode report")?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

async fn run_scan(args: ScanArgs) -> Result<ExitCode> {
    let scanner = build_scanner(&args.common);
    let outcome = tokio::task::spawn_blocking(move || scanner.scan()).await.context("scan task failed")?;
    match outcome {
        Ok(report) => {
            print_report(&report, args.common.json)?;
            Ok(if report.is_suspicious() { ExitCode::from(1) } else { ExitCode::SUCCESS })
        }
        Err(err) => {
            eprintln!("Could not scan the ARP table: {}", err);
            Ok(ExitCode::from(2))
        }
    }
}

async fn metrics_handler(State(registry): State<Arc<RwLock<Registry>>>) -> impl IntoResponse {
    let mut buffer = String::new();
    let encoded = match registry.read() {
        Ok(registry) => encode(&mut buffer, &registry).is_ok(),
        Err(_) => false,
    };
    if !encoded {
        return (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONTENT_TYPE, "text/plain")], String::new());
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")], buffer)
}

async fn serve_metrics(addr: SocketAddr, registry: Arc<RwLock<Registry>>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {}", addr))?;
    log::info!("Serving metrics on http://{}/metrics", addr);
    let app = Router::new().route("/metrics", get(metrics_handler)).with_state(registry);
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            log::error!("Metrics server failed: {}", err);
        }
    });
    Ok(())
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    let scanner = build_scanner(&args.common);
    let metrics = ScanMetrics::new();
    let registry = Arc::new(RwLock::new(Registry::default()));
    metrics.register(&mut *registry.write().map_err(|_| anyhow!("metrics registry poisoned"))?);

    if let Some(addr) = args.bind_addr {
        serve_metrics(addr, registry.clone()).await?;
    }

    let handle = Monitor::new(scanner, args.interval.into()).spawn().context("failed to start monitor thread")?;
    let running = handle.running();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, stopping after the current scan");
            running.store(false, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let json = args.common.json;
    tokio::task::spawn_blocking(move || -> Result<()> {
        // Ends once the worker exits and drops its sender
        for event in handle.events().iter() {
            match event {
                ScanEvent::Completed(report) => {
                    metrics.record_scan(&report);
                    print_report(&report, json)?;
                }
                ScanEvent::Failed(err) => {
                    metrics.record_failure(&err);
                    eprintln!("Could not scan the ARP table: {}", err);
                }
            }
        }
        handle.join();
        Ok(())
    })
    .await
    .context("monitor consumer failed")?
}

fn init_logging() {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    pretty_env_logger::formatted_builder().parse_filters(&filters).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    log::debug!("{:?}", cli);

    let result = match cli.command {
        Command::Scan(args) => run_scan(args).await,
        Command::Watch(args) => run_watch(args).await.map(|_| ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(2)
        }
    }
}
