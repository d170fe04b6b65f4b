//! Frequency allocation demo CLI.
//!
//! Commands:
//! - run: spawn the allocator and a set of cycling clients, then shut down
//! - crash: kill one client's adapter mid-hold and show the reclaim

use std::path::PathBuf;

use acton_reactive::prelude::*;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use frequency_kernel::actors::allocator;
use frequency_kernel::{
    Allocator, Client, ClientConfig, ClientReport, ExitReason, FrequencyConfig, PoolSnapshot,
    ShutdownCoordinator, ShutdownReport, System,
};

#[derive(Parser)]
#[command(name = "frequency-demo")]
#[command(version)]
#[command(about = "Failure-aware frequency allocation demo")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(long, env = "FREQUENCY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run clients against the allocator, then shut everything down
    Run {
        /// Number of clients
        #[arg(long, default_value = "3")]
        clients: usize,

        /// How long to let the clients cycle (milliseconds)
        #[arg(long, default_value = "1000")]
        duration_ms: u64,
    },

    /// Kill one client's adapter while it holds a frequency
    Crash {
        /// How long to wait before the kill (milliseconds)
        #[arg(long, default_value = "200")]
        duration_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => FrequencyConfig::from_json_file(path)?,
        None => FrequencyConfig::default(),
    };

    match cli.command {
        Commands::Run {
            clients,
            duration_ms,
        } => run(config, clients, duration_ms).await,
        Commands::Crash { duration_ms } => crash(config, duration_ms).await,
    }
}

async fn run(config: FrequencyConfig, clients: usize, duration_ms: u64) -> Result<()> {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();

    let alloc = Allocator::new(config.pool.clone(), system.clone())
        .spawn(&mut runtime)
        .await?;

    let (tx, mut rx) = mpsc::channel(clients.max(1));
    for _ in 0..clients {
        Client::new(config.client.clone(), system.clone())
            .with_observer(tx.clone())
            .spawn(&mut runtime)
            .await;
    }
    drop(tx);

    info!(clients, duration_ms, "Clients running");
    tokio::time::sleep(Duration::from_millis(duration_ms)).await;

    let snapshot = allocator::inspect(&alloc.handle)
        .await
        .context("allocator stopped before shutdown")?;
    print_snapshot("Pool before shutdown", &snapshot);

    let report = ShutdownCoordinator::new(system.clone(), config.shutdown.clone())
        .run()
        .await;

    let mut reports = Vec::new();
    while reports.len() < clients {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(client_report)) => reports.push(client_report),
            _ => break,
        }
    }
    print_clients(&reports);
    print_shutdown(&report);

    let _ = runtime.shutdown_all().await;
    Ok(())
}

async fn crash(config: FrequencyConfig, duration_ms: u64) -> Result<()> {
    let mut runtime = ActonApp::launch_async().await;
    let system = System::new();

    let alloc = Allocator::new(config.pool.clone(), system.clone())
        .spawn(&mut runtime)
        .await?;

    // Long hold so the victim is certain to be holding at the kill
    let holding = ClientConfig {
        hold_ms: duration_ms.saturating_mul(10).max(1_000),
        ..config.client.clone()
    };
    let (_victim, victim_adapter) = Client::new(holding, system.clone())
        .spawn(&mut runtime)
        .await;
    Client::new(config.client.clone(), system.clone())
        .spawn(&mut runtime)
        .await;

    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    let before = allocator::inspect(&alloc.handle).await?;
    print_snapshot("Pool before kill", &before);

    info!(adapter = %victim_adapter.id, "Killing adapter");
    system
        .terminate(&victim_adapter.id, ExitReason::Killed)
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = allocator::inspect(&alloc.handle).await?;
    print_snapshot("Pool after kill", &after);

    let report = ShutdownCoordinator::new(system.clone(), config.shutdown.clone())
        .run()
        .await;
    print_shutdown(&report);

    let _ = runtime.shutdown_all().await;
    Ok(())
}

fn print_snapshot(title: &str, snapshot: &PoolSnapshot) {
    println!("\n=== {} ===", title);
    println!("Free: {:?}", snapshot.free);
    for (freq, holder) in &snapshot.assigned {
        println!("  {:>5} -> {}", freq, holder);
    }
}

fn print_clients(reports: &[ClientReport]) {
    println!("\n=== Clients ===");
    println!(
        "  {:<20} {:>7} {:>8} {:>9} {:>9} {:>6}",
        "Client", "Grants", "Denials", "Releases", "Failures", "Held"
    );
    for report in reports {
        let held = report
            .held
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:>7} {:>8} {:>9} {:>9} {:>6}",
            report.client.to_string(),
            report.stats.grants,
            report.stats.denials,
            report.stats.releases,
            report.stats.failures,
            held
        );
    }
}

fn print_shutdown(report: &ShutdownReport) {
    println!("\n=== Shutdown ===");
    println!("Allocator: {:?}", report.allocator);
    println!("Clients signalled: {}", report.clients_signalled);
    println!("Polls: {}", report.attempts);
    if report.lingering.is_empty() {
        println!("All clients and adapters terminated");
    } else {
        println!("Still live: {:?}", report.lingering);
    }
}
