// src/main.rs - chamber-host binary
use std::fs::File;
use std::rc::Rc;

use chamber_rs::driver::{run_fast, run_realtime};
use chamber_rs::scheduler::{ManualClock, MonotonicClock};
use chamber_rs::{Printer, Reply, load_config};
use chamber_simulator::TraceRecorder;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Chamber heater and heat-soak host running against a simulated printer.
#[derive(Parser, Debug)]
#[command(name = "chamber-host", version)]
struct Cli {
    /// Printer configuration file.
    #[arg(long, default_value = "printer.toml")]
    config: String,

    /// Read commands from this file instead of stdin.
    #[arg(long)]
    script: Option<String>,

    /// Run the script in simulated time instead of wall-clock time.
    #[arg(long, requires = "script")]
    fast: bool,

    /// Simulated seconds after which a fast run gives up.
    #[arg(long, default_value_t = 86400.0)]
    max_time: f64,

    /// Write a CSV trace of the simulated plant.
    #[arg(long)]
    trace: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    verbose: bool,
}

fn print_reply(reply: &Reply) {
    println!("{}", reply);
}

/// Forwards command lines from `script`, or stdin when absent, until the
/// input ends or the printer loop goes away.
async fn read_commands(script: Option<String>, line_tx: mpsc::Sender<String>) {
    let reader: Box<dyn AsyncBufRead + Unpin> = match &script {
        Some(path) => match tokio::fs::File::open(path).await {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                tracing::error!("Failed to open script '{}': {}", path, e);
                return;
            }
        },
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line_tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read command input: {}", e);
                break;
            }
        }
    }
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let result = runtime.block_on(run(cli));
    // A pending stdin read holds a blocking-pool thread; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    tracing::info!("Starting chamber-host {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", cli.config);
    let config = load_config(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config, e);
        Box::new(e) as BoxError
    })?;
    tracing::info!(
        "Printer: {} ({} chamber heaters, heat soak {})",
        config.printer_name(),
        config.chamber_heater.len(),
        if config.heat_soak.is_some() { "enabled" } else { "disabled" }
    );

    let trace = match &cli.trace {
        Some(path) => {
            tracing::info!("Writing plant trace to {}", path);
            Some(TraceRecorder::new(File::create(path)?)?)
        }
        None => None,
    };

    if cli.fast {
        let Some(script) = cli.script.as_deref() else {
            return Err("--fast requires --script".into());
        };
        let clock = Rc::new(ManualClock::new(0.0));
        let mut printer = Printer::new(config, clock.clone());
        printer.attach_simulation(trace)?;
        printer.start()?;
        for line in tokio::fs::read_to_string(script).await?.lines() {
            printer.submit(line);
        }
        let result = run_fast(&mut printer, &clock, cli.max_time, print_reply);
        printer.shutdown();
        let finished = result?;
        tracing::info!("Script finished at simulated time {:.1}s", finished);
        return Ok(());
    }

    let mut printer = Printer::new(config, Rc::new(MonotonicClock::new()));
    printer.attach_simulation(trace)?;
    printer.start()?;

    let (line_tx, line_rx) = mpsc::channel::<String>(64);
    let local = LocalSet::new();
    local.spawn_local(read_commands(cli.script.clone(), line_tx));
    local
        .run_until(async move {
            run_realtime(&mut printer, line_rx, print_reply).await;
        })
        .await;
    Ok(())
}
