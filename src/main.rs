use clap::{Parser, ValueEnum};
use std::{process::ExitCode, time::Duration};
use tracing::error;
use tracing_subscriber::EnvFilter;

use treadctl::{
    display,
    repl::{stop_machine, Repl},
    AddressCache, ConnectionParams, FtmsDevice, Result,
};

/// Control FTMS fitness machines over Bluetooth Low Energy
///
/// Without flags an interactive shell starts. With a flag, treadctl
/// auto-connects, performs that one action, disconnects, and exits with a
/// status reflecting success.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Start or resume the belt
    #[arg(long)]
    start: bool,

    /// Resume a paused belt (alias for --start)
    #[arg(long)]
    resume: bool,

    /// Pause the belt
    #[arg(long)]
    pause: bool,

    /// Stop the belt (pauses first if running)
    #[arg(long)]
    stop: bool,

    /// Show current telemetry
    #[arg(long)]
    status: bool,

    /// Set the target speed in km/h
    #[arg(long, value_name = "KMH")]
    speed: Option<f32>,

    /// Request a machine mode
    #[arg(long, value_enum, value_name = "MODE")]
    mode: Option<Mode>,

    /// Clear the cached device address
    #[arg(long)]
    clear_cache: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Read-only: show telemetry (same as --status)
    Status,
    /// Enter manual mode (quick start)
    Manual,
}

/// One action per invocation
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Start,
    Pause,
    Stop,
    Status,
    Speed(f32),
    ClearCache,
}

impl Cli {
    /// Collect the requested actions; more than one is a usage error
    fn actions(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.start || self.resume {
            actions.push(Action::Start);
        }
        if self.pause {
            actions.push(Action::Pause);
        }
        if self.stop {
            actions.push(Action::Stop);
        }
        if self.status {
            actions.push(Action::Status);
        }
        if let Some(speed) = self.speed {
            actions.push(Action::Speed(speed));
        }
        match self.mode {
            Some(Mode::Status) => actions.push(Action::Status),
            Some(Mode::Manual) => actions.push(Action::Start),
            None => {}
        }
        if self.clear_cache {
            actions.push(Action::ClearCache);
        }
        actions.dedup();
        actions
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let actions = cli.actions();

    if actions.len() > 1 {
        eprintln!("Error: only one command can be specified at a time");
        return ExitCode::from(2);
    }

    let outcome = match actions.into_iter().next() {
        None => run_repl().await,
        Some(action) => run_action(action).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", display::error_line(&e.to_string()));
            ExitCode::FAILURE
        }
    }
}

async fn run_repl() -> Result<()> {
    let cache = AddressCache::open_default()?;
    Repl::new(cache, ConnectionParams::default()).run().await
}

async fn run_action(action: Action) -> Result<()> {
    let cache = AddressCache::open_default()?;

    if action == Action::ClearCache {
        cache.clear()?;
        println!("{}", display::info_line("Cleared cached device address"));
        return Ok(());
    }

    println!("{}", display::info_line("Connecting to device..."));
    let device = FtmsDevice::connect(&cache, ConnectionParams::default()).await?;

    let result = perform(&device, action).await;

    // Always try to leave the connection closed, even after a failure.
    if let Err(e) = device.disconnect().await {
        error!("Disconnect failed: {}", e);
    }

    result
}

async fn perform(device: &FtmsDevice, action: Action) -> Result<()> {
    match action {
        Action::Start => {
            device.start_resume().await?;
            println!("{}", display::info_line("start succeeded"));
        }
        Action::Pause => {
            device.pause().await?;
            println!("{}", display::info_line("pause succeeded"));
        }
        Action::Stop => {
            stop_machine(device).await?;
        }
        Action::Status => {
            // Let the first telemetry notifications land before printing.
            tokio::time::sleep(Duration::from_secs(1)).await;
            println!("{}", display::status_table(&device.status().await));
        }
        Action::Speed(speed) => {
            device.set_speed(speed).await?;
            println!(
                "{}",
                display::info_line(&format!("Speed set to {speed:.1} km/h"))
            );
        }
        Action::ClearCache => unreachable!("handled before connecting"),
    }
    Ok(())
}
