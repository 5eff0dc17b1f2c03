//! Interactive shell: prompt, dispatch, and the live telemetry view.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::debug;

use crate::{
    cache::AddressCache,
    commands::{self, CommandAction},
    device::FtmsDevice,
    display,
    error::{Result, TreadctlError},
    types::{ConnectionParams, TrainingState},
};

/// Interactive REPL over stdin/stdout
pub struct Repl {
    device: Option<FtmsDevice>,
    cache: AddressCache,
    params: ConnectionParams,
}

impl Repl {
    /// Create a shell that connects through `cache` with `params`
    #[must_use]
    pub fn new(cache: AddressCache, params: ConnectionParams) -> Self {
        Self {
            device: None,
            cache,
            params,
        }
    }

    /// Run the shell until `quit` or end of input
    ///
    /// # Errors
    ///
    /// Returns [`TreadctlError::Io`] if stdin/stdout fail; command errors
    /// are printed inline and never abort the loop.
    pub async fn run(&mut self) -> Result<()> {
        println!("{}", display::banner());

        // Auto-connect on startup, same as the one-shot CLI commands do.
        println!("{}", display::info_line("Connecting to FTMS device..."));
        match FtmsDevice::connect(&self.cache, self.params.clone()).await {
            Ok(device) => {
                println!(
                    "{}",
                    display::info_line(&format!("Connected to {}", device.info().name))
                );
                self.device = Some(device);
            }
            Err(e) => {
                println!(
                    "{}",
                    display::info_line(&format!(
                        "Could not connect ({e}). Use 'connect' to retry."
                    ))
                );
            }
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.print_prompt().await?;
            let Some(line) = lines.next_line().await? else {
                // End of input (Ctrl+D) behaves like quit.
                println!();
                self.quit().await;
                return Ok(());
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.dispatch(line, &mut lines).await {
                return Ok(());
            }
        }
    }

    async fn print_prompt(&self) -> Result<()> {
        let prompt = match &self.device {
            Some(device) => format!("[{}] > ", device.info().name),
            None => "[disconnected] > ".to_string(),
        };
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    /// Parse and run one input line; returns true when the shell should exit
    async fn dispatch(&mut self, line: &str, lines: &mut Lines<BufReader<Stdin>>) -> bool {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return false;
        };
        let args: Vec<&str> = parts.collect();

        let Some(command) = commands::resolve(verb) else {
            println!(
                "{}",
                display::error_line(&format!("Unknown command: {verb}"))
            );
            println!("{}", display::help_table(commands::COMMANDS));
            return false;
        };
        debug!("Dispatching '{}' as {:?}", verb, command.action);

        let result = match command.action {
            CommandAction::Connect => self.connect().await,
            CommandAction::Disconnect => self.disconnect().await,
            CommandAction::Start => self.start().await,
            CommandAction::Stop => self.stop().await,
            CommandAction::Pause => self.pause().await,
            CommandAction::Speed => self.speed(&args).await,
            CommandAction::Status => self.status().await,
            CommandAction::Live => self.live(lines).await,
            CommandAction::Info => self.info(),
            CommandAction::Help => {
                println!("{}", display::help_table(commands::COMMANDS));
                Ok(())
            }
            CommandAction::Quit => {
                self.quit().await;
                return true;
            }
        };

        // The dispatch boundary: every handler failure becomes one line.
        if let Err(e) = result {
            println!("{}", display::error_line(&e.to_string()));
        }
        false
    }

    fn connected(&self) -> Result<&FtmsDevice> {
        self.device.as_ref().ok_or(TreadctlError::NotConnected)
    }

    async fn connect(&mut self) -> Result<()> {
        if self.device.is_some() {
            println!("{}", display::info_line("Already connected"));
            return Ok(());
        }

        println!("{}", display::info_line("Scanning for FTMS device..."));
        let device = FtmsDevice::connect(&self.cache, self.params.clone()).await?;
        println!(
            "{}",
            display::info_line(&format!(
                "Connected to {} ({})",
                device.info().name,
                device.info().address
            ))
        );
        println!("{}", display::status_table(&device.status().await));
        self.device = Some(device);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self.device.take() {
            Some(device) => {
                device.disconnect().await?;
                println!("{}", display::info_line("Disconnected"));
            }
            None => println!("{}", display::info_line("Not connected")),
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let device = self.connected()?;
        device.start_resume().await?;
        println!("{}", display::info_line("start succeeded"));

        // Give the machine a moment to report the new state.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = device.status().await;
        println!(
            "{}",
            display::info_line(&format!("Status: {}", status.state))
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let device = self.connected()?;
        stop_machine(device).await
    }

    async fn pause(&self) -> Result<()> {
        let device = self.connected()?;
        device.pause().await?;
        println!("{}", display::info_line("pause succeeded"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = device.status().await;
        println!(
            "{}",
            display::info_line(&format!("Status: {}", status.state))
        );
        Ok(())
    }

    async fn speed(&self, args: &[&str]) -> Result<()> {
        let device = self.connected()?;
        let range = device.speed_range();

        let Some(raw) = args.first() else {
            println!("{}", display::error_line("Usage: speed <km/h>"));
            println!(
                "{}",
                display::info_line(&format!("Range: {:.1}-{:.1} km/h", range.min, range.max))
            );
            return Ok(());
        };

        let speed: f32 = raw
            .parse()
            .map_err(|_| TreadctlError::InvalidParameters(format!("invalid speed: {raw}")))?;

        device.set_speed(speed).await?;
        println!(
            "{}",
            display::info_line(&format!("Speed set to {speed:.1} km/h"))
        );
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let device = self.connected()?;
        println!("{}", display::status_table(&device.status().await));
        Ok(())
    }

    async fn live(&self, lines: &mut Lines<BufReader<Stdin>>) -> Result<()> {
        let device = self.connected()?;
        println!("{}", display::info_line("Live view - press Enter to exit"));

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.params.poll_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = device.status().await;
                    println!("{}", display::status_table(&status));
                    if !device.is_connected().await {
                        println!("{}", display::info_line("Device disconnected"));
                        return Ok(());
                    }
                }
                line = lines.next_line() => {
                    // Any input line (or EOF) leaves the live view; the
                    // connection and poll state stay untouched.
                    let _ = line?;
                    println!("{}", display::info_line("Live view disabled"));
                    return Ok(());
                }
            }
        }
    }

    fn info(&self) -> Result<()> {
        let device = self.connected()?;
        println!(
            "{}",
            display::info_table(device.info(), device.speed_range())
        );
        Ok(())
    }

    async fn quit(&mut self) {
        if let Some(device) = self.device.take() {
            println!("{}", display::info_line("Disconnecting..."));
            if let Err(e) = device.disconnect().await {
                println!("{}", display::error_line(&e.to_string()));
            }
        }
        println!("Goodbye!");
    }
}

/// Stop the belt the way walking pads expect
///
/// A running pad (ManualMode) is paused first - that is what halts the
/// belt - and the Stop opcode is then attempted for machines that support
/// it, tolerating `NotSupported` from those that do not.
pub async fn stop_machine(device: &FtmsDevice) -> Result<()> {
    let status = device.status().await;
    if status.state == TrainingState::ManualMode {
        println!("{}", display::info_line("Pausing machine to stop..."));
        device.pause().await?;
        println!("{}", display::info_line("Machine stopped (paused)"));
    } else {
        println!("{}", display::info_line("Machine is already stopped"));
    }

    match device.stop().await {
        Ok(()) => {
            println!("{}", display::info_line("Stop command completed"));
            Ok(())
        }
        Err(TreadctlError::CommandRejected { .. }) => {
            // Some pads only implement pause; the belt is stopped either way.
            debug!("Stop opcode rejected after pause; belt already halted");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
