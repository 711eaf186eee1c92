//! Relay Board Probe
//!
//! Commissioning tool: talks to the relay board named in a junction config
//! without starting any workers.
//!
//! Usage:
//!   cargo run --bin relay-probe -- --config junction.toml status
//!   cargo run --bin relay-probe -- --config junction.toml phase GREEN_PHASE RED_PHASE RED_PED
//!   cargo run --bin relay-probe -- --config junction.toml on 7
//!   cargo run --bin relay-probe -- --config junction.toml flash --secs 10

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use junction_os::config::{JunctionConfig, RelayBackend};
use junction_os::relay::{self, channels_in, flash_standby, RelayActuator, TelnetRelay, TelnetSettings};
use junction_os::types::{Phase, SignalState};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "relay-probe")]
#[command(about = "Exercise a junction's relay board")]
struct Args {
    /// Junction config file (default: $JUNCTION_CONFIG, then ./junction.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: ProbeCommand,
}

#[derive(Subcommand, Debug)]
enum ProbeCommand {
    /// Print the energised channels (telnet only)
    Status,
    /// Energise one channel (telnet only)
    On { channel: u8 },
    /// De-energise one channel (telnet only)
    Off { channel: u8 },
    /// Write a raw 16-bit mask, e.g. 1002 (telnet only)
    Mask { hex: String },
    /// Assert a phase vector, one token per approach
    Phase {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Turn every relay off
    Reset,
    /// Flash all vehicle yellows, as in standby
    Flash {
        #[arg(long, default_value = "10")]
        secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let junction = match &args.config {
        Some(path) => JunctionConfig::load_from_file(path)?,
        None => JunctionConfig::load()?,
    };
    let cycle = junction.phase_cycle()?;
    let kinds = cycle.approach_kinds().to_vec();

    match args.command {
        ProbeCommand::Status | ProbeCommand::On { .. } | ProbeCommand::Off { .. } | ProbeCommand::Mask { .. } => {
            if junction.relay.backend != RelayBackend::Telnet {
                bail!("this command needs the telnet backend, config has {}", junction.relay.backend);
            }
            let board = TelnetRelay::connect(
                TelnetSettings::from(&junction.relay),
                junction.relay_channel_map().clone(),
                kinds,
            )
            .await?;
            let result = run_telnet(&board, args.command).await;
            board.close().await;
            result
        }
        ProbeCommand::Phase { tokens } => {
            let states: Vec<SignalState> = tokens.iter().map(|t| SignalState::from_token(t)).collect();
            if let Some(bad) = tokens.iter().zip(&states).find(|(_, s)| **s == SignalState::Unknown) {
                bail!("unknown signal token '{}'", bad.0);
            }
            let actuator = relay::connect(&junction.relay, &kinds).await?;
            let phase = Phase::new(states);
            actuator.assert_phase(&phase).await?;
            println!("asserted {phase}");
            actuator.close().await;
            Ok(())
        }
        ProbeCommand::Reset => {
            let actuator = relay::connect(&junction.relay, &kinds).await?;
            actuator.all_off().await?;
            println!("all relays off");
            actuator.close().await;
            Ok(())
        }
        ProbeCommand::Flash { secs } => {
            let actuator = relay::connect(&junction.relay, &kinds).await?;
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                ctrl_c.cancel();
            });
            flash_standby(
                actuator.as_ref(),
                &kinds,
                Duration::from_secs(secs),
                junction.loop_timing().standby_flash,
                &cancel,
            )
            .await;
            actuator.close().await;
            Ok(())
        }
    }
}

async fn run_telnet(board: &TelnetRelay, command: ProbeCommand) -> Result<()> {
    match command {
        ProbeCommand::Status => {
            let on = board.status().await?;
            println!("energised channels: {:?}", on);
        }
        ProbeCommand::On { channel } => board.relay_on(channel).await?,
        ProbeCommand::Off { channel } => board.relay_off(channel).await?,
        ProbeCommand::Mask { hex } => {
            let mask = u16::from_str_radix(hex.trim_start_matches("0x"), 16)
                .with_context(|| format!("'{hex}' is not a 16-bit hex mask"))?;
            board.write_mask(mask).await?;
            println!("wrote {:04X} (channels {:?})", mask, channels_in(mask));
        }
        _ => {}
    }
    Ok(())
}
