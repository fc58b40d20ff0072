//! Handy CLI - Command-line tool for the Handy device API
//!
//! Controls a Handy over its HTTP API: modes, speed and stroke, device
//! information, clock sync, control-file upload and synchronized playback.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use handy_client::{HandyClient, LogLevel, Mode, DEFAULT_SYNC_TRIPS};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::motion::Direction;
use crate::config::{ArgOverrides, Config};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "handy-cli")]
#[command(author, version, about = "Handy device control CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Device connection key
    #[arg(short, long, env = "HANDY_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Device API base URL
    #[arg(long, env = "HANDY_BASE_URL")]
    base_url: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "HANDY_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Command log verbosity: none, errors, responses, verbose
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the device mode
    Mode {
        /// Mode: off, automatic, position, calibration, sync (or 0-4)
        mode: Mode,

        /// Toggle between off and the given mode
        #[arg(long)]
        toggle: bool,
    },

    /// Show the current device mode
    Status,

    /// Show mode, position, speed and stroke
    Settings,

    /// Show firmware versions
    Version,

    /// Set speed (enters automatic mode)
    Speed {
        /// Speed in percent (0-100), or mm/s (0-400) with --mm
        value: f64,

        /// Interpret the value as mm/s
        #[arg(long)]
        mm: bool,
    },

    /// Step speed up or down by 10%
    StepSpeed {
        #[arg(value_enum)]
        direction: Direction,
    },

    /// Set stroke length
    Stroke {
        /// Stroke in percent (0-100), or mm (0-200) with --mm
        value: f64,

        /// Interpret the value as mm
        #[arg(long)]
        mm: bool,
    },

    /// Step stroke up or down by 10%
    StepStroke {
        #[arg(value_enum)]
        direction: Direction,
    },

    /// Estimate the server clock offset
    SyncTime {
        /// Number of round trips
        #[arg(long, default_value_t = DEFAULT_SYNC_TRIPS)]
        trips: u32,
    },

    /// Upload a control file to the hosting service
    Upload {
        /// Control file path (.csv or .funscript)
        file: PathBuf,

        /// File name to upload as
        #[arg(long)]
        name: Option<String>,

        /// Read the file as time,position pattern lines
        #[arg(long)]
        pattern: bool,

        /// Load the uploaded file onto the device
        #[arg(long)]
        prepare: bool,
    },

    /// Load a hosted control file onto the device
    Prepare {
        /// URL of the hosted control file
        url: String,

        /// File name, lets the device skip a repeated download
        #[arg(long)]
        name: Option<String>,

        /// File size in bytes
        #[arg(long)]
        size: Option<u64>,
    },

    /// Start synchronized playback
    Play {
        /// Start position in the file (ms)
        #[arg(long, default_value = "0")]
        time: u32,

        /// Synchronize the clock with this many round trips first
        #[arg(long)]
        sync_trips: Option<u32>,
    },

    /// Pause synchronized playback
    Pause,

    /// Shift playback to match on-screen content
    Offset {
        /// Offset in ms (may be negative)
        #[arg(allow_hyphen_values = true)]
        offset_ms: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(ArgOverrides {
        connection_key: cli.key.as_deref(),
        base_url: cli.base_url.as_deref(),
        output: cli.output,
        log_level: cli.log_level,
        no_color: cli.no_color,
    })?;

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if merged.log_level >= LogLevel::Responses {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    let client =
        HandyClient::with_config(merged.client_config()).context("Failed to create Handy client")?;
    let spinner = ctx.spinner(&client);

    let result = run(&cli.command, &client, &ctx).await;

    if let Some(spinner) = spinner {
        spinner.finish();
    }
    result
}

/// Execute a command
async fn run(command: &Commands, client: &HandyClient, ctx: &OutputContext) -> Result<()> {
    match command {
        Commands::Mode { mode, toggle } => commands::mode(client, *mode, *toggle, ctx).await,
        Commands::Status => commands::status(client, ctx).await,
        Commands::Settings => commands::settings(client, ctx).await,
        Commands::Version => commands::version(client, ctx).await,
        Commands::Speed { value, mm } => commands::speed(client, *value, *mm, ctx).await,
        Commands::StepSpeed { direction } => commands::step_speed(client, *direction, ctx).await,
        Commands::Stroke { value, mm } => commands::stroke(client, *value, *mm, ctx).await,
        Commands::StepStroke { direction } => commands::step_stroke(client, *direction, ctx).await,
        Commands::SyncTime { trips } => commands::sync_time(client, *trips, ctx).await,
        Commands::Upload {
            file,
            name,
            pattern,
            prepare,
        } => commands::upload(client, file, name.as_deref(), *pattern, *prepare, ctx).await,
        Commands::Prepare { url, name, size } => {
            commands::prepare(client, url, name.as_deref(), *size, ctx).await
        }
        Commands::Play { time, sync_trips } => {
            commands::play(client, *time, *sync_trips, ctx).await
        }
        Commands::Pause => commands::pause(client, ctx).await,
        Commands::Offset { offset_ms } => commands::offset(client, *offset_ms, ctx).await,
    }
}
