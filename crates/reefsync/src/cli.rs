//! Clap derive structures for the `reefsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// reefsync -- poll and drive aquarium controllers on the LAN
#[derive(Debug, Parser)]
#[command(
    name = "reefsync",
    version,
    about = "Poll and drive aquarium controllers from the command line",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "REEFSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "json", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Strings unquoted, everything else as compact JSON
    Plain,
}

/// HTTP verb for `push`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PushMethod {
    Post,
    Put,
    Patch,
    Delete,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Boot every configured device and poll until interrupted
    Watch(WatchArgs),

    /// Read a value from a device document
    Get(GetArgs),

    /// Write a value into a device document, optionally pushing it
    Set(SetArgs),

    /// Send a source's cached payload to the device
    Push(PushArgs),

    /// Trigger a device action
    Press(PressArgs),

    /// Refresh a device now and print the outcome
    Refresh(RefreshArgs),

    /// Apply the staged wave preview to the interval in force
    Wave(WaveArgs),

    /// Inspect the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only these devices (default: all)
    #[arg(long, short = 'd', value_delimiter = ',')]
    pub devices: Vec<String>,

    /// Skip the cloud account even when configured
    #[arg(long)]
    pub no_cloud: bool,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Device name from the config file
    pub device: String,

    /// Data path, e.g. `/manual#/white` or `local#/leds/kelvin`
    pub path: String,

    /// Print null instead of failing when the value is absent
    #[arg(long)]
    pub missing_ok: bool,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    pub device: String,

    pub path: String,

    /// JSON value; bare words are taken as strings
    pub value: String,

    /// Push the path's source afterwards with this verb
    #[arg(long, value_enum)]
    pub push: Option<PushMethod>,
}

#[derive(Debug, Args)]
pub struct PushArgs {
    pub device: String,

    /// Source name, e.g. `/head/1/settings`
    pub source: String,

    #[arg(long, short = 'm', value_enum, default_value = "put")]
    pub method: PushMethod,
}

#[derive(Debug, Args)]
pub struct PressArgs {
    pub device: String,

    /// Action name, e.g. `manual`, `new_roll`, `resume`, `prime`
    pub action: String,

    /// Dosing head or pump number
    #[arg(long)]
    pub head: Option<u8>,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    pub device: String,

    /// Refresh configuration sources instead of a regular tick
    #[arg(long)]
    pub config: bool,

    /// Only this source
    #[arg(long)]
    pub source: Option<String>,
}

#[derive(Debug, Args)]
pub struct WaveArgs {
    pub device: String,

    /// Go through the cloud library instead of writing to the pump
    #[arg(long)]
    pub cloud: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the loaded configuration with secrets masked
    Show,

    /// Store the cloud password (read from stdin) in the system keyring
    SetPassword {
        /// Cloud account user name
        username: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
