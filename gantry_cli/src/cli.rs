//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "gantry", version, about = "Gantry motion control CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/gantry_config.toml")]
    pub config: PathBuf,

    /// Optional height calibration CSV (strict `raw,height` header)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking strategy used when `--rt` is enabled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Leave memory unlocked
    None,
    /// Lock the pages resident right now
    Current,
    /// Lock resident pages and everything mapped later
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Real-time scheduling knobs shared by the motion subcommands.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Reduce control-loop jitter (SCHED_FIFO, CPU pinning, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Reduce control-loop jitter on supported OSes.\n\nOn Linux this requests SCHED_FIFO priority, pins the process to a single CPU, and locks process memory so page faults cannot stall a step. Usually needs elevated privileges or raised ulimits (memlock). Think twice before enabling it on a shared machine."
    )]
    pub rt: bool,

    /// SCHED_FIFO priority on Linux (1..=max, clamped)
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,

    /// Memory locking mode used with --rt
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,

    /// CPU index to pin to when --rt is enabled (Linux only)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one pick-and-place transfer, e.g. `transfer e2e4`
    Transfer {
        /// Four characters: source column/row, destination column/row
        #[arg(value_name = "MOVE")]
        mv: String,
        /// Home (raise + open jaw) before the transfer
        #[arg(long, action = ArgAction::SetTrue)]
        home_first: bool,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Raise the carriage and open the jaw
    Home {
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Run the command-session loop: poll the host link for voice ('n') or
    /// direct ('m') move requests and execute each transfer
    Serve {
        /// Host poll interval in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 50)]
        poll_ms: u64,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
}
