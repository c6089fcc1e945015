//! `gantry` binary: config loading, logging bring-up, and subcommand
//! dispatch over the motion library.

mod cli;
mod error_fmt;
mod rig;
mod rt;
mod serve;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use gantry_config::Config;
use gantry_core::channel::HeightScale;
use gantry_core::grid::MoveCommand;
use gantry_core::session::{HostSession, VoiceLink};
use gantry_traits::clock::{Clock, MonotonicClock};

use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if cli::JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", error_fmt::format_error_json(&err));
            } else {
                eprintln!("Error: {}", error_fmt::humanize(&err));
            }
            u8::try_from(error_fmt::exit_code_for_error(&err))
                .map(ExitCode::from)
                .unwrap_or(ExitCode::FAILURE)
        }
    }
}

fn run() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();
    let _ = cli::JSON_MODE.set(args.json);

    let (cfg, cfg_defaulted) = load_config(&args.config)?;
    init_logging(&args, &cfg.logging);
    if cfg_defaulted {
        tracing::warn!(path = %args.config.display(), "config file not found; using built-in defaults");
    }
    cfg.validate().wrap_err("config validation failed")?;
    let scale = height_scale(&args, &cfg)?;

    let halt = Arc::new(AtomicBool::new(false));
    {
        let halt = halt.clone();
        ctrlc::set_handler(move || halt.store(true, Ordering::Relaxed))
            .wrap_err("installing Ctrl-C handler")?;
    }

    match args.cmd {
        Commands::Transfer { mv, home_first, rt } => {
            rt::setup_rt_once(&rt);
            let mv: MoveCommand = mv.parse()?;
            let mut gantry = rig::build_gantry(&cfg, scale, halt.clone())?;
            if home_first {
                gantry.home()?;
            }
            gantry.transfer(&mv)?;
            report_pose("transfer complete", &gantry.pose(), args.json);
            Ok(())
        }
        Commands::Home { rt } => {
            rt::setup_rt_once(&rt);
            let mut gantry = rig::build_gantry(&cfg, scale, halt.clone())?;
            gantry.home()?;
            report_pose("home complete", &gantry.pose(), args.json);
            Ok(())
        }
        Commands::Serve { poll_ms, rt } => {
            rt::setup_rt_once(&rt);
            let mut gantry = rig::build_gantry(&cfg, scale, halt.clone())?;
            serve_session(&mut gantry, &cfg, &halt, poll_ms)
        }
        Commands::SelfCheck => {
            let gantry = rig::build_gantry(&cfg, scale, halt)?;
            // Let the sampler complete a few passes before reading the pose.
            std::thread::sleep(std::time::Duration::from_millis(3 * cfg.sampler.period_ms.max(1)));
            report_pose("self-check ok", &gantry.pose(), args.json);
            Ok(())
        }
    }
}

/// Read and parse the TOML config. A missing file falls back to the built-in
/// defaults; any other read or parse failure is an error.
fn load_config(path: &Path) -> Result<(Config, bool)> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let cfg = gantry_config::load_toml(&text)
                .wrap_err_with(|| format!("parsing config {}", path.display()))?;
            Ok((cfg, false))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((Config::default(), true)),
        Err(e) => Err(e).wrap_err_with(|| format!("reading config {}", path.display())),
    }
}

/// Console logs go to stderr (stdout carries the host protocol in `serve`);
/// an optional JSON-lines file layer follows `[logging]`.
fn init_logging(args: &Cli, logging: &gantry_config::Logging) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone()));

    let file_layer = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path.file_name().unwrap_or(std::ffi::OsStr::new("gantry.log"));
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = cli::FILE_GUARD.set(guard);
        let file_filter = EnvFilter::new(
            logging.level.clone().unwrap_or_else(|| args.log_level.clone()),
        );
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(file_filter)
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if args.json {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// A calibration CSV on the command line wins over the persisted
/// `[calibration]` table; with neither, raw sensor units pass through.
fn height_scale(args: &Cli, cfg: &Config) -> Result<HeightScale> {
    if let Some(path) = &args.calibration {
        let cal = gantry_config::load_calibration_csv(path)
            .wrap_err_with(|| format!("loading calibration {}", path.display()))?;
        return Ok(HeightScale::from(&cal));
    }
    if let Some(persisted) = &cfg.calibration {
        return Ok(HeightScale::from(persisted));
    }
    Ok(HeightScale::default())
}

fn report_pose(label: &str, pose: &gantry_core::sampler::PoseSnapshot, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": label,
                "x1": pose.x1,
                "x2": pose.x2,
                "y": pose.y,
                "height": pose.height,
            })
        );
    } else {
        println!(
            "{label}: x1={} x2={} y={} height={:.3}",
            pose.x1, pose.x2, pose.y, pose.height
        );
    }
}

/// Pick the session links for `serve`. With the `hardware` feature the host
/// and voice peripherals come from `[session]` serial devices; otherwise the
/// host speaks over stdio and voice requests are rejected.
fn serve_session(
    gantry: &mut gantry_core::orchestrator::Gantry,
    cfg: &Config,
    halt: &Arc<AtomicBool>,
    poll_ms: u64,
) -> Result<()> {
    let session_cfg: gantry_core::config::SessionCfg = (&cfg.session).into();
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut indicator = gantry_hardware::LogIndicator;

    #[cfg(feature = "hardware")]
    {
        use gantry_hardware::serial::UartLink;
        let voice = match &cfg.session.voice_device {
            Some(dev) => Some(VoiceLink::new(
                UartLink::open(dev, cfg.session.baud_rate)
                    .wrap_err_with(|| format!("opening voice device {dev}"))?,
                session_cfg.clone(),
                clock.clone(),
            )),
            None => None,
        };
        if let Some(dev) = &cfg.session.host_device {
            let host = HostSession::new(
                UartLink::open(dev, cfg.session.baud_rate)
                    .wrap_err_with(|| format!("opening host device {dev}"))?,
                session_cfg,
                clock,
            );
            return serve::run(gantry, host, voice, &mut indicator, halt, poll_ms);
        }
        let host = HostSession::new(serve::StdioLink::spawn(), session_cfg, clock);
        return serve::run(gantry, host, voice, &mut indicator, halt, poll_ms);
    }

    #[cfg(not(feature = "hardware"))]
    {
        let host = HostSession::new(serve::StdioLink::spawn(), session_cfg, clock);
        let voice: Option<VoiceLink<serve::StdioLink>> = None;
        serve::run(gantry, host, voice, &mut indicator, halt, poll_ms)
    }
}
