//! busmon - passive D-Bus traffic monitor
//!
//! Attaches to the session or system bus as a monitor and prints every
//! message with its resolved sender and destination.
//!
//! # Usage
//!
//! ```bash
//! # Watch the session bus
//! busmon
//!
//! # Watch the system bus, one JSON object per line
//! busmon --bus system --json
//!
//! # Verbose startup dump of the name snapshot
//! BUSMON_DEBUG=1 RUST_LOG=busmon_core=debug busmon
//! ```

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use busmon_core::{BusScope, MessageHistory, MonitoredMessage, PeerIdentity, TracingDiagnostics};
use busmon_engine::transport::DbusConnector;
use busmon_engine::{MonitorConfig, MonitorEvent, SessionController};

/// Log filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "busmon=info,busmon_core=info,busmon_engine=info";

/// busmon - passive D-Bus traffic monitor
#[derive(Parser, Debug)]
#[command(name = "busmon", version, about)]
struct Args {
    /// Bus to monitor: session or system
    #[arg(long, value_name = "BUS", conflicts_with_all = ["system", "session"])]
    bus: Option<BusScope>,

    /// Monitor the system bus
    #[arg(long, conflicts_with = "session")]
    system: bool,

    /// Monitor the session bus (default)
    #[arg(long)]
    session: bool,

    /// Print one JSON object per message
    #[arg(long)]
    json: bool,

    /// Configuration file (default: $XDG_CONFIG_HOME/busmon/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of messages kept for matching replies to calls
    #[arg(long, value_name = "N", default_value_t = 1000)]
    history: usize,

    /// Do not resolve executable paths of peers
    #[arg(long)]
    no_exe: bool,
}

impl Args {
    fn scope(&self) -> BusScope {
        match self.bus {
            Some(scope) => scope,
            None if self.system => BusScope::System,
            None => BusScope::Session,
        }
    }
}

/// Builds the log filter from `RUST_LOG`, falling back to the defaults.
fn log_filter(spec: Option<&str>) -> EnvFilter {
    spec.filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match MonitorConfig::default_path() {
            Some(path) => MonitorConfig::load_or_default(&path)
                .context("Failed to load config")?,
            None => MonitorConfig::default(),
        },
    };

    let mut config = config.with_env();
    if args.no_exe {
        config.resolve_executables = false;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(log_filter(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    let config = load_config(&args)?;
    let scope = args.scope();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bus = %scope,
        "busmon starting"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut controller = SessionController::new(
        Arc::new(DbusConnector::new()),
        config,
        Arc::new(tx),
        TracingDiagnostics::shared("busmon"),
    );

    if let Err(e) = controller.try_start(scope) {
        error!(error = %e, bus = %scope, "Failed to start monitor");
        eprintln!("busmon: {e}");
        process::exit(1);
    }

    let mut printer = Printer::new(args.json, args.history);
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(MonitorEvent::Message(msg)) => {
                    if let Err(e) = printer.print(*msg) {
                        // Reader went away (e.g. `busmon | head`)
                        if e.kind() != io::ErrorKind::BrokenPipe {
                            warn!(error = %e, "Failed to write message");
                        }
                        break;
                    }
                }
                Some(MonitorEvent::Disconnected) => {
                    warn!("Bus disconnected");
                }
                Some(MonitorEvent::ActiveChanged(false)) | None => break,
                Some(MonitorEvent::ActiveChanged(true)) => {}
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "Error waiting for shutdown signal");
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    tokio::task::block_in_place(|| controller.request_stop());
    info!(messages = printer.printed, "busmon stopped");
    Ok(())
}

/// Writes messages to stdout, pairing replies with their calls.
struct Printer {
    json: bool,
    history: MessageHistory,
    printed: u64,
}

impl Printer {
    fn new(json: bool, capacity: usize) -> Self {
        Self {
            json,
            history: MessageHistory::bounded(capacity),
            printed: 0,
        }
    }

    fn print(&mut self, msg: MonitoredMessage) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_message(&mut out, &msg)?;
        out.flush()?;

        self.printed += 1;
        self.history.push(msg);
        Ok(())
    }

    fn write_message(&self, out: &mut impl Write, msg: &MonitoredMessage) -> io::Result<()> {
        if self.json {
            serde_json::to_writer(&mut *out, msg)
                .map_err(io::Error::other)?;
            return writeln!(out);
        }

        write!(out, "{msg}")?;
        if let Some(member) = self
            .history
            .call_for(msg)
            .and_then(MonitoredMessage::member)
        {
            write!(out, " (reply to {member})")?;
        }
        writeln!(out)?;
        write_peer_details(out, "sender", &msg.sender)?;
        write_peer_details(out, "destination", &msg.destination)?;
        if let Some(arguments) = &msg.arguments {
            writeln!(out, "    {arguments}")?;
        }
        Ok(())
    }
}

/// Writes what is known about `peer` beyond its label, if anything.
fn write_peer_details(out: &mut impl Write, role: &str, peer: &PeerIdentity) -> io::Result<()> {
    if peer.is_unknown() || (peer.names.is_empty() && peer.pid == 0) {
        return Ok(());
    }
    write!(out, "    {role} {}", peer.address)?;
    if !peer.names.is_empty() {
        write!(out, " names={}", peer.names.join(","))?;
    }
    if peer.pid > 0 {
        write!(out, " pid={}", peer.pid)?;
    }
    if !peer.exe.is_empty() {
        write!(out, " exe={}", peer.exe)?;
    }
    writeln!(out)
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
