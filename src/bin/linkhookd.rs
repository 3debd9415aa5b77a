//! networkd dispatcher daemon (linkhookd)
//!
//! Long-lived, privileged daemon that listens for link state changes
//! from systemd-networkd on the system bus and runs the hook scripts
//! configured for each state under the script directory.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (requires root)
//! sudo linkhookd
//!
//! # Re-fire hooks for the current state of every link at startup
//! sudo linkhookd --run-startup-triggers
//!
//! # Raise verbosity (repeatable), or lower it with -q
//! sudo linkhookd -vv
//! ```

use clap::Parser;
use liblinkhook::bus::LinkStateStream;
use liblinkhook::directory::{InterfaceDirectory, NetworkctlLinkSource};
use liblinkhook::dispatcher::Dispatcher;
use liblinkhook::enrich::NetworkctlEnricher;
use liblinkhook::error::LinkhookResult;
use liblinkhook::hooks::{HookSelector, ScriptHookRunner};
use liblinkhook::notify;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// networkd state-transition hook dispatcher
#[derive(Parser, Debug)]
#[command(name = "linkhookd")]
#[command(author = "linkhook contributors")]
#[command(version)]
#[command(about = "Dispatcher daemon for systemd-networkd connection status changes", long_about = None)]
struct Args {
    /// Location under which to look for <state>.d hook directories
    #[arg(short = 's', long, default_value = "/etc/networkd-dispatcher")]
    script_dir: PathBuf,

    /// Generate events for the current state of all interfaces on startup
    #[arg(short = 'T', long)]
    run_startup_triggers: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (repeatable)
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[tokio::main]
async fn main() -> LinkhookResult<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting linkhookd");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "linux")]
    {
        let uid = unsafe { libc::getuid() };
        if uid != 0 {
            warn!("Not running as root - hook ownership checks will reject all scripts");
        }
    }

    let directory = InterfaceDirectory::new(Box::new(NetworkctlLinkSource));
    let selector = HookSelector::new(&args.script_dir);
    let mut dispatcher = Dispatcher::new(
        directory,
        selector,
        Box::new(ScriptHookRunner),
        Box::new(NetworkctlEnricher),
    );

    // The daemon cannot function at all without the networkctl query;
    // this is the only fatal startup condition.
    if let Err(e) = dispatcher.rebuild().await {
        error!("Initial interface scan failed: {}", e);
        if let Err(notify_err) = notify::notify_failure("initial interface scan failed") {
            debug!("Could not report failure to supervisor: {}", notify_err);
        }
        return Err(e);
    }
    info!(
        "Interface directory populated, {} links known",
        dispatcher.directory().len()
    );

    let mut events = match LinkStateStream::connect().await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to subscribe to networkd signals: {}", e);
            if let Err(notify_err) = notify::notify_failure("bus subscription failed") {
                debug!("Could not report failure to supervisor: {}", notify_err);
            }
            return Err(e);
        }
    };
    info!("Subscribed to networkd link state signals");

    if args.run_startup_triggers {
        dispatcher.trigger_all().await;
    }

    match notify::notify_ready() {
        Ok(true) => debug!("Reported readiness to supervisor"),
        Ok(false) => {}
        Err(e) => warn!("Failed to report readiness to supervisor: {}", e),
    }
    info!("linkhookd is ready, watching {}", args.script_dir.display());

    run_event_loop(&mut dispatcher, &mut events).await;

    info!("linkhookd stopped");
    Ok(())
}

/// Serial event loop: each event is dispatched to completion
/// (including all hook executions) before the next one is taken.
async fn run_event_loop(dispatcher: &mut Dispatcher, events: &mut LinkStateStream) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to register SIGINT handler: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                event = events.next_event() => {
                    match event {
                        Some(event) => {
                            dispatcher
                                .handle_indexed_event(
                                    event.index,
                                    event.administrative_state,
                                    event.operational_state,
                                )
                                .await;
                        }
                        None => {
                            error!("Bus connection closed, shutting down");
                            break;
                        }
                    }
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
            }
        }
    }
}

/// Map -v/-q counters onto the five severity levels, defaulting to warn
fn init_logging(args: &Args) {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let base = 1i32 + args.verbose as i32 - args.quiet as i32;
    let level = LEVELS[base.clamp(0, LEVELS.len() as i32 - 1) as usize];

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("linkhookd={},liblinkhook={}", level, level))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}
