//! CLI entry point for mimic.
//!
//! This binary runs the mirroring daemon in the foreground and talks to a
//! running daemon over its Unix socket.
//!
//! # Usage
//!
//! ```bash
//! mimic [OPTIONS] <COMMAND>
//!
//! # Run the daemon (foreground; background it with your service manager)
//! mimic start
//!
//! # Mirror a directory to a remote host, ignoring editor swap files
//! mimic add ./site alice@web:/srv/site --exclude '*.swp' --exclude '*~'
//!
//! # Show, remove, stop
//! mimic list
//! mimic rm ./site
//! mimic stop
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use mimic_core::{AddRequest, DaemonConfig, Destination, Request, Response, WatchOptions, WatchSummary};
use mimic_daemon::{Daemon, DaemonClient, Server, WatchRegistry};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Mirror local directories to local or remote destinations with rsync.
///
/// A daemon watches each directory and, once a burst of changes has
/// settled, runs a single transfer to bring the destination up to date.
#[derive(Parser)]
#[command(name = "mimic", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Daemon configuration file (JSON).
    #[arg(short, long, global = true, env = "MIMIC_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Path of the daemon's control socket.
    #[arg(long, global = true, env = "MIMIC_SOCKET")]
    socket: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground.
    Start {
        /// Default settle interval in milliseconds.
        #[arg(long, env = "MIMIC_SETTLE_MS")]
        settle_ms: Option<u64>,

        /// Program used to transfer files.
        #[arg(long, env = "MIMIC_RSYNC")]
        rsync_path: Option<String>,

        /// Program used for pooled connections.
        #[arg(long, env = "MIMIC_SSH")]
        ssh_path: Option<String>,

        /// Directory for ssh control sockets.
        #[arg(long, env = "MIMIC_CONTROL_DIR")]
        control_dir: Option<Utf8PathBuf>,
    },

    /// Stop the running daemon.
    Stop,

    /// Start mirroring a directory.
    Add {
        /// Directory to watch.
        source: Utf8PathBuf,

        /// Destination in rsync format (`path` or `[user@]host:path`).
        destination: String,

        /// Delete files on the destination that no longer exist locally.
        #[arg(long)]
        delete: bool,

        /// Do not keep a shared connection open to the destination host.
        #[arg(long)]
        no_maintain: bool,

        /// Do not watch directories created after the watch is added.
        #[arg(long)]
        no_autoadd: bool,

        /// Watch and transfer only the top level of the directory.
        #[arg(long)]
        no_recurse: bool,

        /// Ignore changes to, and skip transferring, files matching a glob.
        #[arg(short, long = "exclude", value_name = "PATTERN")]
        exclude: Vec<String>,

        /// Settle interval for this watch in milliseconds.
        #[arg(long)]
        settle_ms: Option<u64>,
    },

    /// Stop mirroring a directory.
    Rm {
        /// Directory being watched.
        source: Utf8PathBuf,
    },

    /// List active watches.
    List,

    /// Check that the daemon is running.
    Ping,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
///
/// # Arguments
///
/// * `verbose` - Enable debug-level logging
/// * `no_color` - Disable ANSI colors in output
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Builds the daemon configuration: file (if any), then flags and environment.
///
/// # Errors
///
/// Returns an error if the config file cannot be loaded or the result is
/// invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)
            .wrap_err_with(|| format!("Failed to load config from {path}"))?,
        None => DaemonConfig::default(),
    };

    if let Some(socket) = &cli.socket {
        config.socket_path.clone_from(socket);
    }

    if let Commands::Start {
        settle_ms,
        rsync_path,
        ssh_path,
        control_dir,
    } = &cli.command
    {
        if let Some(settle_ms) = settle_ms {
            config.settle_ms = *settle_ms;
        }
        if let Some(rsync_path) = rsync_path {
            config.rsync_path.clone_from(rsync_path);
        }
        if let Some(ssh_path) = ssh_path {
            config.ssh_path.clone_from(ssh_path);
        }
        if let Some(control_dir) = control_dir {
            config.control_dir.clone_from(control_dir);
        }
    }

    config.validate()?;
    Ok(config)
}

/// Resolves a path against the working directory.
fn absolute(path: &Utf8Path) -> color_eyre::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)
        .map_err(|e| eyre!("Working directory is not valid UTF-8: {}", e.into_path_buf().display()))?;
    Ok(cwd.join(path))
}

/// Makes a local destination absolute; remote destinations pass through.
fn resolve_destination(raw: &str) -> color_eyre::Result<Destination> {
    let destination = Destination::new(raw)?;
    if destination.is_remote() {
        return Ok(destination);
    }
    let path = absolute(Utf8Path::new(raw))?;
    Ok(Destination::new(path.into_string())?)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs the daemon until it is told to stop.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound, including when another
/// daemon is already running.
async fn run_start(config: DaemonConfig) -> color_eyre::Result<()> {
    info!(
        socket = %config.socket_path,
        settle_ms = config.settle_ms,
        rsync = %config.rsync_path,
        "Starting mimic daemon"
    );

    let socket = config.socket_path.clone();
    let daemon = Arc::new(Daemon::new(Arc::new(WatchRegistry::new(config))));
    let server = Server::bind(&socket, Arc::clone(&daemon))?;

    // Signals become an orderly shutdown so pooled masters and the socket
    // file are cleaned up.
    let signals = {
        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Received termination signal, shutting down");
            daemon.request_shutdown();
        })
    };

    server.run().await?;
    signals.abort();
    Ok(())
}

/// Resolves once SIGINT or SIGTERM is received.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Sends a request and turns error responses into errors.
async fn send(client: &DaemonClient, request: Request) -> color_eyre::Result<Response> {
    match client.request(&request).await? {
        Response::Error { message, .. } => Err(eyre!(message)),
        response => Ok(response),
    }
}

async fn run_stop(client: &DaemonClient) -> color_eyre::Result<()> {
    send(client, Request::Shutdown).await?;
    info!("Daemon shutting down");
    Ok(())
}

async fn run_add(
    client: &DaemonClient,
    source: &Utf8Path,
    destination: &str,
    options: WatchOptions,
) -> color_eyre::Result<()> {
    let request = AddRequest {
        source: absolute(source)?,
        destination: resolve_destination(destination)?,
        options,
    };
    let destination = request.destination.clone();

    if let Response::Added { source } = send(client, Request::Add(request)).await? {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{source} syncing to {destination}")?;
    }
    Ok(())
}

async fn run_rm(client: &DaemonClient, source: &Utf8Path) -> color_eyre::Result<()> {
    let source = absolute(source)?;
    send(client, Request::Remove { source }).await?;
    Ok(())
}

async fn run_list(client: &DaemonClient) -> color_eyre::Result<()> {
    let watches = client.list().await?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{}", render_watches(&watches))?;
    Ok(())
}

async fn run_ping(client: &DaemonClient) -> color_eyre::Result<()> {
    let version = client.ping().await?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "mimic {version} running on {}", client.socket_path())?;
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Renders the watch list as shown by `mimic list`.
fn render_watches(watches: &[WatchSummary]) -> String {
    use std::fmt::Write;

    let mut output = String::from("### Currently active watches ###\n");

    for watch in watches {
        let _ = write!(
            output,
            "{} syncing to {} [{}, {} runs",
            watch.source,
            watch.destination,
            watch.state.label(),
            watch.completed_runs
        );
        if watch.failed_runs > 0 {
            let _ = write!(output, ", {} failed", watch.failed_runs);
        }
        if watch.pooled {
            output.push_str(", pooled");
        }
        if !watch.alive {
            output.push_str(", NOT WATCHING");
        }
        output.push_str("]\n");
        if let Some(error) = &watch.last_error {
            let _ = writeln!(output, "    last error: {error}");
        }
    }

    output
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Resolve configuration
    let config = build_config(&cli)?;
    let client = DaemonClient::new(&config.socket_path);

    // 5. Route to appropriate command
    match cli.command {
        Commands::Start { .. } => run_start(config).await,
        Commands::Stop => run_stop(&client).await,
        Commands::Add {
            source,
            destination,
            delete,
            no_maintain,
            no_autoadd,
            no_recurse,
            exclude,
            settle_ms,
        } => {
            let options = WatchOptions {
                recursive: !no_recurse,
                auto_add: !no_autoadd,
                delete_extraneous: delete,
                maintain_connection: !no_maintain,
                exclude,
                settle_ms,
            };
            run_add(&client, &source, &destination, options).await
        }
        Commands::Rm { source } => run_rm(&client, &source).await,
        Commands::List => run_list(&client).await,
        Commands::Ping => run_ping(&client).await,
    }
}
