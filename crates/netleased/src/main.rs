// # netleased - Lease Reconciliation Daemon
//
// The netleased daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and platform backends
// 3. Applying the lease document to the managed interface
// 4. Re-applying on SIGHUP and releasing on shutdown
//
// The DHCP protocol itself is out of scope: a separate client negotiates
// the lease and leaves it as a JSON document; netleased converges the
// host onto it.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Interface & lease
// - `NETLEASE_INTERFACE`: interface to manage (required)
// - `NETLEASE_LEASE_FILE`: path to the lease document (required)
// - `NETLEASE_STATE_FILE`: snapshot path (default /var/lib/netlease/state.json)
//
// ### Policy
// - `NETLEASE_INSTALL_DEFAULT_ROUTE`: install 0.0.0.0 routes (default true)
// - `NETLEASE_MANAGE_MTU` / `_DNS` / `_NTP` / `_NIS` / `_HOSTNAME`
// - `NETLEASE_ROUTE_METRIC`: metric for installed routes (default 0)
// - `NETLEASE_HOOK_SCRIPT`: transition hook; empty disables hooks
// - `NETLEASE_INFO_FILE`: lease info export path; unset disables it
// - `NETLEASE_NTP_CONF` / `NETLEASE_NTP_SERVICE`: ntpd backend
// - `NETLEASE_OPENNTP_CONF` / `NETLEASE_OPENNTP_SERVICE`: openntpd backend
//
// ### Logging
// - `NETLEASE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export NETLEASE_INTERFACE=eth0
// export NETLEASE_LEASE_FILE=/run/netlease/eth0.lease
// export NETLEASE_STATE_FILE=/var/lib/netlease/state.json
// export NETLEASE_MANAGE_HOSTNAME=true
//
// netleased
// ```

use anyhow::{Context, Result};
use netlease_core::config::{Policy, TimeSyncBackend, TimeSyncFlavor};
use netlease_core::traits::SessionStore;
use netlease_core::{FileSessionStore, InterfaceSession, Lease, Reconciler};
use netlease_os_netlink::NetlinkStack;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    interface: String,
    lease_file: PathBuf,
    state_file: PathBuf,
    install_default_route: bool,
    manage_mtu: bool,
    manage_dns: bool,
    manage_ntp: bool,
    manage_nis: bool,
    manage_hostname: bool,
    route_metric: u32,
    hook_script: Option<Option<PathBuf>>,
    info_file: Option<PathBuf>,
    ntp_conf: Option<PathBuf>,
    ntp_service: String,
    openntp_conf: Option<PathBuf>,
    openntp_service: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            interface: env::var("NETLEASE_INTERFACE")
                .context("NETLEASE_INTERFACE is required")?,
            lease_file: env::var("NETLEASE_LEASE_FILE")
                .context("NETLEASE_LEASE_FILE is required")?
                .into(),
            state_file: env::var("NETLEASE_STATE_FILE")
                .unwrap_or_else(|_| "/var/lib/netlease/state.json".to_string())
                .into(),
            install_default_route: env_bool("NETLEASE_INSTALL_DEFAULT_ROUTE", true)?,
            manage_mtu: env_bool("NETLEASE_MANAGE_MTU", true)?,
            manage_dns: env_bool("NETLEASE_MANAGE_DNS", true)?,
            manage_ntp: env_bool("NETLEASE_MANAGE_NTP", false)?,
            manage_nis: env_bool("NETLEASE_MANAGE_NIS", false)?,
            manage_hostname: env_bool("NETLEASE_MANAGE_HOSTNAME", false)?,
            route_metric: match env::var("NETLEASE_ROUTE_METRIC") {
                Ok(value) => value
                    .parse()
                    .with_context(|| format!("invalid NETLEASE_ROUTE_METRIC: {}", value))?,
                Err(_) => 0,
            },
            // Unset keeps the built-in default; an empty value disables
            // hooks entirely
            hook_script: env::var("NETLEASE_HOOK_SCRIPT").ok().map(|value| {
                if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }),
            info_file: env::var("NETLEASE_INFO_FILE").ok().map(PathBuf::from),
            ntp_conf: env::var("NETLEASE_NTP_CONF").ok().map(PathBuf::from),
            ntp_service: env::var("NETLEASE_NTP_SERVICE")
                .unwrap_or_else(|_| "/etc/init.d/ntpd".to_string()),
            openntp_conf: env::var("NETLEASE_OPENNTP_CONF").ok().map(PathBuf::from),
            openntp_service: env::var("NETLEASE_OPENNTP_SERVICE")
                .unwrap_or_else(|_| "/etc/init.d/openntpd".to_string()),
            log_level: env::var("NETLEASE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            anyhow::bail!("NETLEASE_INTERFACE cannot be empty");
        }

        if !self.lease_file.exists() {
            anyhow::bail!(
                "NETLEASE_LEASE_FILE does not exist: {}",
                self.lease_file.display()
            );
        }

        if self.manage_ntp && self.ntp_conf.is_none() && self.openntp_conf.is_none() {
            anyhow::bail!(
                "NETLEASE_MANAGE_NTP is set but neither NETLEASE_NTP_CONF nor \
                NETLEASE_OPENNTP_CONF is configured"
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "NETLEASE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// The reconciliation policy this configuration describes
    fn policy(&self) -> Policy {
        let mut policy = Policy::new()
            .with_route_metric(self.route_metric)
            .with_info_file(self.info_file.clone());
        if let Some(hook_script) = &self.hook_script {
            policy = policy.with_hook_script(hook_script.clone());
        }

        policy.install_default_route = self.install_default_route;
        policy.manage_mtu = self.manage_mtu;
        policy.manage_dns = self.manage_dns;
        policy.manage_ntp = self.manage_ntp;
        policy.manage_nis = self.manage_nis;
        policy.manage_hostname = self.manage_hostname;

        if let Some(path) = &self.ntp_conf {
            policy.time_backends.push(TimeSyncBackend {
                path: path.clone(),
                service: self.ntp_service.clone(),
                flavor: TimeSyncFlavor::Ntpd,
            });
        }
        if let Some(path) = &self.openntp_conf {
            policy.time_backends.push(TimeSyncBackend {
                path: path.clone(),
                service: self.openntp_service.clone(),
                flavor: TimeSyncFlavor::OpenNtpd,
            });
        }

        policy
    }
}

/// Parse a boolean environment variable
fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => anyhow::bail!("invalid boolean for {}: {}", key, value),
        },
        Err(_) => Ok(default),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting netleased daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Which lifecycle action a received signal asks for
enum LeaseSignal {
    /// Re-read the lease document and reconcile
    Reapply,
    /// Release the lease and exit
    Shutdown,
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let network = NetlinkStack::new()
        .await
        .context("failed to open netlink")?;
    let link = network
        .link_info(&config.interface)
        .await
        .with_context(|| format!("failed to look up interface {}", config.interface))?;
    info!(
        "managing {} (index {}, natural MTU {})",
        config.interface, link.index, link.mtu
    );

    let sessions = FileSessionStore::new(&config.state_file)
        .await
        .context("failed to open session store")?;
    let resumed = sessions.load(&config.interface).await?;
    if resumed.is_some() {
        info!("resuming previously applied state for {}", config.interface);
    }
    let mut session =
        InterfaceSession::resume(&config.interface, link.hwaddr, link.mtu, resumed);

    let (reconciler, events) =
        Reconciler::new(Box::new(network), Box::new(sessions), config.policy())?;

    #[cfg(feature = "unix-services")]
    let reconciler = reconciler
        .with_resolver(Box::new(netlease_svc_unix::ResolvConfWriter::new()))
        .with_time_sync(Box::new(netlease_svc_unix::NtpConfWriter::new()))
        .with_directory(Box::new(netlease_svc_unix::NisConfWriter::new()))
        .with_host(Box::new(netlease_svc_unix::UnixHost::new()))
        .with_hooks(Box::new(netlease_svc_unix::ScriptHook::new()));

    // Surface reconciler events in the log
    tokio::spawn(async move {
        let mut events = ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            debug!("event: {:?}", event);
        }
    });

    let mut signals = Signals::new()?;

    apply_lease_file(&reconciler, &mut session, &config.lease_file).await;

    loop {
        match signals.next().await? {
            LeaseSignal::Reapply => {
                info!("SIGHUP received, re-reading lease document");
                apply_lease_file(&reconciler, &mut session, &config.lease_file).await;
            }
            LeaseSignal::Shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("releasing lease on {}", config.interface);
    reconciler.apply(&mut session, &Lease::released()).await?;

    // Flush state before exiting
    reconciler.shutdown().await?;

    Ok(())
}

/// Read the lease document and reconcile; failures keep the daemon alive
/// so the next SIGHUP can retry with a fixed document
async fn apply_lease_file(reconciler: &Reconciler, session: &mut InterfaceSession, path: &Path) {
    let lease = match read_lease(path).await {
        Ok(lease) => lease,
        Err(e) => {
            error!("failed to read lease document {}: {}", path.display(), e);
            return;
        }
    };

    match reconciler.apply(session, &lease).await {
        Ok(transition) => info!("reconciled {} ({})", session.name, transition),
        Err(e) => warn!("reconciliation of {} failed: {}", session.name, e),
    }
}

async fn read_lease(path: &Path) -> Result<Lease> {
    let content = tokio::fs::read_to_string(path).await?;
    let lease: Lease = serde_json::from_str(&content)?;
    Ok(lease)
}

/// Lifecycle signal streams (SIGHUP, SIGTERM, SIGINT), registered once
/// so nothing delivered mid-reconciliation is missed
#[cfg(unix)]
struct Signals {
    hangup: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())
                .map_err(|e| anyhow::anyhow!("failed to setup SIGHUP handler: {}", e))?,
            terminate: signal(SignalKind::terminate())
                .map_err(|e| anyhow::anyhow!("failed to setup SIGTERM handler: {}", e))?,
            interrupt: signal(SignalKind::interrupt())
                .map_err(|e| anyhow::anyhow!("failed to setup SIGINT handler: {}", e))?,
        })
    }

    async fn next(&mut self) -> Result<LeaseSignal> {
        tokio::select! {
            _ = self.hangup.recv() => Ok(LeaseSignal::Reapply),
            _ = self.terminate.recv() => Ok(LeaseSignal::Shutdown),
            _ = self.interrupt.recv() => Ok(LeaseSignal::Shutdown),
        }
    }
}

/// Fallback for non-Unix platforms: CTRL-C only
#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Result<LeaseSignal> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| anyhow::anyhow!("failed to wait for CTRL-C: {}", e))?;
        Ok(LeaseSignal::Shutdown)
    }
}
