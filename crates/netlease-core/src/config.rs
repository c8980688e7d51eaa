//! Policy configuration for the reconciler
//!
//! This module defines what the reconciler is allowed to manage and how:
//! whether default routes are installed, which subsystems (MTU, DNS, NTP,
//! NIS, hostname) are under management, route metric, and the paths used
//! for the hook script and the info export.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hook script run on lease transitions unless the policy overrides it.
///
/// Absence of the default script is not an error; absence of an
/// explicitly configured one is.
pub const DEFAULT_HOOK_SCRIPT: &str = "/etc/netlease/lease-hook";

/// Smallest MTU the reconciler will accept from a lease (RFC 791 floor).
/// Lease MTUs below this are ignored and the interface's natural MTU is
/// restored instead.
pub const MTU_MIN: u32 = 576;

/// Which time-sync daemon a backend's configuration file feeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSyncFlavor {
    /// ISC ntpd: restrict lines, driftfile, logfile
    #[default]
    Ntpd,
    /// OpenNTPD: plain server lines
    OpenNtpd,
}

/// One time-sync configuration target.
///
/// A platform may carry two backends that map to the same physical
/// service; the dispatcher restarts each service identity at most once
/// per reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSyncBackend {
    /// Configuration file this backend writes
    pub path: PathBuf,
    /// Service control command restarted when the file changed
    pub service: String,
    /// File format flavor
    #[serde(default)]
    pub flavor: TimeSyncFlavor,
}

/// Reconciliation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Install routes with destination 0.0.0.0
    #[serde(default = "default_true")]
    pub install_default_route: bool,

    /// Manage the interface MTU from lease data
    #[serde(default = "default_true")]
    pub manage_mtu: bool,

    /// Regenerate name-resolution configuration
    #[serde(default = "default_true")]
    pub manage_dns: bool,

    /// Regenerate time-sync configuration
    #[serde(default)]
    pub manage_ntp: bool,

    /// Regenerate directory-service (NIS) configuration
    #[serde(default)]
    pub manage_nis: bool,

    /// Apply the lease hostname (or a derived one) to the system
    #[serde(default)]
    pub manage_hostname: bool,

    /// Metric for routes installed by this system
    #[serde(default)]
    pub route_metric: u32,

    /// Hook script run on transitions; None disables hooks entirely
    #[serde(default = "default_hook_script")]
    pub hook_script: Option<PathBuf>,

    /// Where to export the resolved lease for external tooling; None
    /// disables the export
    #[serde(default)]
    pub info_file: Option<PathBuf>,

    /// Time-sync backends written when manage_ntp is set
    #[serde(default)]
    pub time_backends: Vec<TimeSyncBackend>,

    /// Vendor class identity exported in the info file
    #[serde(default)]
    pub class_id: String,

    /// Client identity exported in the info file; the hardware address is
    /// used when empty
    #[serde(default)]
    pub client_id: String,
}

impl Policy {
    /// Create a policy with defaults
    pub fn new() -> Self {
        Self {
            install_default_route: true,
            manage_mtu: true,
            manage_dns: true,
            manage_ntp: false,
            manage_nis: false,
            manage_hostname: false,
            route_metric: 0,
            hook_script: default_hook_script(),
            info_file: None,
            time_backends: Vec::new(),
            class_id: String::new(),
            client_id: String::new(),
        }
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.manage_ntp && self.time_backends.is_empty() {
            return Err(crate::Error::config(
                "manage_ntp is set but no time backends are configured",
            ));
        }

        for backend in &self.time_backends {
            if backend.path.as_os_str().is_empty() {
                return Err(crate::Error::config("time backend with empty path"));
            }
            if backend.service.is_empty() {
                return Err(crate::Error::config(format!(
                    "time backend {} has no service",
                    backend.path.display()
                )));
            }
        }

        if let Some(script) = &self.hook_script {
            if script.as_os_str().is_empty() {
                return Err(crate::Error::config("hook script path cannot be empty"));
            }
        }

        if let Some(info) = &self.info_file {
            if info.as_os_str().is_empty() {
                return Err(crate::Error::config("info file path cannot be empty"));
            }
        }

        Ok(())
    }

    /// Set the route metric
    pub fn with_route_metric(mut self, metric: u32) -> Self {
        self.route_metric = metric;
        self
    }

    /// Set or disable the hook script
    pub fn with_hook_script(mut self, script: Option<PathBuf>) -> Self {
        self.hook_script = script;
        self
    }

    /// Set the info export path
    pub fn with_info_file(mut self, path: Option<PathBuf>) -> Self {
        self.info_file = path;
        self
    }

    /// Whether the configured hook script differs from the built-in
    /// default (absence is then worth reporting)
    pub fn hook_script_is_explicit(&self) -> bool {
        match &self.hook_script {
            Some(path) => path.as_os_str() != DEFAULT_HOOK_SCRIPT,
            None => false,
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

fn default_true() -> bool {
    true
}

fn default_hook_script() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_HOOK_SCRIPT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(Policy::new().validate().is_ok());
    }

    #[test]
    fn manage_ntp_requires_backends() {
        let mut policy = Policy::new();
        policy.manage_ntp = true;
        assert!(policy.validate().is_err());

        policy.time_backends.push(TimeSyncBackend {
            path: PathBuf::from("/etc/ntp.conf"),
            service: "/etc/init.d/ntpd".to_string(),
            flavor: TimeSyncFlavor::Ntpd,
        });
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn explicit_hook_script_detection() {
        let policy = Policy::new();
        assert!(!policy.hook_script_is_explicit());

        let policy = Policy::new().with_hook_script(Some(PathBuf::from("/usr/local/bin/hook")));
        assert!(policy.hook_script_is_explicit());

        let policy = Policy::new().with_hook_script(None);
        assert!(!policy.hook_script_is_explicit());
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: Policy = serde_json::from_str("{}").unwrap();
        assert!(policy.install_default_route);
        assert!(policy.manage_mtu);
        assert!(policy.manage_dns);
        assert!(!policy.manage_hostname);
        assert_eq!(policy.route_metric, 0);
        assert_eq!(
            policy.hook_script,
            Some(PathBuf::from(DEFAULT_HOOK_SCRIPT))
        );
    }
}
