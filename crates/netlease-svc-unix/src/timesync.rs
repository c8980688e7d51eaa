//! NTP configuration writer
//!
//! Writes one configuration file per policy backend. ntpd has to be
//! restarted to pick up a changed file, so before writing we check
//! whether every offered server is already configured; an unchanged
//! file reports `changed = false` and the reconciler skips the restart.

use async_trait::async_trait;
use netlease_core::config::{TimeSyncBackend, TimeSyncFlavor};
use netlease_core::error::{Error, Result};
use netlease_core::traits::TimeSyncWriter;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

const NTP_DRIFT_FILE: &str = "/var/lib/ntp/ntp.drift";
const NTP_LOG_FILE: &str = "/var/log/ntp.log";

/// Time-sync configuration writer for ntpd and openntpd file formats
pub struct NtpConfWriter {
    drift_file: PathBuf,
    log_file: PathBuf,
}

impl NtpConfWriter {
    pub fn new() -> Self {
        Self {
            drift_file: PathBuf::from(NTP_DRIFT_FILE),
            log_file: PathBuf::from(NTP_LOG_FILE),
        }
    }

    /// Every `server` entry in an existing configuration file
    fn configured_servers(existing: &str) -> Vec<&str> {
        existing
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                match fields.next() {
                    Some("server") => fields.next(),
                    _ => None,
                }
            })
            .collect()
    }

    fn render(&self, backend: &TimeSyncBackend, ifname: &str, servers: &[Ipv4Addr]) -> String {
        let mut out = format!("# Generated by netlease for interface {}\n", ifname);

        if backend.flavor == TimeSyncFlavor::Ntpd {
            out.push_str("restrict default noquery notrust nomodify\n");
            out.push_str("restrict 127.0.0.1\n");
        }

        for server in servers {
            if backend.flavor == TimeSyncFlavor::Ntpd {
                out.push_str(&format!("restrict {} nomodify notrap noquery\n", server));
            }
            out.push_str(&format!("server {}\n", server));
        }

        if backend.flavor == TimeSyncFlavor::Ntpd {
            out.push_str(&format!("driftfile {}\n", self.drift_file.display()));
            out.push_str(&format!("logfile {}\n", self.log_file.display()));
        }

        out
    }
}

impl Default for NtpConfWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSyncWriter for NtpConfWriter {
    async fn write(
        &self,
        backend: &TimeSyncBackend,
        ifname: &str,
        servers: &[Ipv4Addr],
    ) -> Result<bool> {
        match tokio::fs::read_to_string(&backend.path).await {
            Ok(existing) => {
                let configured = Self::configured_servers(&existing);
                let all_present = servers
                    .iter()
                    .all(|s| configured.contains(&s.to_string().as_str()));
                if all_present {
                    debug!("{} already configured, skipping", backend.path.display());
                    return Ok(false);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::service_writer(format!(
                    "read {}: {}",
                    backend.path.display(),
                    e
                )));
            }
        }

        debug!("writing {}", backend.path.display());
        tokio::fs::write(&backend.path, self.render(backend, ifname, servers))
            .await
            .map_err(|e| {
                Error::service_writer(format!("write {}: {}", backend.path.display(), e))
            })?;
        Ok(true)
    }

    async fn restart(&self, service: &str) -> Result<()> {
        // Detached; the restart's outcome is not observed
        Command::new(service)
            .arg("restart")
            .spawn()
            .map_err(|e| Error::service_writer(format!("spawn {} restart: {}", service, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(dir: &std::path::Path, flavor: TimeSyncFlavor) -> TimeSyncBackend {
        TimeSyncBackend {
            path: dir.join("ntp.conf"),
            service: "/etc/init.d/ntpd".to_string(),
            flavor,
        }
    }

    #[test]
    fn ntpd_flavor_carries_restrict_lines() {
        let writer = NtpConfWriter::new();
        let backend = TimeSyncBackend {
            path: PathBuf::from("/etc/ntp.conf"),
            service: "/etc/init.d/ntpd".to_string(),
            flavor: TimeSyncFlavor::Ntpd,
        };
        let rendered = writer.render(&backend, "eth0", &["10.0.0.7".parse().unwrap()]);

        assert!(rendered.contains("restrict default noquery notrust nomodify\n"));
        assert!(rendered.contains("restrict 10.0.0.7 nomodify notrap noquery\n"));
        assert!(rendered.contains("server 10.0.0.7\n"));
        assert!(rendered.contains("driftfile /var/lib/ntp/ntp.drift\n"));
    }

    #[test]
    fn openntpd_flavor_is_plain_servers() {
        let writer = NtpConfWriter::new();
        let backend = TimeSyncBackend {
            path: PathBuf::from("/etc/openntpd/ntpd.conf"),
            service: "/etc/init.d/openntpd".to_string(),
            flavor: TimeSyncFlavor::OpenNtpd,
        };
        let rendered = writer.render(&backend, "eth0", &["10.0.0.7".parse().unwrap()]);

        assert!(!rendered.contains("restrict"));
        assert!(!rendered.contains("driftfile"));
        assert!(rendered.contains("server 10.0.0.7\n"));
    }

    #[tokio::test]
    async fn rewrite_skipped_when_servers_already_configured() {
        let dir = tempfile::tempdir().unwrap();
        let writer = NtpConfWriter::new();
        let backend = backend(dir.path(), TimeSyncFlavor::OpenNtpd);
        let servers = vec!["10.0.0.7".parse().unwrap()];

        assert!(writer.write(&backend, "eth0", &servers).await.unwrap());
        assert!(
            !writer.write(&backend, "eth0", &servers).await.unwrap(),
            "same server set reports unchanged"
        );

        let servers = vec!["10.0.0.7".parse().unwrap(), "10.0.0.8".parse().unwrap()];
        assert!(
            writer.write(&backend, "eth0", &servers).await.unwrap(),
            "a new server forces a rewrite"
        );
    }

    #[test]
    fn server_lines_parsed_from_existing_config() {
        let existing = "# comment\nserver 10.0.0.7\nrestrict 10.0.0.7\nserver 10.0.0.8\n";
        assert_eq!(
            NtpConfWriter::configured_servers(existing),
            vec!["10.0.0.7", "10.0.0.8"]
        );
    }
}
