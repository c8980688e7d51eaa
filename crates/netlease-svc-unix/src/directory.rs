//! NIS (yp.conf) writer
//!
//! Writes the directory-service configuration and applies the NIS
//! domainname. The restart is the reconciler's call; this writer only
//! reports whether the file changed.

use async_trait::async_trait;
use netlease_core::error::{Error, Result};
use netlease_core::traits::DirectoryWriter;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

const NIS_FILE: &str = "/etc/yp.conf";
const NIS_SERVICE: &str = "/etc/init.d/ypbind";

/// Directory-service configuration writer
pub struct NisConfWriter {
    path: PathBuf,
    service: String,
}

impl NisConfWriter {
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(NIS_FILE),
            service: NIS_SERVICE.to_string(),
        }
    }

    /// Override the target path and service (tests, chroots)
    pub fn with_target(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
        }
    }

    fn render(ifname: &str, domain: Option<&str>, servers: &[Ipv4Addr]) -> String {
        let mut out = format!("# Generated by netlease for interface {}\n", ifname);

        let prefix = match domain {
            Some(domain) if !servers.is_empty() => format!("domain {} server", domain),
            Some(domain) => {
                out.push_str(&format!("domain {} broadcast\n", domain));
                String::new()
            }
            None => "ypserver".to_string(),
        };

        for server in servers {
            out.push_str(&format!("{} {}\n", prefix, server));
        }

        out
    }
}

impl Default for NisConfWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply the NIS domainname. No rustix wrapper exists for this call.
#[cfg(unix)]
fn set_nis_domainname(domain: &str) -> std::io::Result<()> {
    let name = std::ffi::CString::new(domain)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let rc = unsafe { libc::setdomainname(name.as_ptr(), domain.len() as _) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_nis_domainname(_domain: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "NIS domainname is only supported on Unix",
    ))
}

#[async_trait]
impl DirectoryWriter for NisConfWriter {
    async fn write(
        &self,
        ifname: &str,
        domain: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> Result<bool> {
        let content = Self::render(ifname, domain, servers);

        if let Ok(existing) = tokio::fs::read_to_string(&self.path).await {
            if existing == content {
                debug!("{} already configured, skipping", self.path.display());
                return Ok(false);
            }
        }

        debug!("writing {}", self.path.display());
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            Error::service_writer(format!("write {}: {}", self.path.display(), e))
        })?;

        if let Some(domain) = domain {
            if let Err(e) = set_nis_domainname(domain) {
                return Err(Error::service_writer(format!(
                    "setdomainname {}: {}",
                    domain, e
                )));
            }
        }

        Ok(true)
    }

    async fn restart(&self) -> Result<()> {
        // Detached; the restart's outcome is not observed
        Command::new(&self.service)
            .arg("restart")
            .spawn()
            .map_err(|e| {
                Error::service_writer(format!("spawn {} restart: {}", self.service, e))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<Ipv4Addr> {
        vec!["10.0.0.9".parse().unwrap(), "10.0.0.10".parse().unwrap()]
    }

    #[test]
    fn domain_with_servers_uses_server_form() {
        let rendered = NisConfWriter::render("eth0", Some("lab"), &servers());
        assert!(rendered.contains("domain lab server 10.0.0.9\n"));
        assert!(rendered.contains("domain lab server 10.0.0.10\n"));
    }

    #[test]
    fn domain_without_servers_broadcasts() {
        let rendered = NisConfWriter::render("eth0", Some("lab"), &[]);
        assert!(rendered.contains("domain lab broadcast\n"));
    }

    #[test]
    fn servers_without_domain_use_ypserver_form() {
        let rendered = NisConfWriter::render("eth0", None, &servers());
        assert!(rendered.contains("ypserver 10.0.0.9\n"));
        assert!(rendered.contains("ypserver 10.0.0.10\n"));
    }
}
