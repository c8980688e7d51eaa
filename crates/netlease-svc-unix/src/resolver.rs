//! resolv.conf writer
//!
//! Prefers handing the nameserver list to resolvconf(8) when the binary
//! is installed, so other sources of resolver data keep working; falls
//! back to writing resolv.conf directly. Direct writes compare against
//! the current file so an unchanged lease renewal reports `changed =
//! false`.

use async_trait::async_trait;
use netlease_core::error::{Error, Result};
use netlease_core::traits::ResolverWriter;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const RESOLVCONF_BIN: &str = "/sbin/resolvconf";
const RESOLV_FILE: &str = "/etc/resolv.conf";

/// Name-resolution configuration writer
pub struct ResolvConfWriter {
    resolvconf: PathBuf,
    resolv_file: PathBuf,
}

impl ResolvConfWriter {
    pub fn new() -> Self {
        Self {
            resolvconf: PathBuf::from(RESOLVCONF_BIN),
            resolv_file: PathBuf::from(RESOLV_FILE),
        }
    }

    /// Override the target paths (tests, chroots)
    pub fn with_paths(resolvconf: impl Into<PathBuf>, resolv_file: impl Into<PathBuf>) -> Self {
        Self {
            resolvconf: resolvconf.into(),
            resolv_file: resolv_file.into(),
        }
    }

    fn render(
        ifname: &str,
        domain: Option<&str>,
        search: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> String {
        let mut out = format!("# Generated by netlease for interface {}\n", ifname);
        if let Some(search) = search {
            out.push_str(&format!("search {}\n", search));
        } else if let Some(domain) = domain {
            out.push_str(&format!("search {}\n", domain));
        }
        for server in servers {
            out.push_str(&format!("nameserver {}\n", server));
        }
        out
    }
}

impl Default for ResolvConfWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolverWriter for ResolvConfWriter {
    async fn write(
        &self,
        ifname: &str,
        domain: Option<&str>,
        search: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> Result<bool> {
        let content = Self::render(ifname, domain, search, servers);

        if self.resolvconf.exists() {
            debug!("sending DNS information to resolvconf");
            let mut child = Command::new(&self.resolvconf)
                .arg("-a")
                .arg(ifname)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| Error::service_writer(format!("spawn resolvconf: {}", e)))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(content.as_bytes())
                    .await
                    .map_err(|e| Error::service_writer(format!("write to resolvconf: {}", e)))?;
            }
            let status = child
                .wait()
                .await
                .map_err(|e| Error::service_writer(format!("resolvconf: {}", e)))?;
            if !status.success() {
                return Err(Error::service_writer(format!(
                    "resolvconf -a {} exited with {}",
                    ifname, status
                )));
            }
            return Ok(true);
        }

        debug!("writing {}", self.resolv_file.display());
        if let Ok(existing) = tokio::fs::read_to_string(&self.resolv_file).await {
            if existing == content {
                return Ok(false);
            }
        }
        tokio::fs::write(&self.resolv_file, content)
            .await
            .map_err(|e| {
                Error::service_writer(format!("write {}: {}", self.resolv_file.display(), e))
            })?;
        Ok(true)
    }

    async fn restore(&self, ifname: &str) -> Result<()> {
        if !self.resolvconf.exists() {
            return Ok(());
        }

        debug!("removing DNS information from resolvconf");
        // Fire-and-forget; the outcome is not observed
        Command::new(&self.resolvconf)
            .arg("-d")
            .arg(ifname)
            .spawn()
            .map_err(|e| Error::service_writer(format!("spawn resolvconf -d: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_wins_over_domain() {
        let rendered = ResolvConfWriter::render(
            "eth0",
            Some("example.org"),
            Some("lab.example.org example.org"),
            &["10.0.0.1".parse().unwrap()],
        );
        assert!(rendered.contains("search lab.example.org example.org\n"));
        assert!(!rendered.contains("search example.org\n"));
        assert!(rendered.contains("nameserver 10.0.0.1\n"));
    }

    #[test]
    fn domain_used_when_no_search() {
        let rendered = ResolvConfWriter::render("eth0", Some("example.org"), None, &[]);
        assert!(rendered.contains("search example.org\n"));
    }

    #[tokio::test]
    async fn direct_write_reports_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResolvConfWriter::with_paths(
            dir.path().join("resolvconf-missing"),
            dir.path().join("resolv.conf"),
        );
        let servers = vec!["10.0.0.1".parse().unwrap()];

        let changed = writer
            .write("eth0", None, None, &servers)
            .await
            .unwrap();
        assert!(changed);

        let changed = writer
            .write("eth0", None, None, &servers)
            .await
            .unwrap();
        assert!(!changed, "identical content is reported unchanged");

        let changed = writer
            .write("eth0", Some("example.org"), None, &servers)
            .await
            .unwrap();
        assert!(changed);
    }
}
