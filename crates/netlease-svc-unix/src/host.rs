//! Hostname control for Unix hosts
//!
//! Reads the current hostname from uname, sets it with sethostname, and
//! derives names from addresses with a best-effort getent lookup.

use async_trait::async_trait;
use netlease_core::error::{Error, Result};
use netlease_core::traits::HostControl;
use std::net::Ipv4Addr;
use tokio::process::Command;
use tracing::debug;

/// HostControl backed by the usual Unix interfaces
#[derive(Default)]
pub struct UnixHost;

impl UnixHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostControl for UnixHost {
    async fn hostname(&self) -> Result<String> {
        let uname = rustix::system::uname();
        Ok(uname.nodename().to_string_lossy().into_owned())
    }

    async fn set_hostname(&self, name: &str) -> Result<()> {
        rustix::system::sethostname(name.as_bytes())
            .map_err(|e| Error::Other(format!("sethostname {}: {}", name, e)))?;
        Ok(())
    }

    async fn reverse_lookup(&self, address: Ipv4Addr) -> Option<String> {
        // getent output: "<address> <name> [aliases...]"
        let output = Command::new("getent")
            .arg("hosts")
            .arg(address.to_string())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            debug!("no reverse entry for {}", address);
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let name = stdout.lines().next()?.split_whitespace().nth(1)?;
        Some(name.to_string())
    }
}
