//! Lease info export
//!
//! Writes the resolved lease as flat `KEY='value'` assignments for
//! external tooling (hook scripts source this file). Free-text fields go
//! through [`escape`] so a single-quote-delimited consumer cannot be
//! broken out of.

use crate::config::Policy;
use crate::error::Result;
use crate::lease::Lease;
use crate::session::InterfaceSession;
use std::fmt::Write as _;
use std::net::Ipv4Addr;
use std::path::Path;

/// Escape a free-text value for a single-quoted shell assignment.
///
/// The only metacharacter inside single quotes is the quote itself; each
/// one becomes `'\''` (close, literal quote, reopen).
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out
}

fn join_addresses(addresses: &[Ipv4Addr]) -> String {
    addresses
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the info file contents
pub(crate) fn render(session: &InterfaceSession, lease: &Lease, policy: &Policy) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "IPADDR='{}'", lease.address);
    let _ = writeln!(out, "NETMASK='{}'", lease.netmask);
    let _ = writeln!(out, "BROADCAST='{}'", lease.broadcast);

    if let Some(mtu) = lease.mtu {
        let _ = writeln!(out, "MTU='{}'", mtu);
    }

    if !lease.routes.is_empty() {
        let routes = lease
            .routes
            .iter()
            .map(|r| format!("{},{},{}", r.destination, r.netmask, r.gateway))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "ROUTES='{}'", routes);
    }

    if let Some(hostname) = &lease.hostname {
        let _ = writeln!(out, "HOSTNAME='{}'", escape(hostname));
    }
    if let Some(domain) = &lease.dns_domain {
        let _ = writeln!(out, "DNSDOMAIN='{}'", escape(domain));
    }
    if let Some(search) = &lease.dns_search {
        let _ = writeln!(out, "DNSSEARCH='{}'", escape(search));
    }
    if !lease.dns_servers.is_empty() {
        let _ = writeln!(out, "DNSSERVERS='{}'", join_addresses(&lease.dns_servers));
    }

    if let Some(fqdn) = &lease.fqdn {
        let _ = writeln!(out, "FQDNFLAGS='{}'", fqdn.flags);
        let _ = writeln!(out, "FQDNRCODE1='{}'", fqdn.rcode1);
        let _ = writeln!(out, "FQDNRCODE2='{}'", fqdn.rcode2);
        let _ = writeln!(out, "FQDNHOSTNAME='{}'", escape(&fqdn.name));
    }

    if !lease.ntp_servers.is_empty() {
        let _ = writeln!(out, "NTPSERVERS='{}'", join_addresses(&lease.ntp_servers));
    }

    if let Some(domain) = &lease.nis_domain {
        let _ = writeln!(out, "NISDOMAIN='{}'", escape(domain));
    }
    if !lease.nis_servers.is_empty() {
        let _ = writeln!(out, "NISSERVERS='{}'", join_addresses(&lease.nis_servers));
    }

    if let Some(root_path) = &lease.root_path {
        let _ = writeln!(out, "ROOTPATH='{}'", escape(root_path));
    }

    let _ = writeln!(out, "DHCPSID='{}'", lease.server_id);
    let _ = writeln!(
        out,
        "DHCPSNAME='{}'",
        escape(lease.server_name.as_deref().unwrap_or(""))
    );
    let _ = writeln!(out, "LEASETIME='{}'", lease.lease_time);
    let _ = writeln!(out, "RENEWALTIME='{}'", lease.renewal_time);
    let _ = writeln!(out, "REBINDTIME='{}'", lease.rebind_time);
    let _ = writeln!(out, "INTERFACE='{}'", session.name);
    let _ = writeln!(out, "CLASSID='{}'", escape(&policy.class_id));
    if policy.client_id.is_empty() {
        let _ = writeln!(out, "CLIENTID='{}'", session.hwaddr_string());
    } else {
        let _ = writeln!(out, "CLIENTID='{}'", escape(&policy.client_id));
    }
    let _ = writeln!(out, "DHCPCHADDR='{}'", session.hwaddr_string());

    out
}

/// Write the info file
pub(crate) async fn write(
    path: &Path,
    session: &InterfaceSession,
    lease: &Lease,
    policy: &Policy,
) -> Result<()> {
    tokio::fs::write(path, render(session, lease, policy)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::Route;

    fn lease() -> Lease {
        let mut lease = Lease::released();
        lease.address = "10.0.0.6".parse().unwrap();
        lease.netmask = "255.255.255.0".parse().unwrap();
        lease.broadcast = "10.0.0.255".parse().unwrap();
        lease
    }

    fn session() -> InterfaceSession {
        InterfaceSession::new("eth0", vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55], 1500)
    }

    #[test]
    fn quote_escaping_round_trip() {
        let mut lease = lease();
        lease.hostname = Some("O'Brien".to_string());

        let rendered = render(&session(), &lease, &Policy::new());
        assert!(rendered.contains("HOSTNAME='O'\\''Brien'"));
    }

    #[test]
    fn plain_values_are_untouched() {
        assert_eq!(escape("plainhost"), "plainhost");
        assert_eq!(escape(""), "");
        assert_eq!(escape("''"), "'\\'''\\''");
    }

    #[test]
    fn routes_render_as_triples() {
        let mut lease = lease();
        lease.routes = vec![
            Route::new(
                Ipv4Addr::UNSPECIFIED,
                Ipv4Addr::UNSPECIFIED,
                "10.0.0.1".parse().unwrap(),
            ),
            Route::new(
                "192.168.2.0".parse().unwrap(),
                "255.255.255.0".parse().unwrap(),
                "10.0.0.254".parse().unwrap(),
            ),
        ];

        let rendered = render(&session(), &lease, &Policy::new());
        assert!(rendered.contains(
            "ROUTES='0.0.0.0,0.0.0.0,10.0.0.1 192.168.2.0,255.255.255.0,10.0.0.254'"
        ));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let rendered = render(&session(), &lease(), &Policy::new());
        assert!(!rendered.contains("MTU="));
        assert!(!rendered.contains("ROUTES="));
        assert!(!rendered.contains("HOSTNAME="));
        assert!(!rendered.contains("NTPSERVERS="));
        assert!(rendered.contains("IPADDR='10.0.0.6'"));
        assert!(rendered.contains("INTERFACE='eth0'"));
    }

    #[test]
    fn client_id_falls_back_to_hardware_address() {
        let rendered = render(&session(), &lease(), &Policy::new());
        assert!(rendered.contains("CLIENTID='00:11:22:33:44:55'"));
        assert!(rendered.contains("DHCPCHADDR='00:11:22:33:44:55'"));

        let mut policy = Policy::new();
        policy.client_id = "client-7".to_string();
        let rendered = render(&session(), &lease(), &policy);
        assert!(rendered.contains("CLIENTID='client-7'"));
    }

    #[test]
    fn servers_are_space_joined() {
        let mut lease = lease();
        lease.dns_servers = vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()];

        let rendered = render(&session(), &lease, &Policy::new());
        assert!(rendered.contains("DNSSERVERS='10.0.0.1 10.0.0.2'"));
    }
}
