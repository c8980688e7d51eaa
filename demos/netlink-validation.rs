// # Netlink Stack Real Environment Validation Tool
//
// Validates the netlink network stack against the running kernel in a
// controlled environment.
//
// ## Usage
//
// ```bash
// # Dry-run mode (default - safe): look up the interface and parse the
// # lease document, apply nothing
// NETLEASE_INTERFACE=eth0 \
// NETLEASE_LEASE_FILE=/run/netlease/eth0.lease \
// cargo run --bin netlink_validation
//
// # Live mode (makes actual changes!)
// NETLEASE_MODE=live \
// NETLEASE_INTERFACE=eth0 \
// NETLEASE_LEASE_FILE=/run/netlease/eth0.lease \
// cargo run --bin netlink_validation
// ```
//
// ## Environment Variables
//
// Required:
// - `NETLEASE_INTERFACE`: interface to validate against
// - `NETLEASE_LEASE_FILE`: lease document to parse (and apply in live mode)
//
// Optional:
// - `NETLEASE_MODE`: "dry-run" or "live" (default: dry-run)

use netlease_core::config::Policy;
use netlease_core::{InterfaceSession, Lease, MemorySessionStore, Reconciler};
use netlease_os_netlink::NetlinkStack;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let interface = env::var("NETLEASE_INTERFACE")
        .map_err(|_| "NETLEASE_INTERFACE is required")?;
    let lease_file =
        env::var("NETLEASE_LEASE_FILE").map_err(|_| "NETLEASE_LEASE_FILE is required")?;
    let live = matches!(
        env::var("NETLEASE_MODE").as_deref(),
        Ok("live")
    );

    println!("=== Netlink Stack Validation ===");
    println!("interface:  {}", interface);
    println!("lease file: {}", lease_file);
    println!("mode:       {}", if live { "LIVE" } else { "dry-run" });
    println!();

    let stack = NetlinkStack::new().await?;
    let link = stack.link_info(&interface).await?;
    println!("link index:   {}", link.index);
    println!("hardware:     {:02x?}", link.hwaddr);
    println!("current MTU:  {}", link.mtu);
    println!();

    let content = tokio::fs::read_to_string(&lease_file).await?;
    let lease: Lease = serde_json::from_str(&content)?;
    lease.validate()?;
    println!("lease address: {}/{}", lease.address, lease.netmask);
    println!("lease routes:  {}", lease.routes.len());
    for route in &lease.routes {
        println!("  {}", route);
    }

    if !live {
        println!("\ndry-run complete; set NETLEASE_MODE=live to apply");
        return Ok(());
    }

    println!("\napplying lease to {} ...", interface);
    let policy = Policy::new().with_hook_script(None).with_info_file(None);
    let (reconciler, _events) = Reconciler::new(
        Box::new(stack),
        Box::new(MemorySessionStore::new()),
        policy,
    )?;

    let mut session = InterfaceSession::new(&interface, link.hwaddr, link.mtu);
    let transition = reconciler.apply(&mut session, &lease).await?;
    println!("applied; transition: {}", transition);

    Ok(())
}
