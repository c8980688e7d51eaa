//! Minimal embedding example for netlease-core
//!
//! This example demonstrates using netlease-core as a library in a custom
//! application. The reconciler lifecycle is fully managed by the
//! application; OS mutations are replaced by a printing stack so the
//! example can run anywhere without touching real interfaces.

#![allow(dead_code)]

use netlease_core::config::Policy;
use netlease_core::traits::{MutationOutcome, NetworkStack};
use netlease_core::{InterfaceSession, Lease, MemorySessionStore, Reconciler, Result, Route};
use std::net::Ipv4Addr;
use tokio_stream::StreamExt;

/// Custom network stack for embedded usage
///
/// Prints every mutation instead of performing it, so the example shows
/// exactly which calls a reconciliation pass issues.
struct PrintingStack;

#[async_trait::async_trait]
impl NetworkStack for PrintingStack {
    async fn add_address(
        &self,
        ifname: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        _broadcast: Ipv4Addr,
    ) -> Result<MutationOutcome> {
        println!("[Embedded] add address {}/{} on {}", address, netmask, ifname);
        Ok(MutationOutcome::Applied)
    }

    async fn del_address(&self, ifname: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Result<()> {
        println!("[Embedded] del address {}/{} on {}", address, netmask, ifname);
        Ok(())
    }

    async fn add_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<MutationOutcome> {
        println!("[Embedded] add route {} metric {} on {}", route, metric, ifname);
        Ok(MutationOutcome::Applied)
    }

    async fn del_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<()> {
        println!("[Embedded] del route {} metric {} on {}", route, metric, ifname);
        Ok(())
    }

    async fn set_mtu(&self, ifname: &str, mtu: u32) -> Result<()> {
        println!("[Embedded] set MTU {} on {}", mtu, ifname);
        Ok(())
    }
}

fn offered_lease(address: &str) -> Lease {
    let mut lease = Lease::released();
    lease.address = address.parse().unwrap();
    lease.netmask = "255.255.255.0".parse().unwrap();
    lease.broadcast = "10.0.0.255".parse().unwrap();
    lease.routes = vec![Route::new(
        Ipv4Addr::UNSPECIFIED,
        Ipv4Addr::UNSPECIFIED,
        "10.0.0.1".parse().unwrap(),
    )];
    lease.dns_servers = vec!["10.0.0.1".parse().unwrap()];
    lease.lease_time = 3600;
    lease
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== netlease-core Embedded Usage Example ===\n");

    // Hooks and info export are disabled: this example only shows the
    // OS-mutation sequencing
    let policy = Policy::new().with_hook_script(None).with_info_file(None);

    let (reconciler, events) = Reconciler::new(
        Box::new(PrintingStack),
        Box::new(MemorySessionStore::new()),
        policy,
    )?;

    // Surface reconciler events alongside the printed mutations
    let event_task = tokio::spawn(async move {
        let mut events = tokio_stream::wrappers::ReceiverStream::new(events);
        while let Some(event) = events.next().await {
            println!("[Event] {:?}", event);
        }
    });

    let mut session = InterfaceSession::new("demo0", vec![0x02, 0, 0, 0, 0, 1], 1500);

    println!("--- first lease: 10.0.0.5/24 ---");
    let transition = reconciler.apply(&mut session, &offered_lease("10.0.0.5")).await?;
    println!("transition: {}\n", transition);

    println!("--- renewal of the same lease (no calls expected) ---");
    let transition = reconciler.apply(&mut session, &offered_lease("10.0.0.5")).await?;
    println!("transition: {}\n", transition);

    println!("--- renumbered lease: 10.0.0.6/24 ---");
    let transition = reconciler.apply(&mut session, &offered_lease("10.0.0.6")).await?;
    println!("transition: {}\n", transition);

    println!("--- lease released ---");
    let transition = reconciler.apply(&mut session, &Lease::released()).await?;
    println!("transition: {}\n", transition);

    drop(reconciler);
    let _ = event_task.await;

    println!("=== Example Complete ===");
    Ok(())
}
