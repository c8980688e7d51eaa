//! Per-interface reconciliation state
//!
//! An [`InterfaceSession`] carries what the reconciler knows about one
//! managed interface: its identity and the snapshot of what this system
//! last applied to it. The session is owned by the caller and handed to
//! the reconciler by mutable reference, which also enforces that no two
//! reconciliations run concurrently for the same interface.

use crate::lease::Route;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Snapshot of the state this system applied to an interface.
///
/// `routes` always reflects exactly the routes installed by us and not
/// yet removed; every future reconciliation diffs against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedState {
    /// Address last installed
    pub address: Ipv4Addr,
    /// Netmask for the address
    pub netmask: Ipv4Addr,
    /// MTU we set, if we changed it from the interface's natural value
    pub mtu: Option<u32>,
    /// Routes installed by this system, in install order
    pub routes: Vec<Route>,
    /// When this state was committed
    pub applied_at: DateTime<Utc>,
}

impl AppliedState {
    /// Create a snapshot stamped with the current time
    pub fn new(address: Ipv4Addr, netmask: Ipv4Addr, mtu: Option<u32>, routes: Vec<Route>) -> Self {
        Self {
            address,
            netmask,
            mtu,
            routes,
            applied_at: Utc::now(),
        }
    }
}

/// Mutable per-interface session state.
///
/// Created when an interface first comes under management, destroyed when
/// it is unmanaged. `applied` is `None` until the first successful
/// reconciliation and cleared again when the lease is lost.
#[derive(Debug, Clone)]
pub struct InterfaceSession {
    /// Interface name (e.g. "eth0")
    pub name: String,
    /// Hardware address of the interface
    pub hwaddr: Vec<u8>,
    /// The interface's MTU before we ever touched it; restored on release
    pub natural_mtu: u32,
    /// What this system last applied, if anything
    pub applied: Option<AppliedState>,
}

impl InterfaceSession {
    /// Create a session for a freshly managed interface
    pub fn new(name: impl Into<String>, hwaddr: Vec<u8>, natural_mtu: u32) -> Self {
        Self {
            name: name.into(),
            hwaddr,
            natural_mtu,
            applied: None,
        }
    }

    /// Create a session resuming from a persisted snapshot
    pub fn resume(
        name: impl Into<String>,
        hwaddr: Vec<u8>,
        natural_mtu: u32,
        applied: Option<AppliedState>,
    ) -> Self {
        Self {
            name: name.into(),
            hwaddr,
            natural_mtu,
            applied,
        }
    }

    /// Hardware address formatted as colon-separated hex
    pub fn hwaddr_string(&self) -> String {
        self.hwaddr
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}
