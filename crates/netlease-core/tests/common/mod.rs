//! Test doubles and common utilities for architecture contract tests
//!
//! The mocks here record every call they receive, because call ordering
//! and call absence are part of the reconciler's contract.

use async_trait::async_trait;
use netlease_core::config::TimeSyncBackend;
use netlease_core::error::Result;
use netlease_core::lease::{Lease, Route};
use netlease_core::traits::{
    DirectoryWriter, HookRunner, HostControl, MutationOutcome, NetworkStack, ResolverWriter,
    TimeSyncWriter, Transition,
};
use netlease_core::Policy;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One recorded OS mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    AddAddress {
        ifname: String,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        broadcast: Ipv4Addr,
    },
    DelAddress {
        ifname: String,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
    },
    AddRoute {
        ifname: String,
        route: Route,
        metric: u32,
    },
    DelRoute {
        ifname: String,
        route: Route,
        metric: u32,
    },
    SetMtu {
        ifname: String,
        mtu: u32,
    },
}

/// A NetworkStack that records calls and returns scripted outcomes.
///
/// Clones share their recording and scripting state, so tests keep a
/// handle while the reconciler owns a boxed clone.
#[derive(Clone, Default)]
pub struct RecordingStack {
    calls: Arc<Mutex<Vec<StackCall>>>,
    existing_routes: Arc<Mutex<Vec<Route>>>,
    failing_routes: Arc<Mutex<Vec<Route>>>,
    fail_add_address: Arc<Mutex<bool>>,
    address_already_present: Arc<Mutex<bool>>,
    subnet_refresh: Arc<Mutex<bool>>,
}

impl RecordingStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, in order
    pub fn calls(&self) -> Vec<StackCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn add_route_calls(&self) -> Vec<Route> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StackCall::AddRoute { route, .. } => Some(route),
                _ => None,
            })
            .collect()
    }

    pub fn del_route_calls(&self) -> Vec<Route> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StackCall::DelRoute { route, .. } => Some(route),
                _ => None,
            })
            .collect()
    }

    pub fn address_call_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    StackCall::AddAddress { .. }
                        | StackCall::DelAddress { .. }
                        | StackCall::SetMtu { .. }
                )
            })
            .count()
    }

    /// Script `add_route` to report AlreadyPresent for this route
    pub fn route_already_present(&self, route: Route) {
        self.existing_routes.lock().unwrap().push(route);
    }

    /// Script `add_route` to hard-fail for this route
    pub fn route_fails(&self, route: Route) {
        self.failing_routes.lock().unwrap().push(route);
    }

    /// Script `add_address` to hard-fail
    pub fn fail_add_address(&self) {
        *self.fail_add_address.lock().unwrap() = true;
    }

    /// Script `add_address` to report AlreadyPresent
    pub fn address_already_present(&self) {
        *self.address_already_present.lock().unwrap() = true;
    }

    /// Turn on the subnet-route metric refresh capability
    pub fn enable_subnet_refresh(&self) {
        *self.subnet_refresh.lock().unwrap() = true;
    }

    fn record(&self, call: StackCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl NetworkStack for RecordingStack {
    async fn add_address(
        &self,
        ifname: &str,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        broadcast: Ipv4Addr,
    ) -> Result<MutationOutcome> {
        self.record(StackCall::AddAddress {
            ifname: ifname.to_string(),
            address,
            netmask,
            broadcast,
        });
        if *self.fail_add_address.lock().unwrap() {
            return Err(netlease_core::Error::network("address rejected"));
        }
        if *self.address_already_present.lock().unwrap() {
            return Ok(MutationOutcome::AlreadyPresent);
        }
        Ok(MutationOutcome::Applied)
    }

    async fn del_address(&self, ifname: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Result<()> {
        self.record(StackCall::DelAddress {
            ifname: ifname.to_string(),
            address,
            netmask,
        });
        Ok(())
    }

    async fn add_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<MutationOutcome> {
        self.record(StackCall::AddRoute {
            ifname: ifname.to_string(),
            route: *route,
            metric,
        });
        if self.failing_routes.lock().unwrap().contains(route) {
            return Err(netlease_core::Error::network("route rejected"));
        }
        if self.existing_routes.lock().unwrap().contains(route) {
            return Ok(MutationOutcome::AlreadyPresent);
        }
        Ok(MutationOutcome::Applied)
    }

    async fn del_route(&self, ifname: &str, route: &Route, metric: u32) -> Result<()> {
        self.record(StackCall::DelRoute {
            ifname: ifname.to_string(),
            route: *route,
            metric,
        });
        Ok(())
    }

    async fn set_mtu(&self, ifname: &str, mtu: u32) -> Result<()> {
        self.record(StackCall::SetMtu {
            ifname: ifname.to_string(),
            mtu,
        });
        Ok(())
    }

    fn wants_subnet_route_refresh(&self) -> bool {
        *self.subnet_refresh.lock().unwrap()
    }
}

/// One recorded resolver write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverWrite {
    pub ifname: String,
    pub domain: Option<String>,
    pub search: Option<String>,
    pub servers: Vec<Ipv4Addr>,
}

/// A ResolverWriter that records calls
#[derive(Clone)]
pub struct MockResolverWriter {
    writes: Arc<Mutex<Vec<ResolverWrite>>>,
    restores: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockResolverWriter {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            restores: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn writes(&self) -> Vec<ResolverWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn restores(&self) -> Vec<String> {
        self.restores.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl ResolverWriter for MockResolverWriter {
    async fn write(
        &self,
        ifname: &str,
        domain: Option<&str>,
        search: Option<&str>,
        servers: &[Ipv4Addr],
    ) -> Result<bool> {
        if *self.fail.lock().unwrap() {
            return Err(netlease_core::Error::service_writer("disk full"));
        }
        self.writes.lock().unwrap().push(ResolverWrite {
            ifname: ifname.to_string(),
            domain: domain.map(str::to_string),
            search: search.map(str::to_string),
            servers: servers.to_vec(),
        });
        Ok(true)
    }

    async fn restore(&self, ifname: &str) -> Result<()> {
        self.restores.lock().unwrap().push(ifname.to_string());
        Ok(())
    }
}

/// A TimeSyncWriter with scripted per-path change results
#[derive(Clone)]
pub struct MockTimeSyncWriter {
    writes: Arc<Mutex<Vec<PathBuf>>>,
    restarts: Arc<Mutex<Vec<String>>>,
    changed_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockTimeSyncWriter {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            restarts: Arc::new(Mutex::new(Vec::new())),
            changed_paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script a backend path to report `changed = true`
    pub fn path_changes(&self, path: impl Into<PathBuf>) {
        self.changed_paths.lock().unwrap().push(path.into());
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TimeSyncWriter for MockTimeSyncWriter {
    async fn write(
        &self,
        backend: &TimeSyncBackend,
        _ifname: &str,
        _servers: &[Ipv4Addr],
    ) -> Result<bool> {
        self.writes.lock().unwrap().push(backend.path.clone());
        Ok(self.changed_paths.lock().unwrap().contains(&backend.path))
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.restarts.lock().unwrap().push(service.to_string());
        Ok(())
    }
}

/// A DirectoryWriter with a scripted change result
#[derive(Clone)]
pub struct MockDirectoryWriter {
    writes: Arc<Mutex<usize>>,
    restarts: Arc<Mutex<usize>>,
    changed: Arc<Mutex<bool>>,
}

impl MockDirectoryWriter {
    pub fn new(changed: bool) -> Self {
        Self {
            writes: Arc::new(Mutex::new(0)),
            restarts: Arc::new(Mutex::new(0)),
            changed: Arc::new(Mutex::new(changed)),
        }
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn restart_count(&self) -> usize {
        *self.restarts.lock().unwrap()
    }
}

#[async_trait]
impl DirectoryWriter for MockDirectoryWriter {
    async fn write(
        &self,
        _ifname: &str,
        _domain: Option<&str>,
        _servers: &[Ipv4Addr],
    ) -> Result<bool> {
        *self.writes.lock().unwrap() += 1;
        Ok(*self.changed.lock().unwrap())
    }

    async fn restart(&self) -> Result<()> {
        *self.restarts.lock().unwrap() += 1;
        Ok(())
    }
}

/// A HostControl with a scripted hostname and lookup result
#[derive(Clone)]
pub struct MockHost {
    current: Arc<Mutex<String>>,
    lookup: Arc<Mutex<Option<String>>>,
    set_calls: Arc<Mutex<Vec<String>>>,
}

impl MockHost {
    pub fn new(current: &str) -> Self {
        Self {
            current: Arc::new(Mutex::new(current.to_string())),
            lookup: Arc::new(Mutex::new(None)),
            set_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn resolves_to(&self, name: &str) {
        *self.lookup.lock().unwrap() = Some(name.to_string());
    }

    pub fn set_calls(&self) -> Vec<String> {
        self.set_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostControl for MockHost {
    async fn hostname(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn set_hostname(&self, name: &str) -> Result<()> {
        self.set_calls.lock().unwrap().push(name.to_string());
        *self.current.lock().unwrap() = name.to_string();
        Ok(())
    }

    async fn reverse_lookup(&self, _address: Ipv4Addr) -> Option<String> {
        self.lookup.lock().unwrap().clone()
    }
}

/// A HookRunner that records spawns
#[derive(Clone)]
pub struct RecordingHook {
    runs: Arc<Mutex<Vec<(PathBuf, Option<PathBuf>, Transition)>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self {
            runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn runs(&self) -> Vec<(PathBuf, Option<PathBuf>, Transition)> {
        self.runs.lock().unwrap().clone()
    }
}

impl HookRunner for RecordingHook {
    fn run(&self, script: &Path, info_file: Option<&Path>, transition: Transition) -> Result<()> {
        self.runs.lock().unwrap().push((
            script.to_path_buf(),
            info_file.map(Path::to_path_buf),
            transition,
        ));
        Ok(())
    }
}

pub fn addr(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

pub fn route(dst: &str, mask: &str, gw: &str) -> Route {
    Route::new(addr(dst), addr(mask), addr(gw))
}

pub fn default_route(gw: &str) -> Route {
    Route::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, addr(gw))
}

/// A lease for 10.0.0.0/24 with the given address and routes
pub fn lease_with(address: &str, routes: Vec<Route>) -> Lease {
    let mut lease = Lease::released();
    lease.address = addr(address);
    lease.netmask = addr("255.255.255.0");
    lease.broadcast = addr("10.0.0.255");
    lease.routes = routes;
    lease.lease_time = 3600;
    lease
}

/// A policy with hooks and info export disabled, suitable for most tests
pub fn minimal_policy() -> Policy {
    Policy::new()
        .with_hook_script(None)
        .with_info_file(None)
}
