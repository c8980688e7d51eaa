//! Lease reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Diffing the previously applied state against a newly offered lease
//! - Sequencing OS mutations so the host is never inconsistent
//! - Committing the per-interface snapshot
//! - Triggering downstream service writers and the transition hook
//!
//! ## Pass ordering
//!
//! ```text
//! released?  -> remove owned routes -> restore MTU -> remove address
//!            -> clear snapshot -> restore resolver -> hook "down"
//!
//! otherwise  -> MTU -> add new address -> delete old address
//!            -> subnet-route metric refresh
//!            -> remove stale routes -> install offered routes
//!            -> snapshot commit
//!            -> resolver / time-sync / directory writers -> hostname
//!            -> info export -> hook spawn (detached)
//! ```
//!
//! Everything after the snapshot commit is downstream: failures there are
//! logged and isolated, never fatal. The only failure that aborts a pass
//! is the new address refusing to install, because nothing downstream is
//! valid without it.

mod routes;

use crate::config::{MTU_MIN, Policy};
use crate::error::{Error, Result};
use crate::info;
use crate::lease::{Lease, Route};
use crate::session::{AppliedState, InterfaceSession};
use crate::traits::{
    DirectoryWriter, HookRunner, HostControl, MutationOutcome, NetworkStack, ResolverWriter,
    SessionStore, TimeSyncWriter, Transition,
};
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::{debug, error, info as log_info, warn};

/// Capacity of the reconciler's event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted while reconciling, for monitoring/logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// The lease address is in place on the interface
    AddressConfigured {
        interface: String,
        address: Ipv4Addr,
        netmask: Ipv4Addr,
        replaced: Option<Ipv4Addr>,
    },

    /// The interface MTU was changed
    MtuChanged { interface: String, mtu: u32 },

    /// A route from the lease was installed or adopted
    RouteInstalled { interface: String, route: Route },

    /// A previously owned route was removed
    RouteRemoved { interface: String, route: Route },

    /// A route could not be installed and was skipped
    RouteFailed {
        interface: String,
        route: Route,
        error: String,
    },

    /// A downstream service was restarted
    ServiceRestarted { service: String },

    /// The transition hook was spawned
    HookDispatched {
        interface: String,
        transition: Transition,
    },

    /// The interface lost its lease and was torn down
    LeaseReleased { interface: String },

    /// A reconciliation pass completed
    Reconciled {
        interface: String,
        transition: Transition,
    },
}

/// Core reconciliation engine
///
/// Owns the OS mutation backend, the snapshot store and the optional
/// downstream collaborators. One `apply` call handles one lease event;
/// callers drive it serially per interface (the `&mut InterfaceSession`
/// makes concurrent passes for one interface impossible to express).
pub struct Reconciler {
    /// OS mutation primitives
    network: Box<dyn NetworkStack>,

    /// Snapshot persistence
    sessions: Box<dyn SessionStore>,

    /// What we are allowed to manage, and how
    policy: Policy,

    /// Name-resolution writer, if the platform provides one
    resolver: Option<Box<dyn ResolverWriter>>,

    /// Time-sync writer
    time_sync: Option<Box<dyn TimeSyncWriter>>,

    /// Directory-service writer
    directory: Option<Box<dyn DirectoryWriter>>,

    /// Hostname control
    host: Option<Box<dyn HostControl>>,

    /// Hook spawner
    hooks: Option<Box<dyn HookRunner>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a reconciler over a network stack and snapshot store.
    ///
    /// Downstream collaborators are attached with the `with_*` methods;
    /// any left unset are simply skipped, matching platforms where the
    /// corresponding subsystem does not exist.
    ///
    /// Returns the reconciler and the receiving end of its event stream.
    pub fn new(
        network: Box<dyn NetworkStack>,
        sessions: Box<dyn SessionStore>,
        policy: Policy,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        policy.validate()?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let reconciler = Self {
            network,
            sessions,
            policy,
            resolver: None,
            time_sync: None,
            directory: None,
            host: None,
            hooks: None,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// Attach a name-resolution writer
    pub fn with_resolver(mut self, writer: Box<dyn ResolverWriter>) -> Self {
        self.resolver = Some(writer);
        self
    }

    /// Attach a time-sync writer
    pub fn with_time_sync(mut self, writer: Box<dyn TimeSyncWriter>) -> Self {
        self.time_sync = Some(writer);
        self
    }

    /// Attach a directory-service writer
    pub fn with_directory(mut self, writer: Box<dyn DirectoryWriter>) -> Self {
        self.directory = Some(writer);
        self
    }

    /// Attach hostname control
    pub fn with_host(mut self, host: Box<dyn HostControl>) -> Self {
        self.host = Some(host);
        self
    }

    /// Attach a hook runner
    pub fn with_hooks(mut self, hooks: Box<dyn HookRunner>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Flush any buffered snapshot state.
    ///
    /// Called once before the process exits; both built-in stores write
    /// through on every pass, so this only matters for buffering stores.
    pub async fn shutdown(&self) -> Result<()> {
        self.sessions.flush().await
    }

    /// Reconcile one interface against a newly offered lease.
    ///
    /// Computes the delta between `session.applied` and `lease`, executes
    /// it in a safe order, commits the snapshot and triggers downstream
    /// consumers. Returns the transition kind of the pass.
    pub async fn apply(
        &self,
        session: &mut InterfaceSession,
        lease: &Lease,
    ) -> Result<Transition> {
        if session.name.is_empty() {
            return Err(Error::invalid_lease("session has no interface name"));
        }
        lease.validate()?;

        if lease.is_released() {
            return self.tear_down(session).await;
        }

        let previous = session.applied.clone();
        let addr_changed = previous
            .as_ref()
            .map_or(true, |p| p.address != lease.address);
        let mask_changed = previous
            .as_ref()
            .map_or(true, |p| p.netmask != lease.netmask);
        // An address or netmask change invalidates every route we own:
        // structurally equal routes no longer match the new address
        // context and get re-installed below.
        let context_changed = addr_changed || mask_changed;

        let mtu = self.apply_mtu(session, lease, previous.as_ref()).await;
        self.apply_address(session, lease, previous.as_ref(), context_changed)
            .await?;

        if self.network.wants_subnet_route_refresh()
            && addr_changed
            && self.policy.route_metric > 0
            && lease.netmask != Ipv4Addr::BROADCAST
        {
            self.refresh_subnet_route(session, lease).await;
        }

        // Route removal runs on every pass: the interface may carry
        // addresses we never managed, so the routes we own may still be
        // present even when the offer looks unchanged.
        let kept: &[Route] = if context_changed { &[] } else { &lease.routes };
        self.remove_stale_routes(session, kept).await;

        let owned = self
            .install_routes(session, lease, previous.as_ref(), context_changed)
            .await;

        // Commit before anything external is spawned; the snapshot is
        // what the next pass diffs against.
        let state = AppliedState::new(lease.address, lease.netmask, mtu, owned);
        if let Err(e) = self.sessions.store(&session.name, &state).await {
            error!("failed to persist snapshot for {}: {}", session.name, e);
        }
        session.applied = Some(state);

        let transition = if context_changed {
            Transition::New
        } else {
            Transition::Up
        };

        self.dispatch_downstream(session, lease, transition).await;

        self.emit_event(ReconcileEvent::Reconciled {
            interface: session.name.clone(),
            transition,
        });

        Ok(transition)
    }

    /// Delete previously owned routes that `kept` no longer carries
    async fn remove_stale_routes(&self, session: &InterfaceSession, kept: &[Route]) {
        let Some(previous) = &session.applied else {
            return;
        };

        for route in routes::stale_routes(
            &previous.routes,
            kept,
            self.policy.install_default_route,
        ) {
            match self
                .network
                .del_route(&session.name, &route, self.policy.route_metric)
                .await
            {
                Ok(()) => {
                    debug!("removed route {} from {}", route, session.name);
                    self.emit_event(ReconcileEvent::RouteRemoved {
                        interface: session.name.clone(),
                        route,
                    });
                }
                Err(e) => {
                    warn!(
                        "failed to remove route {} from {}: {}",
                        route, session.name, e
                    );
                }
            }
        }
    }

    /// Full teardown when the lease is gone
    async fn tear_down(&self, session: &mut InterfaceSession) -> Result<Transition> {
        self.remove_stale_routes(session, &[]).await;

        let previous = session.applied.take();

        // Put the MTU back if we were the ones who moved it
        if let Some(prev) = &previous {
            if let Some(applied_mtu) = prev.mtu {
                if session.natural_mtu != 0 && applied_mtu != session.natural_mtu {
                    if let Err(e) = self
                        .network
                        .set_mtu(&session.name, session.natural_mtu)
                        .await
                    {
                        warn!("failed to restore MTU on {}: {}", session.name, e);
                    }
                }
            }
        }

        let had_address = previous
            .as_ref()
            .is_some_and(|p| !p.address.is_unspecified());

        if let Some(prev) = &previous {
            if !prev.address.is_unspecified() {
                if let Err(e) = self
                    .network
                    .del_address(&session.name, prev.address, prev.netmask)
                    .await
                {
                    warn!(
                        "failed to remove address {} from {}: {}",
                        prev.address, session.name, e
                    );
                }
            }
        }

        if let Err(e) = self.sessions.clear(&session.name).await {
            error!("failed to clear snapshot for {}: {}", session.name, e);
        }

        // Only interfaces that actually carried our address had resolver
        // state or a reason to tell the hook anything.
        if had_address {
            if let Some(resolver) = &self.resolver {
                if let Err(e) = resolver.restore(&session.name).await {
                    warn!(
                        "failed to restore resolver state for {}: {}",
                        session.name, e
                    );
                }
            }
            self.run_hook(session, Transition::Down);
        }

        self.emit_event(ReconcileEvent::LeaseReleased {
            interface: session.name.clone(),
        });

        Ok(Transition::Down)
    }

    /// Bring the interface MTU to the lease's target; returns the MTU to
    /// record in the snapshot
    async fn apply_mtu(
        &self,
        session: &InterfaceSession,
        lease: &Lease,
        previous: Option<&AppliedState>,
    ) -> Option<u32> {
        let mut recorded = previous.and_then(|p| p.mtu);

        if !self.policy.manage_mtu {
            return recorded;
        }

        // An absent or bogus lease MTU means the interface's natural one
        let target = lease
            .mtu
            .filter(|m| *m >= MTU_MIN)
            .unwrap_or(session.natural_mtu);
        let current = recorded.unwrap_or(session.natural_mtu);

        if target != 0 && target != current {
            match self.network.set_mtu(&session.name, target).await {
                Ok(()) => {
                    debug!("set MTU {} on {}", target, session.name);
                    recorded = Some(target);
                    self.emit_event(ReconcileEvent::MtuChanged {
                        interface: session.name.clone(),
                        mtu: target,
                    });
                }
                Err(e) => {
                    warn!("failed to set MTU {} on {}: {}", target, session.name, e);
                }
            }
        }

        recorded
    }

    /// Install the lease address, then retire the previous one.
    ///
    /// The new address always goes in before the old one is removed so
    /// the interface never has a window with no address at all. An
    /// unchanged address is left untouched.
    async fn apply_address(
        &self,
        session: &InterfaceSession,
        lease: &Lease,
        previous: Option<&AppliedState>,
        context_changed: bool,
    ) -> Result<()> {
        if !context_changed {
            debug!("address {} on {} unchanged", lease.address, session.name);
            return Ok(());
        }

        match self
            .network
            .add_address(&session.name, lease.address, lease.netmask, lease.broadcast)
            .await
        {
            Ok(MutationOutcome::Applied) => {
                log_info!("address {} installed on {}", lease.address, session.name);
            }
            Ok(MutationOutcome::AlreadyPresent) => {
                debug!("address {} already on {}", lease.address, session.name);
            }
            Err(e) => {
                return Err(Error::address_install(
                    lease.address,
                    lease.netmask,
                    e.to_string(),
                ));
            }
        }

        let mut replaced = None;
        if let Some(prev) = previous {
            if prev.address != lease.address && !prev.address.is_unspecified() {
                if let Err(e) = self
                    .network
                    .del_address(&session.name, prev.address, prev.netmask)
                    .await
                {
                    warn!(
                        "failed to remove old address {} from {}: {}",
                        prev.address, session.name, e
                    );
                } else {
                    replaced = Some(prev.address);
                }
            }
        }

        self.emit_event(ReconcileEvent::AddressConfigured {
            interface: session.name.clone(),
            address: lease.address,
            netmask: lease.netmask,
            replaced,
        });

        Ok(())
    }

    /// Re-register the subnet route at our metric so a peer subnet route
    /// cannot shadow it: add at the metric first, then drop the metric-0
    /// entry the address change created.
    async fn refresh_subnet_route(&self, session: &InterfaceSession, lease: &Lease) {
        let subnet = Route::new(lease.subnet(), lease.netmask, Ipv4Addr::UNSPECIFIED);

        if let Err(e) = self
            .network
            .add_route(&session.name, &subnet, self.policy.route_metric)
            .await
        {
            debug!("subnet route refresh add on {}: {}", session.name, e);
        }
        if let Err(e) = self.network.del_route(&session.name, &subnet, 0).await {
            debug!("subnet route refresh delete on {}: {}", session.name, e);
        }
    }

    /// Install the offer's routes; returns the set now owned
    async fn install_routes(
        &self,
        session: &InterfaceSession,
        lease: &Lease,
        previous: Option<&AppliedState>,
        context_changed: bool,
    ) -> Vec<Route> {
        let mut owned = Vec::new();

        for route in routes::installable(&lease.routes, self.policy.install_default_route) {
            // Still owned from the previous pass and untouched by the
            // removal above: no call needed.
            if !context_changed && previous.is_some_and(|p| p.routes.contains(&route)) {
                owned.push(route);
                continue;
            }

            match self
                .network
                .add_route(&session.name, &route, self.policy.route_metric)
                .await
            {
                Ok(MutationOutcome::Applied) => {
                    debug!("added route {} on {}", route, session.name);
                    owned.push(route);
                    self.emit_event(ReconcileEvent::RouteInstalled {
                        interface: session.name.clone(),
                        route,
                    });
                }
                Ok(MutationOutcome::AlreadyPresent) => {
                    // Present for some other reason; we track it from
                    // here on.
                    debug!("route {} on {} adopted", route, session.name);
                    owned.push(route);
                    self.emit_event(ReconcileEvent::RouteInstalled {
                        interface: session.name.clone(),
                        route,
                    });
                }
                Err(e) => {
                    // One bad route must not sink the rest of the pass
                    warn!("failed to add route {} on {}: {}", route, session.name, e);
                    self.emit_event(ReconcileEvent::RouteFailed {
                        interface: session.name.clone(),
                        route,
                        error: e.to_string(),
                    });
                }
            }
        }

        owned
    }

    /// Trigger service writers, hostname, info export and the hook
    async fn dispatch_downstream(
        &self,
        session: &InterfaceSession,
        lease: &Lease,
        transition: Transition,
    ) {
        self.write_resolver(session, lease).await;
        self.write_time_sync(session, lease).await;
        self.write_directory(session, lease).await;
        self.apply_hostname(lease).await;
        self.export_info(session, lease).await;
        self.run_hook(session, transition);
    }

    async fn write_resolver(&self, session: &InterfaceSession, lease: &Lease) {
        if !self.policy.manage_dns || lease.dns_servers.is_empty() {
            debug!("no dns information to write");
            return;
        }
        let Some(writer) = &self.resolver else {
            return;
        };

        match writer
            .write(
                &session.name,
                lease.dns_domain.as_deref(),
                lease.dns_search.as_deref(),
                &lease.dns_servers,
            )
            .await
        {
            Ok(changed) => {
                debug!(
                    "resolver configuration for {} {}",
                    session.name,
                    if changed { "updated" } else { "unchanged" }
                );
            }
            Err(e) => warn!("failed to write resolver configuration: {}", e),
        }
    }

    /// Write every configured time backend; restart a backend's service
    /// only when its file changed, and never restart one service
    /// identity twice in a pass (two backends may feed the same daemon).
    async fn write_time_sync(&self, session: &InterfaceSession, lease: &Lease) {
        if !self.policy.manage_ntp || lease.ntp_servers.is_empty() {
            return;
        }
        let Some(writer) = &self.time_sync else {
            return;
        };

        let mut restarted: Vec<&str> = Vec::new();
        for backend in &self.policy.time_backends {
            match writer.write(backend, &session.name, &lease.ntp_servers).await {
                Ok(true) => {
                    if restarted.iter().any(|s| *s == backend.service) {
                        debug!("{} already restarted this pass", backend.service);
                        continue;
                    }
                    match writer.restart(&backend.service).await {
                        Ok(()) => {
                            restarted.push(&backend.service);
                            self.emit_event(ReconcileEvent::ServiceRestarted {
                                service: backend.service.clone(),
                            });
                        }
                        Err(e) => warn!("failed to restart {}: {}", backend.service, e),
                    }
                }
                Ok(false) => {
                    debug!("{} already configured, skipping", backend.path.display());
                }
                Err(e) => {
                    warn!("failed to write {}: {}", backend.path.display(), e);
                }
            }
        }
    }

    async fn write_directory(&self, session: &InterfaceSession, lease: &Lease) {
        if !self.policy.manage_nis
            || (lease.nis_servers.is_empty() && lease.nis_domain.is_none())
        {
            return;
        }
        let Some(writer) = &self.directory else {
            return;
        };

        match writer
            .write(&session.name, lease.nis_domain.as_deref(), &lease.nis_servers)
            .await
        {
            Ok(true) => {
                if let Err(e) = writer.restart().await {
                    warn!("failed to restart directory service: {}", e);
                } else {
                    self.emit_event(ReconcileEvent::ServiceRestarted {
                        service: "directory".to_string(),
                    });
                }
            }
            Ok(false) => debug!("directory configuration unchanged"),
            Err(e) => warn!("failed to write directory configuration: {}", e),
        }
    }

    /// Apply the lease hostname, or one derived by reverse lookup.
    ///
    /// An administrator-set hostname is never overridden: without a
    /// policy opt-in we only replace an empty or placeholder name.
    async fn apply_hostname(&self, lease: &Lease) {
        let Some(host) = &self.host else {
            return;
        };

        let mut candidate = lease.hostname.clone().unwrap_or_default();
        if self.policy.manage_hostname && lease.hostname.is_none() {
            if let Some(name) = host.reverse_lookup(lease.address).await {
                candidate = first_label(&name);
            }
        }

        let current = match host.hostname().await {
            Ok(name) => name,
            Err(e) => {
                warn!("failed to read current hostname: {}", e);
                String::new()
            }
        };
        let placeholder = current.is_empty() || current == "(none)" || current == "localhost";

        if (self.policy.manage_hostname || placeholder) && !candidate.is_empty() {
            log_info!("setting hostname to `{}`", candidate);
            if let Err(e) = host.set_hostname(&candidate).await {
                warn!("failed to set hostname: {}", e);
            }
        }
    }

    async fn export_info(&self, session: &InterfaceSession, lease: &Lease) {
        let Some(path) = &self.policy.info_file else {
            return;
        };
        debug!("writing {}", path.display());
        if let Err(e) = info::write(path, session, lease, &self.policy).await {
            warn!("failed to write lease info {}: {}", path.display(), e);
        }
    }

    /// Spawn the transition hook, detached.
    ///
    /// A missing default script is normal and silent; a missing script
    /// the operator configured explicitly is reported.
    fn run_hook(&self, session: &InterfaceSession, transition: Transition) {
        let Some(runner) = &self.hooks else {
            return;
        };
        let Some(script) = &self.policy.hook_script else {
            return;
        };

        if !script.exists() {
            if self.policy.hook_script_is_explicit() {
                error!("`{}`: no such file or directory", script.display());
            }
            return;
        }

        let info_file = self.policy.info_file.as_deref();
        debug!(
            "exec \"{} {} {}\"",
            script.display(),
            info_file.map(|p| p.display().to_string()).unwrap_or_default(),
            transition
        );

        if let Err(e) = runner.run(script, info_file, transition) {
            warn!("failed to spawn hook {}: {}", script.display(), e);
            return;
        }

        self.emit_event(ReconcileEvent::HookDispatched {
            interface: session.name.clone(),
            transition,
        });
    }

    /// Emit a reconciler event
    fn emit_event(&self, event: ReconcileEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("event channel full, dropping event");
        }
    }
}

/// First whitespace-delimited label of a looked-up name
fn first_label(name: &str) -> String {
    name.chars().take_while(|c| *c > ' ').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_label_truncates_at_whitespace() {
        assert_eq!(first_label("host.example.org alias"), "host.example.org");
        assert_eq!(first_label("plain"), "plain");
        assert_eq!(first_label(""), "");
    }

    #[test]
    fn transition_strings() {
        assert_eq!(Transition::New.as_str(), "new");
        assert_eq!(Transition::Up.as_str(), "up");
        assert_eq!(Transition::Down.as_str(), "down");
    }
}
