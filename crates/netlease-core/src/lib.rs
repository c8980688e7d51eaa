// # netlease-core
//
// Core library for the netlease lease-reconciliation system.
//
// ## Architecture Overview
//
// This library converges a host's network configuration onto a newly
// negotiated lease:
//
// - **NetworkStack**: trait over the OS address/route/MTU primitives
// - **ResolverWriter / TimeSyncWriter / DirectoryWriter**: traits over
//   the downstream service-configuration writers
// - **HostControl / HookRunner**: hostname access and transition hooks
// - **SessionStore**: persistence for the per-interface snapshot
// - **Reconciler**: the engine that diffs previous against offered state
//   and sequences the transition
//
// ## Design Principles
//
// 1. **Separation of Concerns**: decision logic is separate from OS
//    mutation and file generation
// 2. **Snapshot-Driven**: every pass diffs against exactly what this
//    system applied before, never against assumed-clean OS state
// 3. **Safe Ordering**: the new address is installed before the old one
//    is removed; snapshots commit before hooks spawn
// 4. **Failure Isolation**: a single failed route or writer never sinks
//    the rest of a pass

pub mod config;
pub mod error;
mod info;
pub mod lease;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Policy, TimeSyncBackend, TimeSyncFlavor};
pub use error::{Error, Result};
pub use lease::{FqdnOption, Lease, Route};
pub use reconciler::{ReconcileEvent, Reconciler};
pub use session::{AppliedState, InterfaceSession};
pub use state::{FileSessionStore, MemorySessionStore};
pub use traits::{
    DirectoryWriter, HookRunner, HostControl, MutationOutcome, NetworkStack, ResolverWriter,
    SessionStore, TimeSyncWriter, Transition,
};
