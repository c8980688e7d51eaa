//! Core traits for the netlease system
//!
//! This module defines the abstract interfaces the reconciler drives.
//!
//! - [`NetworkStack`]: OS address/route/MTU mutation primitives
//! - [`ResolverWriter`], [`TimeSyncWriter`], [`DirectoryWriter`]: service
//!   configuration writers triggered after network state settles
//! - [`HostControl`]: hostname read/write and reverse lookup
//! - [`HookRunner`]: user hook scripts run on transitions
//! - [`SessionStore`]: persistence for the per-interface snapshot

pub mod hook;
pub mod host;
pub mod network_stack;
pub mod service_writer;
pub mod session_store;

pub use hook::{HookRunner, Transition};
pub use host::HostControl;
pub use network_stack::{MutationOutcome, NetworkStack};
pub use service_writer::{DirectoryWriter, ResolverWriter, TimeSyncWriter};
pub use session_store::SessionStore;
