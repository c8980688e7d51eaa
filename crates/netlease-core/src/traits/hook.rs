// # Hook Runner Trait
//
// Runs the user-supplied transition hook. Invocations are detached: the
// reconciler never waits for a hook to finish, so a hanging script cannot
// delay network convergence.

use crate::error::Result;
use std::path::Path;

/// Classification of a reconciliation pass, passed to external hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Address or netmask changed
    New,
    /// Lease renewed without an address change
    Up,
    /// Lease lost; state torn down
    Down,
}

impl Transition {
    /// The argument string handed to hook scripts
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::New => "new",
            Transition::Up => "up",
            Transition::Down => "down",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spawns hook programs with the fixed positional contract:
/// `script <info-file-or-empty> <transition>`
pub trait HookRunner: Send + Sync {
    /// Spawn the hook detached. Errors cover spawn failure only; the
    /// script's own outcome is never observed.
    fn run(&self, script: &Path, info_file: Option<&Path>, transition: Transition) -> Result<()>;
}
