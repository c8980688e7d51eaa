//! Transition hook invoker
//!
//! Spawns the hook script with the fixed positional contract
//! `script <info-file-or-empty> <transition>` and never waits for it:
//! a hanging hook must not delay lease convergence.

use netlease_core::error::{Error, Result};
use netlease_core::traits::{HookRunner, Transition};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Detached hook-script spawner
#[derive(Default)]
pub struct ScriptHook;

impl ScriptHook {
    pub fn new() -> Self {
        Self
    }
}

impl HookRunner for ScriptHook {
    fn run(&self, script: &Path, info_file: Option<&Path>, transition: Transition) -> Result<()> {
        let info_arg = info_file
            .map(|p| p.as_os_str().to_os_string())
            .unwrap_or_else(OsString::new);

        let child = Command::new(script)
            .arg(info_arg)
            .arg(transition.as_str())
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| Error::hook(format!("exec {}: {}", script.display(), e)))?;

        // Detached: the child outlives this call and its outcome is
        // never observed
        drop(child);
        Ok(())
    }
}
