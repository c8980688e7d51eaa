// # netlease-svc-unix
//
// Unix implementations of the netlease downstream collaborators:
//
// - [`ResolvConfWriter`]: resolv.conf generation, with resolvconf(8)
//   integration when the binary is installed
// - [`NtpConfWriter`]: ntpd/openntpd configuration files with
//   change detection against the running configuration
// - [`NisConfWriter`]: yp.conf generation and the NIS domainname
// - [`UnixHost`]: hostname read/write and getent-based reverse lookup
// - [`ScriptHook`]: detached hook-script spawning
//
// All writers are plain file generators; deciding *whether* to run them
// is the reconciler's job.

pub mod directory;
pub mod hook;
pub mod host;
pub mod resolver;
pub mod timesync;

pub use directory::NisConfWriter;
pub use hook::ScriptHook;
pub use host::UnixHost;
pub use resolver::ResolvConfWriter;
pub use timesync::NtpConfWriter;
