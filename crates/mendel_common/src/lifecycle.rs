//! Shutdown hooks shared by every long-lived daemon subsystem.

/// Shutdown hooks broadcast by the daemon when it exits.
///
/// Both hooks default to no-ops so a subsystem only overrides the ones it
/// cares about. `on_force_exit` runs instead of `on_exit` after a critical
/// error; it falls back to the graceful hook unless overridden.
pub trait Lifecycle {
    /// Short name used in shutdown logs.
    fn name(&self) -> &'static str;

    /// Graceful cleanup: flush, close sockets, stop watchers.
    fn on_exit(&self) {}

    /// Cleanup after a critical error. Must not block.
    fn on_force_exit(&self) {
        self.on_exit();
    }
}
