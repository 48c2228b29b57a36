//! Service lifecycle states.

/// Service operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Bootstrapping: schema, default key, seed dates.
    Starting,
    /// Serving requests; the scheduler is running if enabled.
    Running,
    /// Stopping the scheduler.
    ShuttingDown,
    /// Stopped.
    Stopped,
}
