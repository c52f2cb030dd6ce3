// Platform Collaborators
// Fire-and-forget hooks into hardware owned by other parts of the system.
// Both are optional everywhere; their absence never changes outcomes.

/// Character display (or any status sink). Implementations must not block.
pub trait StatusDisplay: Send {
    fn message(&self, text: &str);
}

/// Display sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl StatusDisplay for NullDisplay {
    fn message(&self, _text: &str) {}
}

/// Hardware watchdog. Fed at the top of every FSM advance and around the
/// long modem-reset delays so slow bring-up never looks like a hang.
pub trait Watchdog: Send {
    fn feed(&self);
}

/// Watchdog that accepts feeds silently (no hardware watchdog present).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatchdog;

impl Watchdog for NullWatchdog {
    fn feed(&self) {}
}
