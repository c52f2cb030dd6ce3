// Shared Session State
// Observability mirror the transports copy into and the rest of the system
// reads. Field values are copies, never references to FSM internals.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::transport::LinkState;

/// Handle shared between the transports and the application. Pump calls may
/// originate from any tokio worker, so the mirror sits behind a mutex.
pub type SharedSession = Arc<Mutex<SessionState>>;

/// Signal quality value meaning "not known / not detectable" (CSQ 99).
pub const SIGNAL_UNKNOWN: i16 = 99;

/// Aggregated device-facing status. Written by the cellular transport every
/// pump cycle; the fail-safe flag is owned by the wider system and only read
/// here.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    // --- Cellular link mirror ---
    pub link_state: LinkState,
    pub last_link_transition: Option<DateTime<Utc>>,
    pub modem_resets: u8,
    pub attach_failures: u8,
    pub reconnect_attempts: u8,
    pub cellular_connected: bool,
    /// CSQ as reported by the modem; 0-31 valid, 99 unknown.
    pub signal_quality: i16,

    // --- Operational flags ---
    /// Set by the application after prolonged network unavailability. The
    /// connectivity core exposes it but never acts on it.
    pub fail_safe_mode: bool,

    // --- Web manual-override relay targets (from the remote API) ---
    pub exhaust_target: bool,
    pub dehumidifier_target: bool,
    pub blower_target: bool,

    // --- Previous targets, kept to detect override changes ---
    pub last_exhaust_target: bool,
    pub last_dehumidifier_target: bool,
    pub last_blower_target: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            link_state: LinkState::default(),
            last_link_transition: None,
            modem_resets: 0,
            attach_failures: 0,
            reconnect_attempts: 0,
            cellular_connected: false,
            signal_quality: SIGNAL_UNKNOWN,
            fail_safe_mode: false,
            exhaust_target: false,
            dehumidifier_target: false,
            blower_target: false,
            last_exhaust_target: false,
            last_dehumidifier_target: false,
            last_blower_target: false,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh shared handle.
    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Record relay targets commanded by the remote API, shifting the
    /// current values into the `last_*` shadows first.
    pub fn apply_overrides(&mut self, exhaust: bool, dehumidifier: bool, blower: bool) {
        self.last_exhaust_target = self.exhaust_target;
        self.last_dehumidifier_target = self.dehumidifier_target;
        self.last_blower_target = self.blower_target;
        self.exhaust_target = exhaust;
        self.dehumidifier_target = dehumidifier;
        self.blower_target = blower;
    }

    /// True when any override target changed in the last `apply_overrides`.
    pub fn overrides_changed(&self) -> bool {
        self.exhaust_target != self.last_exhaust_target
            || self.dehumidifier_target != self.last_dehumidifier_target
            || self.blower_target != self.last_blower_target
    }
}
