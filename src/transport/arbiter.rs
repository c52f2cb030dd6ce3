// Transport Arbiter
// Selects which link is primary given a preference policy and the live
// connectivity of each, and routes all traffic through it. Implements the
// Transport trait itself, so the rest of the system can swap it in anywhere
// a single link would go.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::SharedSession;
use crate::transport::{HttpRequest, Transport, TransportKind};

// ============================================================================
// PREFERENCE POLICY
// ============================================================================

/// Which link the arbiter should favour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPreference {
    WifiOnly,
    CellularOnly,
    /// WiFi when available, cellular as failover.
    WifiPreferred,
    /// Cellular when available, WiFi as failover.
    CellularPreferred,
}

impl Default for TransportPreference {
    fn default() -> Self {
        Self::WifiPreferred
    }
}

impl TransportPreference {
    /// Whether the policy permits falling over to the other link.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::WifiPreferred | Self::CellularPreferred)
    }
}

/// Non-owning designation of whichever transport is currently primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveLink {
    Wifi,
    Cellular,
}

// ============================================================================
// ARBITER
// ============================================================================

pub struct NetworkArbiter<W: Transport, C: Transport> {
    preference: TransportPreference,
    wifi: Option<W>,
    cellular: Option<C>,
    active: Option<ActiveLink>,
    session: Option<SharedSession>,
}

impl<W: Transport, C: Transport> NetworkArbiter<W, C> {
    pub fn new(preference: TransportPreference, wifi: Option<W>, cellular: Option<C>) -> Self {
        let mut arbiter = Self {
            preference,
            wifi,
            cellular,
            active: None,
            session: None,
        };
        arbiter.determine_active();
        arbiter
    }

    pub fn with_session(mut self, session: SharedSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn preference(&self) -> TransportPreference {
        self.preference
    }

    /// Change the policy and immediately re-evaluate the active link.
    pub fn set_preference(&mut self, preference: TransportPreference) {
        debug!(?preference, "preference changed");
        self.preference = preference;
        self.determine_active();
    }

    pub fn active_link(&self) -> Option<ActiveLink> {
        self.active
    }

    pub fn wifi(&self) -> Option<&W> {
        self.wifi.as_ref()
    }

    pub fn wifi_mut(&mut self) -> Option<&mut W> {
        self.wifi.as_mut()
    }

    pub fn cellular(&self) -> Option<&C> {
        self.cellular.as_ref()
    }

    pub fn cellular_mut(&mut self) -> Option<&mut C> {
        self.cellular.as_mut()
    }

    /// Fail-safe flag owned by the wider system. `false` when no session
    /// state was attached.
    pub fn is_safe_mode_active(&self) -> bool {
        match &self.session {
            Some(session) => session.lock().map(|s| s.fail_safe_mode).unwrap_or(false),
            None => false,
        }
    }

    /// Re-run the selection table. Called at construction, on preference
    /// change, and after every connect/disconnect/switch.
    pub fn determine_active(&mut self) {
        let wifi_connected = self.wifi.as_ref().map(|w| w.is_connected()).unwrap_or(false);
        let cellular_connected = self
            .cellular
            .as_ref()
            .map(|c| c.is_connected())
            .unwrap_or(false);

        self.active = match self.preference {
            TransportPreference::WifiOnly => self.wifi.is_some().then_some(ActiveLink::Wifi),
            TransportPreference::CellularOnly => {
                self.cellular.is_some().then_some(ActiveLink::Cellular)
            }
            TransportPreference::WifiPreferred => {
                if self.wifi.is_some() && wifi_connected {
                    Some(ActiveLink::Wifi)
                } else if self.cellular.is_some() && cellular_connected {
                    Some(ActiveLink::Cellular)
                } else if self.wifi.is_some() {
                    // Nothing connected: default to attempting the preferred.
                    Some(ActiveLink::Wifi)
                } else if self.cellular.is_some() {
                    Some(ActiveLink::Cellular)
                } else {
                    None
                }
            }
            TransportPreference::CellularPreferred => {
                if self.cellular.is_some() && cellular_connected {
                    Some(ActiveLink::Cellular)
                } else if self.wifi.is_some() && wifi_connected {
                    Some(ActiveLink::Wifi)
                } else if self.cellular.is_some() {
                    Some(ActiveLink::Cellular)
                } else if self.wifi.is_some() {
                    Some(ActiveLink::Wifi)
                } else {
                    None
                }
            }
        };

        debug!(
            wifi_connected,
            cellular_connected,
            active = ?self.active,
            "active link determined"
        );
    }

    /// Explicit override: bring up WiFi and, only once it is connected,
    /// drop cellular, so there is no window with zero connectivity. A failed
    /// attempt leaves the existing link untouched.
    pub async fn switch_to_wifi(&mut self) -> bool {
        let Some(wifi) = self.wifi.as_mut() else {
            warn!("wifi transport not available for switching");
            return false;
        };

        if wifi.connect().await {
            if let Some(cellular) = self.cellular.as_mut() {
                if cellular.is_connected() {
                    debug!("disconnecting cellular after wifi switch");
                    cellular.disconnect().await;
                }
            }
            self.determine_active();
            true
        } else {
            debug!("wifi switch failed; keeping the current link");
            self.determine_active();
            false
        }
    }

    /// Explicit override, mirror image of `switch_to_wifi`.
    pub async fn switch_to_cellular(&mut self) -> bool {
        let Some(cellular) = self.cellular.as_mut() else {
            warn!("cellular transport not available for switching");
            return false;
        };

        if cellular.connect().await {
            if let Some(wifi) = self.wifi.as_mut() {
                if wifi.is_connected() {
                    debug!("disconnecting wifi after cellular switch");
                    wifi.disconnect().await;
                }
            }
            self.determine_active();
            true
        } else {
            debug!("cellular switch failed; keeping the current link");
            self.determine_active();
            false
        }
    }
}

// ============================================================================
// TRANSPORT IMPL
// ============================================================================

impl<W: Transport, C: Transport> Transport for NetworkArbiter<W, C> {
    async fn connect(&mut self) -> bool {
        let success = match self.preference {
            TransportPreference::WifiOnly => match self.wifi.as_mut() {
                Some(wifi) => wifi.connect().await,
                None => false,
            },
            TransportPreference::CellularOnly => match self.cellular.as_mut() {
                Some(cellular) => cellular.connect().await,
                None => false,
            },
            TransportPreference::WifiPreferred => {
                let wifi_ok = match self.wifi.as_mut() {
                    Some(wifi) => wifi.connect().await,
                    None => false,
                };
                if wifi_ok {
                    true
                } else if self.cellular.is_some() {
                    debug!("wifi failed or unavailable; trying cellular");
                    // Two radios fighting over power is worse than one gap.
                    if let Some(wifi) = self.wifi.as_mut() {
                        if wifi.is_connected() {
                            wifi.disconnect().await;
                        }
                    }
                    match self.cellular.as_mut() {
                        Some(cellular) => cellular.connect().await,
                        None => false,
                    }
                } else {
                    false
                }
            }
            TransportPreference::CellularPreferred => {
                let cellular_ok = match self.cellular.as_mut() {
                    Some(cellular) => cellular.connect().await,
                    None => false,
                };
                if cellular_ok {
                    true
                } else if self.wifi.is_some() {
                    debug!("cellular failed or unavailable; trying wifi");
                    if let Some(cellular) = self.cellular.as_mut() {
                        if cellular.is_connected() {
                            cellular.disconnect().await;
                        }
                    }
                    match self.wifi.as_mut() {
                        Some(wifi) => wifi.connect().await,
                        None => false,
                    }
                } else {
                    false
                }
            }
        };

        self.determine_active();
        success
    }

    async fn disconnect(&mut self) {
        if let Some(wifi) = self.wifi.as_mut() {
            if wifi.is_connected() {
                wifi.disconnect().await;
            }
        }
        if let Some(cellular) = self.cellular.as_mut() {
            if cellular.is_connected() {
                cellular.disconnect().await;
            }
        }
        self.active = None;
    }

    fn is_connected(&self) -> bool {
        match self.active {
            Some(ActiveLink::Wifi) => {
                self.wifi.as_ref().map(|w| w.is_connected()).unwrap_or(false)
            }
            Some(ActiveLink::Cellular) => self
                .cellular
                .as_ref()
                .map(|c| c.is_connected())
                .unwrap_or(false),
            None => {
                // Selection may be stale; answer from the links themselves.
                self.wifi.as_ref().map(|w| w.is_connected()).unwrap_or(false)
                    || self
                        .cellular
                        .as_ref()
                        .map(|c| c.is_connected())
                        .unwrap_or(false)
            }
        }
    }

    async fn start_request(&mut self, request: HttpRequest) -> bool {
        if !self.is_connected() {
            debug!(label = %request.label, "not connected; connecting before request");
            if !self.connect().await {
                warn!(label = %request.label, "connect failed; request dropped");
                return false;
            }
        }

        match self.active {
            Some(ActiveLink::Wifi) => match self.wifi.as_mut() {
                Some(wifi) if wifi.is_connected() => wifi.start_request(request).await,
                _ => {
                    warn!(label = %request.label, "active wifi link is not connected");
                    false
                }
            },
            Some(ActiveLink::Cellular) => match self.cellular.as_mut() {
                Some(cellular) if cellular.is_connected() => cellular.start_request(request).await,
                _ => {
                    warn!(label = %request.label, "active cellular link is not connected");
                    false
                }
            },
            None => {
                warn!(label = %request.label, "no active link for request");
                false
            }
        }
    }

    async fn poll(&mut self) {
        // Both links are pumped: cellular bring-up has to progress even
        // while WiFi carries the traffic.
        if let Some(wifi) = self.wifi.as_mut() {
            wifi.poll().await;
        }
        if let Some(cellular) = self.cellular.as_mut() {
            cellular.poll().await;
        }
    }

    fn set_auth_token(&mut self, token: &str) {
        if let Some(wifi) = self.wifi.as_mut() {
            wifi.set_auth_token(token);
        }
        if let Some(cellular) = self.cellular.as_mut() {
            cellular.set_auth_token(token);
        }
    }

    fn status_string(&self) -> String {
        match self.active {
            Some(ActiveLink::Wifi) => {
                if let Some(wifi) = self.wifi.as_ref() {
                    return format!("Arbiter (Active: {})", wifi.status_string());
                }
            }
            Some(ActiveLink::Cellular) => {
                if let Some(cellular) = self.cellular.as_ref() {
                    return format!("Arbiter (Active: {})", cellular.status_string());
                }
            }
            None => {}
        }

        let preference = match self.preference {
            TransportPreference::WifiOnly => "WiFi Only",
            TransportPreference::CellularOnly => "Cellular Only",
            TransportPreference::WifiPreferred => "WiFi Preferred",
            TransportPreference::CellularPreferred => "Cellular Preferred",
        };
        format!(
            "Arbiter (Disconnected. Pref: {}. WiFi avail: {}, Cellular avail: {})",
            preference,
            self.wifi.is_some(),
            self.cellular.is_some()
        )
    }

    fn kind(&self) -> TransportKind {
        match self.active {
            Some(ActiveLink::Wifi) => TransportKind::Wifi,
            Some(ActiveLink::Cellular) => TransportKind::Cellular,
            None => match self.preference {
                TransportPreference::CellularOnly | TransportPreference::CellularPreferred => {
                    TransportKind::Cellular
                }
                _ => TransportKind::Wifi,
            },
        }
    }
}
