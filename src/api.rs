// Remote API Layer
// The request catalogue the controller exchanges with the backend, expressed
// as HttpRequests with typed payloads and decoding callbacks. Transport
// choice is the arbiter's business.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::SharedSession;
use crate::transport::HttpRequest;

// ============================================================================
// PAYLOAD TYPES
// ============================================================================

/// One environment sample as posted to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub greenhouse_id: u32,
    pub taken_at: DateTime<Utc>,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub light_lux: f32,
}

/// Relay targets commanded remotely (web manual overrides).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceCommands {
    #[serde(default)]
    pub exhaust_on: bool,
    #[serde(default)]
    pub dehumidifier_on: bool,
    #[serde(default)]
    pub blower_on: bool,
}

/// Heartbeat posted so the backend can tell a silent device from a dead one.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat<'a> {
    pub greenhouse_id: u32,
    pub status: &'a str,
    pub signal_quality: i16,
}

// ============================================================================
// API CLIENT
// ============================================================================

/// Builds the named exchanges against one backend. Stateless beyond the base
/// URL; the caller owns scheduling and hands the requests to a transport.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    greenhouse_id: u32,
}

impl ApiClient {
    pub fn new(base_url: &str, greenhouse_id: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            greenhouse_id,
        }
    }

    pub fn greenhouse_id(&self) -> u32 {
        self.greenhouse_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a batch of environment readings. The backend may veto with
    /// `{"ok": false}`; a missing flag counts as accepted.
    pub fn post_readings(&self, readings: &[EnvironmentReading]) -> Option<HttpRequest> {
        let payload = match serde_json::to_string(readings) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "could not serialize readings");
                return None;
            }
        };
        Some(
            HttpRequest::post(&self.url("/api/readings"), "READINGS_POST")
                .with_payload(&payload)
                .on_response(|value| {
                    value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true)
                }),
        )
    }

    /// POST a heartbeat with the current link status line.
    pub fn post_heartbeat(&self, status: &str, signal_quality: i16) -> Option<HttpRequest> {
        let beat = Heartbeat {
            greenhouse_id: self.greenhouse_id,
            status,
            signal_quality,
        };
        let payload = match serde_json::to_string(&beat) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "could not serialize heartbeat");
                return None;
            }
        };
        Some(
            HttpRequest::post(&self.url("/api/heartbeat"), "HEARTBEAT_POST")
                .with_payload(&payload)
                .on_response(|value| {
                    value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true)
                }),
        )
    }

    /// GET the remote relay commands and fold them into the session state.
    pub fn fetch_commands(&self, session: SharedSession) -> HttpRequest {
        let path = format!("/api/greenhouses/{}/commands", self.greenhouse_id);
        HttpRequest::get(&self.url(&path), "COMMANDS_GET").on_response(move |value| {
            let commands: DeviceCommands = match serde_json::from_value(value.clone()) {
                Ok(commands) => commands,
                Err(err) => {
                    warn!(error = %err, "command payload did not decode");
                    return false;
                }
            };
            let Ok(mut state) = session.lock() else {
                return false;
            };
            state.apply_overrides(
                commands.exhaust_on,
                commands.dehumidifier_on,
                commands.blower_on,
            );
            if state.overrides_changed() {
                debug!(?commands, "manual override targets changed");
            }
            true
        })
    }

    /// GET server time for RTC synchronization. The response carries a unix
    /// epoch (`{"epoch": 1700000000}`); the handler receives the decoded
    /// timestamp. Unauthenticated, like the original time endpoint.
    pub fn fetch_time<F>(&self, mut on_time: F) -> HttpRequest
    where
        F: FnMut(DateTime<Utc>) + Send + 'static,
    {
        HttpRequest::get(&self.url("/api/time"), "TIME_GET")
            .without_auth()
            .on_response(move |value| {
                let Some(epoch) = value.get("epoch").and_then(|v| v.as_i64()) else {
                    warn!("time payload missing epoch");
                    return false;
                };
                match Utc.timestamp_opt(epoch, 0).single() {
                    Some(when) => {
                        on_time(when);
                        true
                    }
                    None => {
                        warn!(epoch, "epoch out of range");
                        false
                    }
                }
            })
    }
}
