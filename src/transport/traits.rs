// Transport Traits and Core Types
// Defines the abstract Transport trait and common types used by both links

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// TRANSPORT KIND
// ============================================================================

/// Which physical medium a transport drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Wifi,
    Cellular,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi => write!(f, "wifi"),
            Self::Cellular => write!(f, "cellular"),
        }
    }
}

// ============================================================================
// LINK STATE (connectivity FSM)
// ============================================================================

/// Connectivity state of a link. The cellular transport uses the full set;
/// WiFi only ever reports `Operational` or `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// Bring-up sequence is about to begin.
    NotStarted,
    /// Waiting for the modem serial interface to answer a liveness probe.
    AwaitingSerial,
    /// Soft or hard modem reset in progress.
    ResettingModem,
    /// Registering on the network and activating the data context.
    Attaching,
    /// Registered, context active, IP assigned. Ready for traffic.
    Operational,
    /// An established link dropped; recovery is about to start.
    ConnectionLost,
    /// Waiting out the backoff before re-attaching.
    Reconnecting,
    /// Cooldown gate before another full reset cycle.
    RestartingModem,
    /// Terminal until the recovery window elapses.
    ModemFailed,
    /// Inactive; only a fresh `connect()` leaves this state.
    Disabled,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::Disabled
    }
}

impl LinkState {
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Operational)
    }

    /// States in which the FSM is actively working toward a connection.
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Disabled | Self::ModemFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::AwaitingSerial => "AWAITING_SERIAL",
            Self::ResettingModem => "RESETTING_MODEM",
            Self::Attaching => "ATTACHING",
            Self::Operational => "OPERATIONAL",
            Self::ConnectionLost => "CONNECTION_LOST",
            Self::Reconnecting => "RECONNECTING",
            Self::RestartingModem => "RESTARTING_MODEM",
            Self::ModemFailed => "MODEM_FAILED",
            Self::Disabled => "DISABLED",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// REQUEST PHASE (HTTP transaction FSM)
// ============================================================================

/// Lifecycle phase of the single in-flight HTTP transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPhase {
    Idle,
    Connecting,
    Sending,
    ReceivingHeaders,
    ReceivingBody,
    Processing,
    Complete,
    RetryWait,
    Error,
}

impl Default for RequestPhase {
    fn default() -> Self {
        Self::Idle
    }
}

impl RequestPhase {
    /// True while the transaction holds the socket / client handle.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Self::Idle | Self::Complete | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Sending => "SENDING",
            Self::ReceivingHeaders => "RECEIVING_HEADERS",
            Self::ReceivingBody => "RECEIVING_BODY",
            Self::Processing => "PROCESSING",
            Self::Complete => "COMPLETE",
            Self::RetryWait => "RETRY_WAIT",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HTTP METHOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HTTP REQUEST
// ============================================================================

/// Callback invoked with the decoded JSON response body. Returns whether the
/// payload was accepted; a `false` return fails the transaction.
pub type ResponseCallback = Box<dyn FnMut(&serde_json::Value) -> bool + Send>;

/// One named HTTP exchange handed to a transport. The callback (and any
/// state it captures) is owned by the transaction until it settles.
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    /// Logical name of the exchange, for logs and diagnostics.
    pub label: String,
    pub payload: Option<String>,
    pub needs_auth: bool,
    pub callback: Option<ResponseCallback>,
}

impl HttpRequest {
    pub fn new(url: &str, method: HttpMethod, label: &str) -> Self {
        Self {
            url: url.to_string(),
            method,
            label: label.to_string(),
            payload: None,
            needs_auth: true,
            callback: None,
        }
    }

    pub fn get(url: &str, label: &str) -> Self {
        Self::new(url, HttpMethod::Get, label)
    }

    pub fn post(url: &str, label: &str) -> Self {
        Self::new(url, HttpMethod::Post, label)
    }

    pub fn with_payload(mut self, payload: &str) -> Self {
        self.payload = Some(payload.to_string());
        self
    }

    pub fn without_auth(mut self) -> Self {
        self.needs_auth = false;
        self
    }

    pub fn on_response<F>(mut self, cb: F) -> Self
    where
        F: FnMut(&serde_json::Value) -> bool + Send + 'static,
    {
        self.callback = Some(Box::new(cb));
        self
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("label", &self.label)
            .field("payload_len", &self.payload.as_deref().map(str::len))
            .field("needs_auth", &self.needs_auth)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors raised inside the transaction engine. These never cross the public
/// FSM surface directly (entry points report booleans and enum states) but
/// they drive logging and the local-error paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("host exceeds configured maximum length")]
    HostTooLong,

    #[error("path exceeds configured maximum length")]
    PathTooLong,

    #[error("request exceeds the outbound buffer")]
    RequestOverflow,

    #[error("response headers exceed the configured maximum")]
    HeadersTooLarge,

    #[error("response body exceeds the configured buffer")]
    ResponseTooLarge,

    #[error("malformed status line")]
    MalformedStatusLine,

    #[error("not connected")]
    NotConnected,

    #[error("another request is already active")]
    Busy,
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Capability contract both links satisfy, and which the arbiter satisfies
/// in turn by composing the two.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Begin or ensure establishing the underlying link. Cellular kicks its
    /// connectivity FSM and returns whether the attempt is now running; WiFi
    /// performs a bounded attempt loop and returns whether it succeeded.
    /// Callers must still poll `is_connected()`.
    async fn connect(&mut self) -> bool;

    /// Tear down the link. Idempotent.
    async fn disconnect(&mut self);

    /// True iff the link is fully operational (registered, IP assigned).
    fn is_connected(&self) -> bool;

    /// Enqueue exactly one HTTP exchange. Fails fast (`false`, no side
    /// effects) when another exchange is active or the link is down.
    /// The arbiter's implementation may first drive its own `connect()`.
    async fn start_request(&mut self, request: HttpRequest) -> bool;

    /// Pump call: advance the connectivity and request state machines by one
    /// step. Must be invoked every iteration of the caller's polling loop;
    /// a no-op when idle.
    async fn poll(&mut self);

    /// Swap the bearer token used for authenticated requests.
    fn set_auth_token(&mut self, token: &str);

    /// Human-readable snapshot for diagnostics/display. Never fails.
    fn status_string(&self) -> String;

    fn kind(&self) -> TransportKind;
}
