// Cellular Transport
// GPRS link over an AT-command modem: a connectivity FSM for bring-up,
// attach, monitoring and recovery, plus a byte-level request FSM running one
// asynchronous HTTP exchange over the modem's raw socket

use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{CellularConfig, HttpConfig};
use crate::platform::{StatusDisplay, Watchdog};
use crate::session::SharedSession;
use crate::transport::http::{
    chunked_terminator_seen, compose_request, decode_chunked, is_retryable_status, ParsedUrl,
    ResponseHead,
};
use crate::transport::{HttpRequest, LinkState, RequestPhase, Transport, TransportKind};

// ============================================================================
// MODEM ABSTRACTION
// ============================================================================

/// SIM card readiness as reported by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStatus {
    Ready,
    Locked,
    Missing,
    Error,
}

/// Network registration status (CREG-style).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    Home,
    Roaming,
    Searching,
    Denied,
    Unknown,
}

impl RegistrationStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

/// The AT-command surface of a GPRS modem, plus its single raw socket.
/// The transport drives everything through this trait; hardware backends and
/// scripted test doubles implement it.
#[allow(async_fn_in_trait)]
pub trait Modem {
    /// Basic liveness probe (an `AT` with a short timeout).
    async fn probe(&mut self) -> bool;

    /// Software reset. True when the modem came back responsive.
    async fn soft_reset(&mut self) -> bool;

    /// Power/reset-pin cycle. True when the modem came back responsive.
    async fn hard_reset(&mut self) -> bool;

    async fn sim_status(&mut self) -> SimStatus;
    async fn unlock_sim(&mut self, pin: &str) -> bool;

    /// Enable transport-layer security support if the firmware offers it.
    async fn enable_tls(&mut self) -> bool;

    async fn registration(&mut self) -> RegistrationStatus;

    /// True when a data context is active (CGATT-style check).
    async fn is_attached(&mut self) -> bool;

    /// Activate the data context against the given APN.
    async fn attach(&mut self, apn: &str, user: &str, password: &str) -> bool;

    async fn detach(&mut self);

    /// CSQ: 0-31 valid, 99 unknown.
    async fn signal_quality(&mut self) -> i16;

    async fn local_ip(&mut self) -> Option<String>;

    // --- Raw socket (one at a time, like the underlying modem) ---

    async fn socket_connect(&mut self, host: &str, port: u16) -> bool;

    /// Returns the number of bytes actually accepted; a short write is a
    /// send failure.
    async fn socket_write(&mut self, data: &[u8]) -> usize;

    /// Non-blocking read of whatever the modem has buffered; 0 when nothing
    /// is pending.
    async fn socket_read(&mut self, buf: &mut [u8]) -> usize;

    fn socket_connected(&self) -> bool;

    async fn socket_close(&mut self);
}

// ============================================================================
// TRANSACTION STATE
// ============================================================================

/// Per-transaction accumulation. Owned by the transport while a request is
/// active; dropped when the transaction settles.
struct Transaction {
    request: HttpRequest,
    target: ParsedUrl,
    /// Start of the current attempt, for the overall timeout.
    started: Instant,
    /// Start of the current phase, for per-phase timeouts.
    phase_started: Instant,
    retry_at: Option<Instant>,
    retries: u8,
    /// Header accumulation, then (after the head parses) body accumulation.
    response: Vec<u8>,
    status: i32,
    content_length: Option<usize>,
    chunked: bool,
    body_bytes: usize,
}

impl Transaction {
    fn new(request: HttpRequest, target: ParsedUrl) -> Self {
        let now = Instant::now();
        Self {
            request,
            target,
            started: now,
            phase_started: now,
            retry_at: None,
            retries: 0,
            response: Vec::new(),
            status: 0,
            content_length: None,
            chunked: false,
            body_bytes: 0,
        }
    }

    /// Clear per-attempt response state ahead of a retry.
    fn reset_attempt(&mut self) {
        self.response.clear();
        self.status = 0;
        self.content_length = None;
        self.chunked = false;
        self.body_bytes = 0;
        self.retry_at = None;
        let now = Instant::now();
        self.started = now;
        self.phase_started = now;
    }
}

// ============================================================================
// CELLULAR TRANSPORT
// ============================================================================

pub struct CellularTransport<M: Modem> {
    modem: M,
    config: CellularConfig,
    http: HttpConfig,
    auth_token: String,
    session: Option<SharedSession>,
    display: Option<Box<dyn StatusDisplay>>,
    watchdog: Option<Box<dyn Watchdog>>,

    // --- Connectivity FSM ---
    link_state: LinkState,
    link_since: Instant,
    modem_resets: u8,
    attach_failures: u8,
    reconnect_attempts: u8,
    last_signal: i16,

    // --- Request FSM ---
    phase: RequestPhase,
    active: bool,
    txn: Option<Transaction>,
}

impl<M: Modem> CellularTransport<M> {
    pub fn new(modem: M, config: CellularConfig, http: HttpConfig, auth_token: &str) -> Self {
        Self {
            modem,
            config,
            http,
            auth_token: auth_token.to_string(),
            session: None,
            display: None,
            watchdog: None,
            link_state: LinkState::Disabled,
            link_since: Instant::now(),
            modem_resets: 0,
            attach_failures: 0,
            reconnect_attempts: 0,
            last_signal: crate::session::SIGNAL_UNKNOWN,
            phase: RequestPhase::Idle,
            active: false,
            txn: None,
        }
    }

    pub fn with_session(mut self, session: SharedSession) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_display(mut self, display: Box<dyn StatusDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_watchdog(mut self, watchdog: Box<dyn Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state
    }

    pub fn request_phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn request_active(&self) -> bool {
        self.active
    }

    pub fn modem_reset_count(&self) -> u8 {
        self.modem_resets
    }

    pub fn attach_failure_count(&self) -> u8 {
        self.attach_failures
    }

    pub fn reconnect_attempt_count(&self) -> u8 {
        self.reconnect_attempts
    }

    /// Retries consumed by the current transaction, 0 when idle.
    pub fn retry_count(&self) -> u8 {
        self.txn.as_ref().map(|t| t.retries).unwrap_or(0)
    }

    pub async fn signal_quality(&mut self) -> i16 {
        let csq = self.modem.signal_quality().await;
        self.last_signal = csq;
        csq
    }

    pub async fn ip_address(&mut self) -> Option<String> {
        if self.link_state.is_operational() {
            self.modem.local_ip().await
        } else {
            None
        }
    }

    fn feed_watchdog(&self) {
        if let Some(wd) = &self.watchdog {
            wd.feed();
        }
    }

    fn elapsed_in_state(&self) -> Duration {
        self.link_since.elapsed()
    }

    fn cfg_ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    // ------------------------------------------------------------------
    // Connectivity FSM
    // ------------------------------------------------------------------

    fn transition_to(&mut self, next: LinkState) {
        if self.link_state == next {
            return;
        }
        debug!(from = %self.link_state, to = %next, "cellular link transition");
        self.link_state = next;
        self.link_since = Instant::now();

        // Counter invariants: a full restart clears everything; entering a
        // recovery sequence or succeeding clears that category's counter.
        match next {
            LinkState::NotStarted => {
                self.modem_resets = 0;
                self.attach_failures = 0;
                self.reconnect_attempts = 0;
            }
            LinkState::Operational => {
                self.attach_failures = 0;
                self.reconnect_attempts = 0;
            }
            LinkState::ConnectionLost => {
                self.reconnect_attempts = 0;
            }
            _ => {}
        }
        self.mirror_link();
    }

    fn mirror_link(&self) {
        let Some(session) = &self.session else {
            return;
        };
        if let Ok(mut state) = session.lock() {
            state.link_state = self.link_state;
            state.last_link_transition = Some(Utc::now());
            state.modem_resets = self.modem_resets;
            state.attach_failures = self.attach_failures;
            state.reconnect_attempts = self.reconnect_attempts;
            state.cellular_connected = self.link_state.is_operational();
            state.signal_quality = self.last_signal;
        }
    }

    /// Advance the connectivity FSM by one step. Called from `poll()`; also
    /// public so a bring-up loop can drive the link without pumping HTTP.
    pub async fn advance_link(&mut self) {
        self.feed_watchdog();
        match self.link_state {
            LinkState::Disabled => {}
            LinkState::NotStarted => self.handle_not_started().await,
            LinkState::AwaitingSerial => self.handle_awaiting_serial().await,
            LinkState::ResettingModem => self.handle_resetting_modem().await,
            LinkState::Attaching => self.handle_attaching().await,
            LinkState::Operational => self.handle_operational().await,
            LinkState::ConnectionLost => self.handle_connection_lost().await,
            LinkState::Reconnecting => self.handle_reconnecting(),
            LinkState::RestartingModem => self.handle_restarting_modem(),
            LinkState::ModemFailed => self.handle_modem_failed(),
        }
    }

    async fn handle_not_started(&mut self) {
        if self.modem.probe().await {
            self.transition_to(LinkState::ResettingModem);
        } else {
            debug!("modem serial not yet responsive");
            self.transition_to(LinkState::AwaitingSerial);
        }
    }

    async fn handle_awaiting_serial(&mut self) {
        if self.modem.probe().await {
            self.transition_to(LinkState::ResettingModem);
        } else if self.elapsed_in_state() > Self::cfg_ms(self.config.serial_wait_timeout_ms) {
            warn!("timeout waiting for modem serial; escalating to hardware reset");
            self.transition_to(LinkState::RestartingModem);
        }
    }

    async fn handle_resetting_modem(&mut self) {
        // Soft reset on the first try, hardware reset once soft has failed.
        let reset_ok = if self.modem_resets == 0 {
            self.modem.soft_reset().await
        } else {
            self.modem.hard_reset().await
        };
        self.feed_watchdog();

        if !reset_ok {
            self.modem_resets += 1;
            if self.modem_resets >= self.config.max_modem_resets {
                warn!(resets = self.modem_resets, "max modem resets reached");
                self.transition_to(LinkState::ModemFailed);
            } else {
                debug!(resets = self.modem_resets, "modem reset failed, will retry");
                self.transition_to(LinkState::RestartingModem);
            }
            return;
        }

        self.modem_resets = 0;

        if !self.config.sim_pin.is_empty() && self.modem.sim_status().await == SimStatus::Locked {
            let pin = self.config.sim_pin.clone();
            if !self.modem.unlock_sim(&pin).await {
                warn!("SIM unlock failed");
                self.transition_to(LinkState::RestartingModem);
                return;
            }
        }

        if self.modem.sim_status().await != SimStatus::Ready {
            self.modem_resets += 1;
            if self.modem_resets >= self.config.max_modem_resets {
                warn!("SIM never became ready");
                self.transition_to(LinkState::ModemFailed);
            } else {
                self.transition_to(LinkState::RestartingModem);
            }
            return;
        }

        // Best effort: secure requests degrade, the link does not.
        if !self.modem.enable_tls().await {
            warn!("modem TLS enable failed; https requests may not succeed");
        }
        self.feed_watchdog();

        self.transition_to(LinkState::Attaching);
    }

    async fn handle_attaching(&mut self) {
        let registration = self.modem.registration().await;
        if registration.is_registered() && self.modem.is_attached().await {
            debug!("already registered and attached");
            self.transition_to(LinkState::Operational);
            return;
        }

        if !registration.is_registered() {
            if self.elapsed_in_state() > Self::cfg_ms(self.config.attach_timeout_ms) {
                self.attach_failures += 1;
                warn!(failures = self.attach_failures, "network registration timeout");
                if self.attach_failures >= self.config.max_attach_failures {
                    self.transition_to(LinkState::RestartingModem);
                } else {
                    // Retry in place: restart the registration window.
                    self.link_since = Instant::now();
                }
            }
            return;
        }
        self.feed_watchdog();

        let (apn, user, password) = (
            self.config.apn.clone(),
            self.config.user.clone(),
            self.config.password.clone(),
        );
        if self.modem.attach(&apn, &user, &password).await {
            info!("data context activated");
            self.transition_to(LinkState::Operational);
        } else {
            self.attach_failures += 1;
            warn!(failures = self.attach_failures, "context activation failed");
            if self.attach_failures >= self.config.max_attach_failures {
                self.transition_to(LinkState::RestartingModem);
            } else {
                self.link_since = Instant::now();
            }
        }
    }

    async fn handle_operational(&mut self) {
        if self.elapsed_in_state() < Self::cfg_ms(self.config.check_interval_ms) {
            return;
        }
        self.link_since = Instant::now();

        if !self.modem.is_attached().await {
            warn!("data context dropped");
            self.transition_to(LinkState::ConnectionLost);
            return;
        }
        if !self.modem.registration().await.is_registered() {
            warn!("network registration lost");
            self.transition_to(LinkState::ConnectionLost);
            return;
        }

        self.last_signal = self.modem.signal_quality().await;
        self.mirror_link();
    }

    async fn handle_connection_lost(&mut self) {
        self.modem.socket_close().await;
        self.transition_to(LinkState::Reconnecting);
    }

    fn handle_reconnecting(&mut self) {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            warn!("max reconnect attempts reached; restarting modem");
            self.transition_to(LinkState::RestartingModem);
            return;
        }
        if self.elapsed_in_state() >= Self::cfg_ms(self.config.reconnect_delay_ms) {
            self.reconnect_attempts += 1;
            debug!(attempt = self.reconnect_attempts, "reconnecting");
            self.transition_to(LinkState::Attaching);
        }
    }

    fn handle_restarting_modem(&mut self) {
        // Pure delay gate; the reset counter in ResettingModem is the limiter.
        if self.elapsed_in_state() >= Self::cfg_ms(self.config.restart_cooldown_ms) {
            self.transition_to(LinkState::ResettingModem);
        }
    }

    fn handle_modem_failed(&mut self) {
        if let Some(display) = &self.display {
            display.message("Modem failure");
        }
        if self.elapsed_in_state() > Self::cfg_ms(self.config.fail_recovery_timeout_ms) {
            info!("modem fail recovery window elapsed; disabling until next connect()");
            self.transition_to(LinkState::Disabled);
        }
    }

    // ------------------------------------------------------------------
    // Request FSM
    // ------------------------------------------------------------------

    /// Advance the HTTP transaction FSM by one step. No-op when idle.
    pub async fn pump_request(&mut self) {
        if !self.active {
            return;
        }

        if !self.link_state.is_operational() {
            // No silent hangs: an in-flight exchange is failed on the spot.
            // Classification of the failure waits until the link is pumped
            // back, so retries are not burned during an outage.
            if self.phase.is_in_flight() {
                warn!(
                    label = self.txn.as_ref().map(|t| t.request.label.as_str()).unwrap_or(""),
                    "link dropped during http exchange; aborting"
                );
                self.modem.socket_close().await;
                self.phase = RequestPhase::Error;
            }
            return;
        }

        self.feed_watchdog();

        // RetryWait is a pure timer gate; only live phases age against the
        // overall ceiling.
        if self.phase.is_in_flight() && self.phase != RequestPhase::RetryWait {
            let overall = self.txn.as_ref().map(|t| t.started.elapsed()).unwrap_or_default();
            if overall > Self::cfg_ms(self.http.total_timeout_ms) {
                warn!("http exchange exceeded the overall timeout");
                self.modem.socket_close().await;
                self.phase = RequestPhase::Error;
            }
        }

        match self.phase {
            RequestPhase::Idle => self.active = false,
            RequestPhase::Connecting => self.step_connect().await,
            RequestPhase::Sending => self.step_send().await,
            RequestPhase::ReceivingHeaders => self.step_headers().await,
            RequestPhase::ReceivingBody => self.step_body().await,
            RequestPhase::Processing => self.step_process().await,
            RequestPhase::Complete => self.step_complete().await,
            RequestPhase::Error => self.step_error().await,
            RequestPhase::RetryWait => self.step_retry_wait(),
        }
    }

    async fn step_connect(&mut self) {
        let Some(txn) = self.txn.as_ref() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        if txn.phase_started.elapsed() > Self::cfg_ms(self.http.connect_timeout_ms) {
            warn!(label = %txn.request.label, "socket connect timeout");
            self.phase = RequestPhase::Error;
            return;
        }
        let (host, port) = (txn.target.host.clone(), txn.target.port);

        if self.modem.socket_connect(&host, port).await {
            if let Some(txn) = self.txn.as_mut() {
                txn.phase_started = Instant::now();
            }
            self.phase = RequestPhase::Sending;
        } else {
            warn!(host = %host, port, "socket connect failed");
            // A refused socket while "operational" hints the link is gone;
            // hand recovery to the connectivity FSM.
            if self.link_state.is_operational() {
                self.transition_to(LinkState::ConnectionLost);
            }
            self.phase = RequestPhase::Error;
        }
    }

    async fn step_send(&mut self) {
        let Some(txn) = self.txn.as_ref() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        if txn.phase_started.elapsed() > Self::cfg_ms(self.http.response_timeout_ms) {
            warn!(label = %txn.request.label, "send phase timeout");
            self.modem.socket_close().await;
            self.phase = RequestPhase::Error;
            return;
        }

        let bearer = (txn.request.needs_auth && !self.auth_token.is_empty())
            .then_some(self.auth_token.as_str());
        let bytes = match compose_request(
            txn.request.method.as_str(),
            &txn.target,
            bearer,
            &self.http.user_agent,
            txn.request.payload.as_deref(),
            self.http.request_buffer,
        ) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(label = %txn.request.label, error = %err, "request composition failed");
                self.modem.socket_close().await;
                self.phase = RequestPhase::Error;
                return;
            }
        };

        let sent = self.modem.socket_write(&bytes).await;
        if sent != bytes.len() {
            warn!(sent, expected = bytes.len(), "short write");
            self.modem.socket_close().await;
            if self.link_state.is_operational() {
                self.transition_to(LinkState::ConnectionLost);
            }
            self.phase = RequestPhase::Error;
            return;
        }

        if let Some(txn) = self.txn.as_mut() {
            txn.response.clear();
            txn.phase_started = Instant::now();
        }
        self.phase = RequestPhase::ReceivingHeaders;
    }

    /// Drain whatever the socket has buffered into the transaction's
    /// accumulation buffer. Returns false when a size limit tripped.
    async fn drain_socket(&mut self, limit: usize) -> bool {
        let mut chunk = [0u8; 256];
        loop {
            let n = self.modem.socket_read(&mut chunk).await;
            if n == 0 {
                return true;
            }
            let Some(txn) = self.txn.as_mut() else {
                return true;
            };
            txn.response.extend_from_slice(&chunk[..n]);
            txn.body_bytes = txn.response.len();
            if txn.response.len() > limit {
                return false;
            }
        }
    }

    async fn step_headers(&mut self) {
        if !self.drain_socket(self.http.max_header_bytes).await {
            warn!("response headers exceed the configured maximum");
            self.modem.socket_close().await;
            self.phase = RequestPhase::Error;
            return;
        }

        let parsed = match self.txn.as_ref().map(|t| ResponseHead::parse(&t.response)) {
            Some(Some(result)) => result,
            Some(None) => {
                // Head still incomplete; enforce the phase timeout and
                // notice a peer that went away.
                let timed_out = self
                    .txn
                    .as_ref()
                    .map(|t| t.phase_started.elapsed() > Self::cfg_ms(self.http.header_timeout_ms))
                    .unwrap_or(false);
                if timed_out {
                    warn!("header receive timeout");
                    self.modem.socket_close().await;
                    self.phase = RequestPhase::Error;
                } else if !self.modem.socket_connected() {
                    warn!("disconnected while waiting for headers");
                    self.phase = RequestPhase::Error;
                }
                return;
            }
            None => {
                self.active = false;
                self.phase = RequestPhase::Idle;
                return;
            }
        };

        match parsed {
            Ok(head) => {
                let success = head.is_success();
                let Some(txn) = self.txn.as_mut() else {
                    return;
                };
                txn.status = head.status;
                txn.content_length = head.content_length;
                txn.chunked = head.chunked;
                txn.response = head.leftover;
                txn.body_bytes = txn.response.len();
                debug!(label = %txn.request.label, status = txn.status, "headers received");

                let body_expected =
                    txn.chunked || txn.content_length.unwrap_or(0) > 0 || txn.body_bytes > 0;
                txn.phase_started = Instant::now();
                if success && !body_expected {
                    self.phase = RequestPhase::Processing;
                } else {
                    // Non-2xx responses still have their body read, for
                    // diagnostics in the processing step.
                    self.phase = RequestPhase::ReceivingBody;
                }
            }
            Err(err) => {
                warn!(error = %err, "unparseable response head");
                if let Some(txn) = self.txn.as_mut() {
                    txn.status = 0;
                }
                self.modem.socket_close().await;
                self.phase = RequestPhase::Error;
            }
        }
    }

    async fn step_body(&mut self) {
        if !self.drain_socket(self.http.body_buffer).await {
            warn!("response body exceeds the configured buffer");
            self.modem.socket_close().await;
            self.phase = RequestPhase::Error;
            return;
        }

        let connected = self.modem.socket_connected();
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };

        let mut complete = false;
        if txn.chunked {
            // Cheap probe first; the full unwrap only runs once the terminal
            // chunk marker has arrived.
            if chunked_terminator_seen(&txn.response) {
                if let Some(decoded) = decode_chunked(&txn.response) {
                    txn.response = decoded;
                    complete = true;
                }
            }
            if !complete && !connected && txn.body_bytes > 0 {
                debug!("peer closed during chunked body; keeping what arrived");
                complete = true;
            }
        } else if let Some(length) = txn.content_length {
            if txn.body_bytes >= length {
                complete = true;
            }
        } else if !connected {
            // No length and no chunking: the close delimits the body.
            complete = true;
        }

        if complete {
            debug!(
                label = %txn.request.label,
                bytes = txn.body_bytes,
                "body received"
            );
            self.phase = RequestPhase::Processing;
            return;
        }

        if txn.phase_started.elapsed() > Self::cfg_ms(self.http.body_timeout_ms) {
            if txn.body_bytes > 0 && (200..300).contains(&txn.status) {
                // Premature drops are routine on a noisy link; a partial 2xx
                // body is still worth handing to the decoder.
                debug!("body timeout with partial 2xx data; processing anyway");
                self.phase = RequestPhase::Processing;
            } else {
                warn!(read = txn.body_bytes, "body receive timeout");
                self.phase = RequestPhase::Error;
            }
            return;
        }

        if !connected {
            if txn.body_bytes > 0
                || ((200..300).contains(&txn.status) && txn.content_length.unwrap_or(0) == 0)
            {
                self.phase = RequestPhase::Processing;
            } else {
                warn!(read = txn.body_bytes, "disconnected before body completed");
                self.phase = RequestPhase::Error;
            }
        }
    }

    async fn step_process(&mut self) {
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        let body = String::from_utf8_lossy(&txn.response).into_owned();
        let mut accepted = false;

        if (200..300).contains(&txn.status) {
            match txn.request.callback.as_mut() {
                Some(cb) => match serde_json::from_str::<serde_json::Value>(&body) {
                    Ok(value) => {
                        accepted = cb(&value);
                        if !accepted {
                            warn!(label = %txn.request.label, "callback rejected payload");
                        }
                    }
                    Err(err) => {
                        warn!(label = %txn.request.label, error = %err, "response decode failed");
                    }
                },
                None => accepted = true,
            }
        } else {
            warn!(label = %txn.request.label, status = txn.status, "http error response");
            if txn.status != 0 {
                // Decoded error bodies still reach the callback for
                // diagnostics; the transaction stays failed regardless.
                if let Some(cb) = txn.request.callback.as_mut() {
                    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
                        let _ = cb(&value);
                    }
                }
            }
        }

        self.modem.socket_close().await;
        self.phase = if accepted {
            RequestPhase::Complete
        } else {
            RequestPhase::Error
        };
    }

    async fn step_complete(&mut self) {
        if let Some(txn) = &self.txn {
            debug!(label = %txn.request.label, "transaction complete");
        }
        self.modem.socket_close().await;
        self.active = false;
        self.phase = RequestPhase::Idle;
        self.txn = None;
    }

    async fn step_error(&mut self) {
        self.modem.socket_close().await;
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };

        if is_retryable_status(txn.status) && txn.retries < self.http.max_retries {
            txn.retries += 1;
            txn.retry_at = Some(Instant::now() + Self::cfg_ms(self.http.retry_delay_ms));
            debug!(
                label = %txn.request.label,
                status = txn.status,
                attempt = txn.retries,
                "retryable failure; waiting before retry"
            );
            self.phase = RequestPhase::RetryWait;
        } else {
            warn!(
                label = %txn.request.label,
                status = txn.status,
                retries = txn.retries,
                "transaction failed"
            );
            self.active = false;
            self.phase = RequestPhase::Idle;
            self.txn = None;
        }
    }

    fn step_retry_wait(&mut self) {
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        let due = txn.retry_at.map(|at| Instant::now() >= at).unwrap_or(true);
        if due {
            debug!(label = %txn.request.label, attempt = txn.retries, "retrying");
            txn.reset_attempt();
            self.phase = RequestPhase::Connecting;
        }
    }
}

// ============================================================================
// TRANSPORT IMPL
// ============================================================================

impl<M: Modem> Transport for CellularTransport<M> {
    async fn connect(&mut self) -> bool {
        if self.link_state == LinkState::Disabled {
            debug!("starting cellular bring-up");
            self.transition_to(LinkState::NotStarted);
        } else {
            debug!(state = %self.link_state, "cellular bring-up already running");
        }
        true
    }

    async fn disconnect(&mut self) {
        if self.link_state == LinkState::Disabled {
            return;
        }
        debug!("disconnecting cellular link");
        self.modem.socket_close().await;
        self.modem.detach().await;
        self.transition_to(LinkState::Disabled);
    }

    fn is_connected(&self) -> bool {
        self.link_state.is_operational()
    }

    async fn start_request(&mut self, request: HttpRequest) -> bool {
        if self.active {
            warn!(label = %request.label, "request rejected: transaction already active");
            return false;
        }
        if !self.is_connected() {
            warn!(label = %request.label, "request rejected: cellular link not operational");
            return false;
        }
        let target = match ParsedUrl::parse(
            &request.url,
            self.http.max_host_len,
            self.http.max_path_len,
        ) {
            Ok(target) => target,
            Err(err) => {
                warn!(label = %request.label, error = %err, "request rejected");
                return false;
            }
        };

        debug!(label = %request.label, method = %request.method, url = %request.url,
               "starting cellular http exchange");
        self.txn = Some(Transaction::new(request, target));
        self.active = true;
        self.phase = RequestPhase::Connecting;
        true
    }

    async fn poll(&mut self) {
        self.advance_link().await;
        self.pump_request().await;
    }

    fn set_auth_token(&mut self, token: &str) {
        self.auth_token = token.to_string();
    }

    fn status_string(&self) -> String {
        if self.is_connected() {
            format!("Cellular: Connected (sig {})", self.last_signal)
        } else {
            format!(
                "Cellular: {} (sig {}, resets {}, attach-fail {})",
                self.link_state, self.last_signal, self.modem_resets, self.attach_failures
            )
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Cellular
    }
}
