// WiFi Transport
// Station-mode link with a blocking-per-call HTTP client. The non-blocking
// contract survives because the blocking exchange happens inside a single
// FSM transition guarded by the overall timeout.

use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{HttpConfig, WifiConfig};
use crate::platform::Watchdog;
use crate::transport::http::{is_retryable_status, ParsedUrl};
use crate::transport::{HttpMethod, HttpRequest, RequestPhase, Transport, TransportKind};

// ============================================================================
// HARDWARE ABSTRACTION
// ============================================================================

/// Station-mode WiFi radio surface.
#[allow(async_fn_in_trait)]
pub trait WifiStation {
    /// Begin associating with the given network. Association completes (or
    /// not) asynchronously; poll `is_associated()`.
    async fn begin(&mut self, ssid: &str, password: &str);

    async fn disconnect(&mut self);

    fn is_associated(&self) -> bool;

    fn local_ip(&self) -> Option<String>;
}

/// HTTP client in the shape of the embedded clients this engine was built
/// around: `begin` binds a URL, `send` performs connect + request + response
/// headers as one blocking call and returns the status code (non-positive on
/// client-side failure), `body` reads the response payload, `end` releases
/// the connection.
#[allow(async_fn_in_trait)]
pub trait HttpDriver {
    async fn begin(&mut self, url: &str) -> bool;

    fn add_header(&mut self, name: &str, value: &str);

    async fn send(&mut self, method: HttpMethod, payload: Option<&str>) -> i32;

    async fn body(&mut self) -> String;

    async fn end(&mut self);
}

// ============================================================================
// TRANSACTION STATE
// ============================================================================

struct WifiTransaction {
    request: HttpRequest,
    started: Instant,
    retry_at: Option<Instant>,
    retries: u8,
    status: i32,
}

impl WifiTransaction {
    fn new(request: HttpRequest) -> Self {
        Self {
            request,
            started: Instant::now(),
            retry_at: None,
            retries: 0,
            status: 0,
        }
    }
}

// ============================================================================
// WIFI TRANSPORT
// ============================================================================

pub struct WifiTransport<S: WifiStation, D: HttpDriver> {
    station: S,
    driver: D,
    config: WifiConfig,
    http: HttpConfig,
    auth_token: String,
    watchdog: Option<Box<dyn Watchdog>>,

    phase: RequestPhase,
    active: bool,
    txn: Option<WifiTransaction>,
}

impl<S: WifiStation, D: HttpDriver> WifiTransport<S, D> {
    pub fn new(station: S, driver: D, config: WifiConfig, http: HttpConfig, auth_token: &str) -> Self {
        Self {
            station,
            driver,
            config,
            http,
            auth_token: auth_token.to_string(),
            watchdog: None,
            phase: RequestPhase::Idle,
            active: false,
            txn: None,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Box<dyn Watchdog>) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Swap station credentials (e.g. after a config-portal update). Takes
    /// effect on the next `connect()`.
    pub fn set_credentials(&mut self, ssid: &str, password: &str) {
        self.config.ssid = ssid.to_string();
        self.config.password = password.to_string();
    }

    pub fn request_phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn request_active(&self) -> bool {
        self.active
    }

    pub fn retry_count(&self) -> u8 {
        self.txn.as_ref().map(|t| t.retries).unwrap_or(0)
    }

    pub fn ip_address(&self) -> Option<String> {
        self.station.local_ip()
    }

    fn feed_watchdog(&self) {
        if let Some(wd) = &self.watchdog {
            wd.feed();
        }
    }

    // ------------------------------------------------------------------
    // Request FSM steps
    // ------------------------------------------------------------------

    async fn step_begin(&mut self) {
        let Some(txn) = self.txn.as_ref() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        let url = txn.request.url.clone();
        let needs_auth = txn.request.needs_auth;
        let has_payload = txn.request.payload.is_some();
        let is_post = txn.request.method == HttpMethod::Post;

        if self.driver.begin(&url).await {
            if needs_auth && !self.auth_token.is_empty() {
                let value = format!("Bearer {}", self.auth_token);
                self.driver.add_header("Authorization", &value);
            }
            let user_agent = self.http.user_agent.clone();
            self.driver.add_header("User-Agent", &user_agent);
            if has_payload && is_post {
                self.driver.add_header("Content-Type", "application/json");
            }
            self.phase = RequestPhase::Sending;
        } else {
            warn!(url = %url, "http client begin failed");
            self.phase = RequestPhase::Error;
        }
    }

    async fn step_send(&mut self) {
        let Some(txn) = self.txn.as_ref() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };
        let method = txn.request.method;
        let payload = txn.request.payload.clone();

        // One blocking call: connect + send + response headers.
        let status = self.driver.send(method, payload.as_deref()).await;
        let Some(txn) = self.txn.as_mut() else {
            return;
        };
        txn.status = status;
        if status > 0 {
            debug!(label = %txn.request.label, status, "response status received");
            self.phase = RequestPhase::Processing;
        } else {
            warn!(label = %txn.request.label, code = status, "http client send failed");
            self.phase = RequestPhase::Error;
        }
    }

    async fn step_process(&mut self) {
        let status = self.txn.as_ref().map(|t| t.status).unwrap_or(0);
        let body = self.driver.body().await;
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };

        let mut accepted = false;
        if (200..300).contains(&status) {
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
            warn!(label = %txn.request.label, status, body = %body, "http error response");
        }

        self.driver.end().await;
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
        self.driver.end().await;
        self.active = false;
        self.phase = RequestPhase::Idle;
        self.txn = None;
    }

    async fn step_error(&mut self) {
        self.driver.end().await;
        let Some(txn) = self.txn.as_mut() else {
            self.active = false;
            self.phase = RequestPhase::Idle;
            return;
        };

        if is_retryable_status(txn.status) && txn.retries < self.http.max_retries {
            txn.retries += 1;
            txn.retry_at = Some(Instant::now() + Duration::from_millis(self.http.retry_delay_ms));
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
            txn.status = 0;
            txn.retry_at = None;
            txn.started = Instant::now();
            self.phase = RequestPhase::Connecting;
        }
    }
}

// ============================================================================
// TRANSPORT IMPL
// ============================================================================

impl<S: WifiStation, D: HttpDriver> Transport for WifiTransport<S, D> {
    async fn connect(&mut self) -> bool {
        if self.config.ssid.is_empty() {
            warn!("no SSID configured");
            return false;
        }

        for attempt in 1..=self.config.connect_attempts {
            debug!(ssid = %self.config.ssid, attempt, total = self.config.connect_attempts,
                   "wifi association attempt");
            self.station.disconnect().await;
            sleep(Duration::from_millis(100)).await;
            let (ssid, password) = (self.config.ssid.clone(), self.config.password.clone());
            self.station.begin(&ssid, &password).await;

            let deadline = Instant::now() + Duration::from_millis(self.config.attempt_timeout_ms);
            while Instant::now() < deadline {
                self.feed_watchdog();
                if self.station.is_associated() {
                    info!(ip = ?self.station.local_ip(), "wifi associated");
                    return true;
                }
                sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            }

            warn!(attempt, "wifi association attempt timed out");
            self.station.disconnect().await;
            if attempt < self.config.connect_attempts {
                // Fixed short delay between attempts. No backoff.
                sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        warn!("all wifi association attempts failed");
        false
    }

    async fn disconnect(&mut self) {
        debug!("disconnecting wifi");
        self.station.disconnect().await;
    }

    fn is_connected(&self) -> bool {
        self.station.is_associated()
    }

    async fn start_request(&mut self, request: HttpRequest) -> bool {
        if self.active {
            warn!(label = %request.label, "request rejected: transaction already active");
            return false;
        }
        if !self.is_connected() {
            warn!(label = %request.label, "request rejected: wifi not associated");
            return false;
        }
        if let Err(err) = ParsedUrl::parse(
            &request.url,
            self.http.max_host_len,
            self.http.max_path_len,
        ) {
            warn!(label = %request.label, error = %err, "request rejected");
            return false;
        }

        debug!(label = %request.label, method = %request.method, url = %request.url,
               "starting wifi http exchange");
        self.txn = Some(WifiTransaction::new(request));
        self.active = true;
        self.phase = RequestPhase::Connecting;
        true
    }

    async fn poll(&mut self) {
        if !self.active {
            return;
        }
        self.feed_watchdog();

        // RetryWait is a pure timer gate; only live phases age against the
        // overall ceiling.
        if self.phase.is_in_flight() && self.phase != RequestPhase::RetryWait {
            let overall = self.txn.as_ref().map(|t| t.started.elapsed()).unwrap_or_default();
            if overall > Duration::from_millis(self.http.total_timeout_ms) {
                warn!("http exchange exceeded the overall timeout");
                self.driver.end().await;
                self.phase = RequestPhase::Error;
            }
        }

        match self.phase {
            RequestPhase::Idle => self.active = false,
            RequestPhase::Connecting => self.step_begin().await,
            RequestPhase::Sending => self.step_send().await,
            RequestPhase::Processing => self.step_process().await,
            RequestPhase::Complete => self.step_complete().await,
            RequestPhase::Error => self.step_error().await,
            RequestPhase::RetryWait => self.step_retry_wait(),
            // The blocking client never surfaces these two phases.
            RequestPhase::ReceivingHeaders | RequestPhase::ReceivingBody => {
                self.phase = RequestPhase::Error;
            }
        }
    }

    fn set_auth_token(&mut self, token: &str) {
        self.auth_token = token.to_string();
    }

    fn status_string(&self) -> String {
        if self.is_connected() {
            match self.station.local_ip() {
                Some(ip) => format!("WiFi: Connected ({ip})"),
                None => "WiFi: Connected".to_string(),
            }
        } else {
            "WiFi: Disconnected".to_string()
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Wifi
    }
}
