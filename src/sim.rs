// Hardware Simulator
// In-process modem and WiFi backends so the full dual-stack loop can run on
// a workstation: scripted flakiness instead of a real radio.

use chrono::Utc;
use rand::Rng;

use crate::transport::{
    HttpDriver, HttpMethod, Modem, RegistrationStatus, SimStatus, WifiStation,
};

// ============================================================================
// PROFILES
// ============================================================================

/// How badly the simulated hardware misbehaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimProfile {
    /// Liveness probes that fail before the serial interface "comes up".
    pub boot_probe_failures: u32,
    /// Probability a modem reset fails.
    pub reset_fail_prob: f64,
    /// Probability a context activation attempt fails.
    pub attach_fail_prob: f64,
    /// Per-check probability an established link drops.
    pub drop_prob: f64,
    /// Per-exchange probability a socket connect is refused.
    pub connect_fail_prob: f64,
}

impl SimProfile {
    /// Everything works first try.
    pub fn reliable() -> Self {
        Self {
            boot_probe_failures: 0,
            reset_fail_prob: 0.0,
            attach_fail_prob: 0.0,
            drop_prob: 0.0,
            connect_fail_prob: 0.0,
        }
    }

    /// A cheap modem on a bad day. Exercises every recovery path.
    pub fn flaky() -> Self {
        Self {
            boot_probe_failures: 2,
            reset_fail_prob: 0.2,
            attach_fail_prob: 0.3,
            drop_prob: 0.05,
            connect_fail_prob: 0.1,
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "flaky" => Self::flaky(),
            _ => Self::reliable(),
        }
    }
}

impl Default for SimProfile {
    fn default() -> Self {
        Self::reliable()
    }
}

/// Canned backend answer good enough for every controller callback: accepts
/// posts, carries empty relay commands and the current server time.
fn canned_http_response_body() -> String {
    serde_json::json!({
        "ok": true,
        "epoch": Utc::now().timestamp(),
        "exhaust_on": false,
        "dehumidifier_on": false,
        "blower_on": false,
    })
    .to_string()
}

// ============================================================================
// SIMULATED MODEM
// ============================================================================

pub struct SimModem {
    profile: SimProfile,
    probes_failed: u32,
    powered: bool,
    attached: bool,
    socket_open: bool,
    last_request: Vec<u8>,
    response: Vec<u8>,
    read_pos: usize,
}

impl SimModem {
    pub fn new(profile: SimProfile) -> Self {
        Self {
            profile,
            probes_failed: 0,
            powered: false,
            attached: false,
            socket_open: false,
            last_request: Vec::new(),
            response: Vec::new(),
            read_pos: 0,
        }
    }

    /// The raw bytes of the most recent request, for diagnostics.
    pub fn last_request(&self) -> &[u8] {
        &self.last_request
    }
}

impl Modem for SimModem {
    async fn probe(&mut self) -> bool {
        if self.probes_failed < self.profile.boot_probe_failures {
            self.probes_failed += 1;
            return false;
        }
        true
    }

    async fn soft_reset(&mut self) -> bool {
        if rand::thread_rng().gen_bool(self.profile.reset_fail_prob) {
            return false;
        }
        self.powered = true;
        self.attached = false;
        true
    }

    async fn hard_reset(&mut self) -> bool {
        // The power cycle clears the boot stall as well.
        self.probes_failed = self.profile.boot_probe_failures;
        self.soft_reset().await
    }

    async fn sim_status(&mut self) -> SimStatus {
        if self.powered {
            SimStatus::Ready
        } else {
            SimStatus::Error
        }
    }

    async fn unlock_sim(&mut self, _pin: &str) -> bool {
        true
    }

    async fn enable_tls(&mut self) -> bool {
        true
    }

    async fn registration(&mut self) -> RegistrationStatus {
        if self.powered {
            RegistrationStatus::Home
        } else {
            RegistrationStatus::Unknown
        }
    }

    async fn is_attached(&mut self) -> bool {
        if self.attached && rand::thread_rng().gen_bool(self.profile.drop_prob) {
            self.attached = false;
        }
        self.attached
    }

    async fn attach(&mut self, _apn: &str, _user: &str, _password: &str) -> bool {
        if !self.powered || rand::thread_rng().gen_bool(self.profile.attach_fail_prob) {
            return false;
        }
        self.attached = true;
        true
    }

    async fn detach(&mut self) {
        self.attached = false;
        self.socket_open = false;
    }

    async fn signal_quality(&mut self) -> i16 {
        if self.attached {
            rand::thread_rng().gen_range(12..28)
        } else {
            crate::session::SIGNAL_UNKNOWN
        }
    }

    async fn local_ip(&mut self) -> Option<String> {
        self.attached.then(|| "10.64.82.1".to_string())
    }

    async fn socket_connect(&mut self, _host: &str, _port: u16) -> bool {
        if !self.attached || rand::thread_rng().gen_bool(self.profile.connect_fail_prob) {
            return false;
        }
        self.socket_open = true;
        self.last_request.clear();
        let body = canned_http_response_body();
        self.response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes();
        self.read_pos = 0;
        true
    }

    async fn socket_write(&mut self, data: &[u8]) -> usize {
        if !self.socket_open {
            return 0;
        }
        self.last_request.extend_from_slice(data);
        data.len()
    }

    async fn socket_read(&mut self, buf: &mut [u8]) -> usize {
        if !self.socket_open || self.read_pos >= self.response.len() {
            return 0;
        }
        let n = buf.len().min(self.response.len() - self.read_pos);
        buf[..n].copy_from_slice(&self.response[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        n
    }

    fn socket_connected(&self) -> bool {
        self.socket_open
    }

    async fn socket_close(&mut self) {
        self.socket_open = false;
    }
}

// ============================================================================
// SIMULATED WIFI STATION
// ============================================================================

pub struct SimStation {
    /// Association attempts that fail before one sticks.
    fail_first_attempts: u32,
    attempts: u32,
    associated: bool,
}

impl SimStation {
    pub fn new(fail_first_attempts: u32) -> Self {
        Self {
            fail_first_attempts,
            attempts: 0,
            associated: false,
        }
    }
}

impl WifiStation for SimStation {
    async fn begin(&mut self, _ssid: &str, _password: &str) {
        self.attempts += 1;
        self.associated = self.attempts > self.fail_first_attempts;
    }

    async fn disconnect(&mut self) {
        self.associated = false;
    }

    fn is_associated(&self) -> bool {
        self.associated
    }

    fn local_ip(&self) -> Option<String> {
        self.associated.then(|| "192.168.4.17".to_string())
    }
}

// ============================================================================
// SIMULATED HTTP DRIVER
// ============================================================================

pub struct SimHttpDriver {
    /// Probability one exchange fails client-side (status 0).
    pub fail_prob: f64,
    bound: bool,
    body: String,
}

impl SimHttpDriver {
    pub fn new(fail_prob: f64) -> Self {
        Self {
            fail_prob,
            bound: false,
            body: String::new(),
        }
    }
}

impl HttpDriver for SimHttpDriver {
    async fn begin(&mut self, _url: &str) -> bool {
        self.bound = true;
        true
    }

    fn add_header(&mut self, _name: &str, _value: &str) {}

    async fn send(&mut self, _method: HttpMethod, _payload: Option<&str>) -> i32 {
        if !self.bound {
            return -1;
        }
        if rand::thread_rng().gen_bool(self.fail_prob) {
            return 0;
        }
        self.body = canned_http_response_body();
        200
    }

    async fn body(&mut self) -> String {
        std::mem::take(&mut self.body)
    }

    async fn end(&mut self) {
        self.bound = false;
        self.body.clear();
    }
}
