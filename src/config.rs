// Runtime Configuration
// Immutable per-component configuration with defaults matching the firmware
// reference values. Everything a test wants to shrink is a field here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::transport::TransportPreference;

// ============================================================================
// HTTP ENGINE CONFIG
// ============================================================================

/// Timeouts, retry limits and buffer bounds for one HTTP transaction engine.
/// Shared by both transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall ceiling for a whole transaction attempt.
    pub total_timeout_ms: u64,
    /// Socket connect phase.
    pub connect_timeout_ms: u64,
    /// Sending the request and waiting for the server to start answering.
    pub response_timeout_ms: u64,
    /// Receiving response headers.
    pub header_timeout_ms: u64,
    /// Receiving the response body.
    pub body_timeout_ms: u64,
    /// Pause before re-running a retryable failed attempt.
    pub retry_delay_ms: u64,
    /// Maximum retries per transaction (total attempts = retries + 1).
    pub max_retries: u8,
    /// Outbound buffer: request line + headers + payload.
    pub request_buffer: usize,
    /// Ceiling on accumulated response headers.
    pub max_header_bytes: usize,
    /// Ceiling on the accumulated response body.
    pub body_buffer: usize,
    pub max_host_len: usize,
    pub max_path_len: usize,
    /// Sent as `User-Agent: <value>`.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            total_timeout_ms: 60_000,
            connect_timeout_ms: 20_000,
            response_timeout_ms: 20_000,
            header_timeout_ms: 20_000,
            body_timeout_ms: 30_000,
            retry_delay_ms: 5_000,
            max_retries: 3,
            request_buffer: 512,
            max_header_bytes: 1024,
            body_buffer: 1024,
            max_host_len: 257,
            max_path_len: 257,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn with_total_timeout_ms(mut self, ms: u64) -> Self {
        self.total_timeout_ms = ms;
        self
    }

    pub fn with_body_buffer(mut self, bytes: usize) -> Self {
        self.body_buffer = bytes;
        self
    }
}

// ============================================================================
// CELLULAR CONFIG
// ============================================================================

/// Carrier credentials plus the connectivity FSM's timing and escalation
/// limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CellularConfig {
    pub apn: String,
    pub user: String,
    pub password: String,
    /// SIM PIN; empty means the SIM is not locked.
    pub sim_pin: String,

    /// Wait for the modem serial interface to come up.
    pub serial_wait_timeout_ms: u64,
    /// Network registration / context activation window per attempt.
    pub attach_timeout_ms: u64,
    /// Liveness re-verification cadence while operational.
    pub check_interval_ms: u64,
    /// Backoff before a reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Cooldown before another full reset cycle.
    pub restart_cooldown_ms: u64,
    /// Dwell in the failed state before self-demoting to disabled.
    pub fail_recovery_timeout_ms: u64,

    /// Consecutive reset failures before the modem is declared dead.
    pub max_modem_resets: u8,
    /// Consecutive attach failures before escalating to a modem restart.
    pub max_attach_failures: u8,
    /// Reconnect attempts before escalating to a modem restart.
    pub max_reconnect_attempts: u8,
}

impl Default for CellularConfig {
    fn default() -> Self {
        Self {
            apn: String::new(),
            user: String::new(),
            password: String::new(),
            sim_pin: String::new(),
            serial_wait_timeout_ms: 30_000,
            attach_timeout_ms: 60_000,
            check_interval_ms: 30_000,
            reconnect_delay_ms: 15_000,
            restart_cooldown_ms: 60_000,
            fail_recovery_timeout_ms: 300_000,
            max_modem_resets: 3,
            max_attach_failures: 5,
            max_reconnect_attempts: 5,
        }
    }
}

impl CellularConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_apn(mut self, apn: &str) -> Self {
        self.apn = apn.to_string();
        self
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_sim_pin(mut self, pin: &str) -> Self {
        self.sim_pin = pin.to_string();
        self
    }

    pub fn with_max_modem_resets(mut self, max: u8) -> Self {
        self.max_modem_resets = max;
        self
    }

    pub fn with_max_attach_failures(mut self, max: u8) -> Self {
        self.max_attach_failures = max;
        self
    }
}

// ============================================================================
// WIFI CONFIG
// ============================================================================

/// Station credentials and the bounded connect-attempt loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    /// Total association attempts per `connect()` call.
    pub connect_attempts: u32,
    /// Per-attempt association timeout.
    pub attempt_timeout_ms: u64,
    /// Association poll cadence within an attempt.
    pub poll_interval_ms: u64,
    /// Fixed delay between attempts. No backoff.
    pub retry_delay_ms: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            connect_attempts: 3,
            attempt_timeout_ms: 20_000,
            poll_interval_ms: 500,
            retry_delay_ms: 1_000,
        }
    }
}

impl WifiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, ssid: &str, password: &str) -> Self {
        self.ssid = ssid.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }
}

// ============================================================================
// CONTROLLER CONFIG
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

/// Top-level configuration for one controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Which greenhouse this controller serves.
    pub greenhouse_id: u32,
    pub api_base_url: String,
    /// Bearer token for authenticated API calls.
    pub auth_token: String,
    pub preference: TransportPreference,
    pub wifi: WifiConfig,
    pub cellular: CellularConfig,
    pub http: HttpConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            greenhouse_id: 1,
            api_base_url: "http://localhost:8080".to_string(),
            auth_token: String::new(),
            preference: TransportPreference::WifiPreferred,
            wifi: WifiConfig::default(),
            cellular: CellularConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole tree, reporting every violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.api_base_url.is_empty() {
            errors.push("api_base_url is empty".to_string());
        } else if !self.api_base_url.contains("://") {
            errors.push(format!(
                "api_base_url '{}' has no scheme separator",
                self.api_base_url
            ));
        }

        let uses_wifi = self.preference != TransportPreference::CellularOnly;
        let uses_cellular = self.preference != TransportPreference::WifiOnly;

        if uses_wifi && self.wifi.ssid.is_empty() {
            errors.push(format!(
                "wifi.ssid is empty but preference {:?} uses the WiFi link",
                self.preference
            ));
        }
        if uses_cellular && self.cellular.apn.is_empty() {
            errors.push(format!(
                "cellular.apn is empty but preference {:?} uses the cellular link",
                self.preference
            ));
        }

        if self.wifi.connect_attempts == 0 {
            errors.push("wifi.connect_attempts must be at least 1".to_string());
        }
        if self.cellular.max_modem_resets == 0 {
            errors.push("cellular.max_modem_resets must be at least 1".to_string());
        }
        if self.http.request_buffer < 128 {
            errors.push(format!(
                "http.request_buffer {} is too small to hold request headers",
                self.http.request_buffer
            ));
        }
        if self.http.body_buffer == 0 {
            errors.push("http.body_buffer must be non-zero".to_string());
        }
        if self.http.max_header_bytes == 0 {
            errors.push("http.max_header_bytes must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
