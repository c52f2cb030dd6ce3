// Configuration Tests
// Defaults, builders, validation and TOML loading

use std::io::Write;

use greenlink::config::{
    CellularConfig, ConfigError, ControllerConfig, HttpConfig, WifiConfig,
};
use greenlink::transport::TransportPreference;

// ============================================================================
// DEFAULTS AND BUILDERS
// ============================================================================

#[test]
fn test_http_defaults_match_reference_values() {
    let http = HttpConfig::default();
    assert_eq!(http.total_timeout_ms, 60_000);
    assert_eq!(http.connect_timeout_ms, 20_000);
    assert_eq!(http.body_timeout_ms, 30_000);
    assert_eq!(http.retry_delay_ms, 5_000);
    assert_eq!(http.max_retries, 3);
    assert_eq!(http.request_buffer, 512);
    assert_eq!(http.max_header_bytes, 1024);
    assert_eq!(http.body_buffer, 1024);
    assert!(http.user_agent.starts_with("greenlink/"));
}

#[test]
fn test_http_builder_chain() {
    let http = HttpConfig::new()
        .with_max_retries(1)
        .with_retry_delay_ms(50)
        .with_total_timeout_ms(2_000)
        .with_body_buffer(4096);
    assert_eq!(http.max_retries, 1);
    assert_eq!(http.retry_delay_ms, 50);
    assert_eq!(http.total_timeout_ms, 2_000);
    assert_eq!(http.body_buffer, 4096);
}

#[test]
fn test_cellular_defaults_and_builders() {
    let cellular = CellularConfig::new()
        .with_apn("iot.provider")
        .with_credentials("user", "pass")
        .with_sim_pin("0000")
        .with_max_modem_resets(5)
        .with_max_attach_failures(2);
    assert_eq!(cellular.apn, "iot.provider");
    assert_eq!(cellular.user, "user");
    assert_eq!(cellular.sim_pin, "0000");
    assert_eq!(cellular.max_modem_resets, 5);
    assert_eq!(cellular.max_attach_failures, 2);
    assert_eq!(cellular.attach_timeout_ms, 60_000);
    assert_eq!(cellular.fail_recovery_timeout_ms, 300_000);
}

#[test]
fn test_wifi_defaults_and_builders() {
    let wifi = WifiConfig::new()
        .with_network("greenhouse", "secret")
        .with_connect_attempts(5);
    assert_eq!(wifi.ssid, "greenhouse");
    assert_eq!(wifi.connect_attempts, 5);
    assert_eq!(wifi.attempt_timeout_ms, 20_000);
    assert_eq!(wifi.retry_delay_ms, 1_000);
}

#[test]
fn test_controller_defaults() {
    let config = ControllerConfig::default();
    assert_eq!(config.greenhouse_id, 1);
    assert_eq!(config.preference, TransportPreference::WifiPreferred);
    assert!(config.auth_token.is_empty());
}

// ============================================================================
// VALIDATION
// ============================================================================

fn valid_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.wifi.ssid = "greenhouse".to_string();
    config.cellular.apn = "iot.provider".to_string();
    config
}

fn assert_invalid(config: &ControllerConfig, needle: &str) {
    let err = config.validate().unwrap_err();
    let message = err.to_string();
    assert!(
        message.contains(needle),
        "expected error containing {needle:?}, got: {message}"
    );
}

#[test]
fn test_valid_config_passes() {
    valid_config().validate().unwrap();
}

#[test]
fn test_missing_ssid_rejected_when_wifi_is_used() {
    let mut config = valid_config();
    config.wifi.ssid.clear();
    assert_invalid(&config, "wifi.ssid is empty");
}

#[test]
fn test_missing_ssid_allowed_for_cellular_only() {
    let mut config = valid_config();
    config.preference = TransportPreference::CellularOnly;
    config.wifi.ssid.clear();
    config.validate().unwrap();
}

#[test]
fn test_missing_apn_rejected_when_cellular_is_used() {
    let mut config = valid_config();
    config.preference = TransportPreference::CellularPreferred;
    config.cellular.apn.clear();
    assert_invalid(&config, "cellular.apn is empty");
}

#[test]
fn test_missing_apn_allowed_for_wifi_only() {
    let mut config = valid_config();
    config.preference = TransportPreference::WifiOnly;
    config.cellular.apn.clear();
    config.validate().unwrap();
}

#[test]
fn test_bad_base_url_rejected() {
    let mut config = valid_config();
    config.api_base_url = "not-a-url".to_string();
    assert_invalid(&config, "no scheme separator");
}

#[test]
fn test_zero_limits_rejected() {
    let mut config = valid_config();
    config.wifi.connect_attempts = 0;
    config.cellular.max_modem_resets = 0;
    config.http.request_buffer = 64;
    config.http.body_buffer = 0;

    let err = config.validate().unwrap_err();
    let message = err.to_string();
    // Every violation is reported, not just the first.
    assert!(message.contains("connect_attempts"));
    assert!(message.contains("max_modem_resets"));
    assert!(message.contains("request_buffer"));
    assert!(message.contains("body_buffer"));
}

// ============================================================================
// TOML LOADING
// ============================================================================

#[test]
fn test_partial_toml_falls_back_to_defaults() {
    let toml_str = r#"
api_base_url = "http://api.example.com"
auth_token = "tok"
preference = "cellular_only"

[cellular]
apn = "iot.provider"
"#;
    let config: ControllerConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.preference, TransportPreference::CellularOnly);
    assert_eq!(config.cellular.apn, "iot.provider");
    // Untouched sections keep their defaults.
    assert_eq!(config.http.max_retries, 3);
    assert_eq!(config.cellular.max_modem_resets, 3);
    config.validate().unwrap();
}

#[test]
fn test_toml_round_trip() {
    let original = valid_config();
    let rendered = toml::to_string(&original).unwrap();
    let reparsed: ControllerConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed.wifi.ssid, original.wifi.ssid);
    assert_eq!(reparsed.cellular.apn, original.cellular.apn);
    assert_eq!(reparsed.preference, original.preference);
    assert_eq!(reparsed.http.total_timeout_ms, original.http.total_timeout_ms);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
greenhouse_id = 2
api_base_url = "http://api.example.com"
preference = "wifi_preferred"

[wifi]
ssid = "gh2"
password = "pw"

[cellular]
apn = "iot.provider"
"#
    )
    .unwrap();

    let config = ControllerConfig::load(file.path()).unwrap();
    assert_eq!(config.greenhouse_id, 2);
    assert_eq!(config.wifi.ssid, "gh2");
}

#[test]
fn test_load_missing_file_is_io_error() {
    let err = ControllerConfig::load(std::path::Path::new("/nonexistent/greenlink.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_load_unparseable_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "this is not toml [[[").unwrap();
    let err = ControllerConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_load_invalid_config_is_validation_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
api_base_url = "http://api.example.com"
preference = "wifi_only"
"#
    )
    .unwrap();
    let err = ControllerConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}
