// Remote API Layer Tests
// Request construction and decoding callbacks for the controller's exchanges

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};

use greenlink::api::{ApiClient, EnvironmentReading};
use greenlink::session::SessionState;
use greenlink::transport::HttpMethod;

fn client() -> ApiClient {
    ApiClient::new("http://api.example.com/", 3)
}

fn reading() -> EnvironmentReading {
    EnvironmentReading {
        greenhouse_id: 3,
        taken_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        temperature_c: 24.5,
        humidity_pct: 61.0,
        light_lux: 5400.0,
    }
}

// ============================================================================
// READINGS POST
// ============================================================================

#[test]
fn test_post_readings_shape() {
    let request = client().post_readings(&[reading()]).expect("serializable");
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "http://api.example.com/api/readings");
    assert_eq!(request.label, "READINGS_POST");
    assert!(request.needs_auth);

    let payload: serde_json::Value =
        serde_json::from_str(request.payload.as_deref().expect("payload")).unwrap();
    assert_eq!(payload.as_array().unwrap().len(), 1);
    assert_eq!(payload[0]["greenhouse_id"], 3);
    assert_eq!(payload[0]["temperature_c"], 24.5);
}

#[test]
fn test_post_readings_callback_honours_ok_flag() {
    let mut request = client().post_readings(&[reading()]).unwrap();
    let cb = request.callback.as_mut().expect("callback");
    assert!(cb(&json!({"ok": true})));
    assert!(cb(&json!({})));
    assert!(!cb(&json!({"ok": false})));
}

// ============================================================================
// HEARTBEAT
// ============================================================================

#[test]
fn test_heartbeat_carries_status_line() {
    let request = client()
        .post_heartbeat("Cellular: Connected (sig 17)", 17)
        .expect("serializable");
    assert_eq!(request.url, "http://api.example.com/api/heartbeat");
    let payload = request.payload.expect("payload");
    assert!(payload.contains("Cellular: Connected"));
    assert!(payload.contains("17"));
}

// ============================================================================
// COMMANDS FETCH
// ============================================================================

#[test]
fn test_fetch_commands_applies_overrides_to_session() {
    let session = SessionState::shared();
    let mut request = client().fetch_commands(session.clone());
    assert_eq!(
        request.url,
        "http://api.example.com/api/greenhouses/3/commands"
    );

    let cb = request.callback.as_mut().expect("callback");
    assert!(cb(&json!({
        "exhaust_on": true,
        "dehumidifier_on": false,
        "blower_on": true,
    })));

    let state = session.lock().unwrap();
    assert!(state.exhaust_target);
    assert!(!state.dehumidifier_target);
    assert!(state.blower_target);
    assert!(state.overrides_changed());
}

#[test]
fn test_fetch_commands_missing_fields_default_off() {
    let session = SessionState::shared();
    let mut request = client().fetch_commands(session.clone());
    let cb = request.callback.as_mut().expect("callback");
    assert!(cb(&json!({})));
    assert!(!session.lock().unwrap().exhaust_target);
}

#[test]
fn test_fetch_commands_rejects_malformed_payload() {
    let session = SessionState::shared();
    let mut request = client().fetch_commands(session);
    let cb = request.callback.as_mut().expect("callback");
    assert!(!cb(&json!("not an object")));
}

// ============================================================================
// TIME FETCH
// ============================================================================

#[test]
fn test_fetch_time_decodes_epoch() {
    let seen = Arc::new(Mutex::new(None));
    let seen_in_cb = seen.clone();
    let mut request = client().fetch_time(move |when| {
        *seen_in_cb.lock().unwrap() = Some(when);
    });
    assert!(!request.needs_auth);

    let cb = request.callback.as_mut().expect("callback");
    assert!(cb(&json!({"epoch": 1_700_000_000})));

    let when = seen.lock().unwrap().expect("handler ran");
    assert_eq!(when.timestamp(), 1_700_000_000);
}

#[test]
fn test_fetch_time_rejects_missing_epoch() {
    let mut request = client().fetch_time(|_| {});
    let cb = request.callback.as_mut().expect("callback");
    assert!(!cb(&json!({"time": "noon"})));
}

// ============================================================================
// URL HANDLING
// ============================================================================

#[test]
fn test_base_url_trailing_slash_is_normalised() {
    let with_slash = ApiClient::new("http://api.example.com/", 1);
    let without = ApiClient::new("http://api.example.com", 1);
    let a = with_slash.post_heartbeat("x", 0).unwrap();
    let b = without.post_heartbeat("x", 0).unwrap();
    assert_eq!(a.url, b.url);
}
