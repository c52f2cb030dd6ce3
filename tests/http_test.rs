// HTTP Wire Mechanics Tests
// URL splitting, request composition, response-head parsing, chunked
// decoding and the shared retry classification

use greenlink::transport::{
    chunked_terminator_seen, compose_request, decode_chunked, is_retryable_status, ParsedUrl,
    ResponseHead, TransportError,
};

const MAX_HOST: usize = 257;
const MAX_PATH: usize = 257;

fn parse(url: &str) -> ParsedUrl {
    ParsedUrl::parse(url, MAX_HOST, MAX_PATH).expect("url should parse")
}

// ============================================================================
// URL PARSING
// ============================================================================

#[test]
fn test_parse_plain_http_url() {
    let url = parse("http://host/path");
    assert!(!url.secure);
    assert_eq!(url.host, "host");
    assert_eq!(url.port, 80);
    assert_eq!(url.path, "/path");
}

#[test]
fn test_parse_explicit_port() {
    let url = parse("http://host:8080/path");
    assert_eq!(url.host, "host");
    assert_eq!(url.port, 8080);
    assert_eq!(url.path, "/path");
}

#[test]
fn test_parse_no_path_defaults_to_root() {
    let url = parse("http://host");
    assert_eq!(url.host, "host");
    assert_eq!(url.port, 80);
    assert_eq!(url.path, "/");
}

#[test]
fn test_parse_https_defaults_to_443() {
    let url = parse("https://host/path");
    assert!(url.secure);
    assert_eq!(url.port, 443);
    assert_eq!(url.path, "/path");
}

#[test]
fn test_parse_https_explicit_port_wins() {
    let url = parse("https://host:8443/x");
    assert_eq!(url.port, 8443);
}

#[test]
fn test_parse_deep_path_and_query() {
    let url = parse("http://api.example.com/v1/devices/3/config?full=1");
    assert_eq!(url.host, "api.example.com");
    assert_eq!(url.path, "/v1/devices/3/config?full=1");
}

#[test]
fn test_parse_rejects_missing_scheme() {
    let err = ParsedUrl::parse("host/path", MAX_HOST, MAX_PATH).unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl(_)));
}

#[test]
fn test_parse_rejects_empty_host() {
    let err = ParsedUrl::parse("http:///path", MAX_HOST, MAX_PATH).unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl(_)));
}

#[test]
fn test_parse_rejects_bad_port() {
    let err = ParsedUrl::parse("http://host:notaport/path", MAX_HOST, MAX_PATH).unwrap_err();
    assert!(matches!(err, TransportError::InvalidUrl(_)));
}

#[test]
fn test_parse_rejects_overlong_host() {
    let url = format!("http://{}/x", "h".repeat(64));
    let err = ParsedUrl::parse(&url, 32, MAX_PATH).unwrap_err();
    assert_eq!(err, TransportError::HostTooLong);
}

#[test]
fn test_parse_rejects_overlong_path() {
    let url = format!("http://host/{}", "p".repeat(64));
    let err = ParsedUrl::parse(&url, MAX_HOST, 32).unwrap_err();
    assert_eq!(err, TransportError::PathTooLong);
}

// ============================================================================
// REQUEST COMPOSITION
// ============================================================================

fn compose(
    method: &str,
    bearer: Option<&str>,
    payload: Option<&str>,
    limit: usize,
) -> Result<String, TransportError> {
    let target = parse("http://api.example.com/data");
    compose_request(method, &target, bearer, "greenlink/0.1.0", payload, limit)
        .map(|bytes| String::from_utf8(bytes).expect("request should be utf-8"))
}

#[test]
fn test_compose_get_request_line_and_headers() {
    let request = compose("GET", None, None, 512).unwrap();
    assert!(request.starts_with("GET /data HTTP/1.1\r\n"));
    assert!(request.contains("Host: api.example.com\r\n"));
    assert!(request.contains("User-Agent: greenlink/0.1.0\r\n"));
    assert!(request.ends_with("Connection: close\r\n\r\n"));
    assert!(!request.contains("Content-Length"));
    assert!(!request.contains("Authorization"));
}

#[test]
fn test_compose_bearer_header() {
    let request = compose("GET", Some("secret-token"), None, 512).unwrap();
    assert!(request.contains("Authorization: Bearer secret-token\r\n"));
}

#[test]
fn test_compose_post_payload_headers() {
    let body = r#"{"temperature":21.5}"#;
    let request = compose("POST", None, Some(body), 512).unwrap();
    assert!(request.starts_with("POST /data HTTP/1.1\r\n"));
    assert!(request.contains("Content-Type: application/json\r\n"));
    assert!(request.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert!(request.ends_with(body));
}

#[test]
fn test_compose_empty_payload_sends_no_body_headers() {
    let request = compose("POST", None, Some(""), 512).unwrap();
    assert!(!request.contains("Content-Length"));
    assert!(request.ends_with("Connection: close\r\n\r\n"));
}

#[test]
fn test_compose_overflow_is_an_error() {
    let big = "x".repeat(600);
    let err = compose("POST", None, Some(&big), 512).unwrap_err();
    assert_eq!(err, TransportError::RequestOverflow);
}

// ============================================================================
// RESPONSE HEAD PARSING
// ============================================================================

#[test]
fn test_head_incomplete_returns_none() {
    assert!(ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n").is_none());
    assert!(ResponseHead::parse(b"").is_none());
}

#[test]
fn test_head_parses_status_and_length() {
    let head = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.status, 200);
    assert_eq!(head.content_length, Some(11));
    assert!(!head.chunked);
    assert!(head.leftover.is_empty());
    assert!(head.is_success());
}

#[test]
fn test_head_leftover_is_first_body_slice() {
    let head = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel")
        .unwrap()
        .unwrap();
    assert_eq!(head.leftover, b"hel");
}

#[test]
fn test_head_content_length_is_case_insensitive() {
    let head = ResponseHead::parse(b"HTTP/1.1 200 OK\r\nCONTENT-LENGTH: 7\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.content_length, Some(7));
}

#[test]
fn test_head_chunked_overrides_content_length() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 999\r\nTransfer-Encoding: chunked\r\n\r\n";
    let head = ResponseHead::parse(raw).unwrap().unwrap();
    assert!(head.chunked);
    assert_eq!(head.content_length, None);
}

#[test]
fn test_head_non_success_status() {
    let head = ResponseHead::parse(b"HTTP/1.1 503 Service Unavailable\r\n\r\n")
        .unwrap()
        .unwrap();
    assert_eq!(head.status, 503);
    assert!(!head.is_success());
}

#[test]
fn test_head_malformed_status_line() {
    let err = ResponseHead::parse(b"HTTP/1.1\r\n\r\n").unwrap().unwrap_err();
    assert_eq!(err, TransportError::MalformedStatusLine);

    let err = ResponseHead::parse(b"HTTP/1.1 abc OK\r\n\r\n").unwrap().unwrap_err();
    assert_eq!(err, TransportError::MalformedStatusLine);
}

// ============================================================================
// CHUNKED DECODING
// ============================================================================

#[test]
fn test_chunked_round_trip() {
    // N chunks followed by a zero-size terminator decode to the exact
    // concatenation of the chunk payloads, in order.
    let raw = b"4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n";
    let body = decode_chunked(raw).expect("terminated stream should decode");
    assert_eq!(body, b"Wikipedia in\r\n\r\nchunks.");
}

#[test]
fn test_chunked_incomplete_returns_none() {
    assert_eq!(decode_chunked(b"4\r\nWik"), None);
    assert_eq!(decode_chunked(b"4\r\nWiki\r\n5\r\npedi"), None);
    assert_eq!(decode_chunked(b"4"), None);
}

#[test]
fn test_chunked_no_partial_chunk_leakage() {
    // A final chunk missing its terminator must not leak partial bytes.
    let raw = b"4\r\nWiki\r\n5\r\npedia\r\n";
    assert_eq!(decode_chunked(raw), None);
}

#[test]
fn test_chunked_empty_body() {
    let body = decode_chunked(b"0\r\n\r\n").unwrap();
    assert!(body.is_empty());
}

#[test]
fn test_chunked_ignores_extensions() {
    let body = decode_chunked(b"4;ext=1\r\nWiki\r\n0\r\n\r\n").unwrap();
    assert_eq!(body, b"Wiki");
}

#[test]
fn test_chunked_single_byte_chunks() {
    let body = decode_chunked(b"1\r\na\r\n1\r\nb\r\n1\r\nc\r\n0\r\n\r\n").unwrap();
    assert_eq!(body, b"abc");
}

#[test]
fn test_chunked_terminator_probe() {
    assert!(chunked_terminator_seen(b"4\r\nWiki\r\n0\r\n\r\n"));
    assert!(chunked_terminator_seen(b"0\r\n\r\n"));
    assert!(!chunked_terminator_seen(b"4\r\nWiki\r\n"));
}

// ============================================================================
// RETRY CLASSIFICATION
// ============================================================================

#[test]
fn test_no_response_is_retryable() {
    // Status 0 (no response) and negative client-side codes share one
    // retryable class.
    assert!(is_retryable_status(0));
    assert!(is_retryable_status(-1));
    assert!(is_retryable_status(-11));
}

#[test]
fn test_timeout_and_throttle_statuses_are_retryable() {
    assert!(is_retryable_status(408));
    assert!(is_retryable_status(429));
}

#[test]
fn test_server_errors_are_retryable() {
    assert!(is_retryable_status(500));
    assert!(is_retryable_status(503));
    assert!(is_retryable_status(599));
}

#[test]
fn test_client_errors_are_not_retryable() {
    assert!(!is_retryable_status(400));
    assert!(!is_retryable_status(401));
    assert!(!is_retryable_status(403));
    assert!(!is_retryable_status(404));
    assert!(!is_retryable_status(499));
}

#[test]
fn test_success_is_not_retryable() {
    assert!(!is_retryable_status(200));
    assert!(!is_retryable_status(204));
    assert!(!is_retryable_status(301));
}
