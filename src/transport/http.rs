// HTTP Wire Mechanics
// URL splitting, request composition, incremental response parsing and the
// shared retry classification used by both request state machines

use crate::transport::TransportError;

// ============================================================================
// URL PARSING
// ============================================================================

/// A request target split into the three fields the socket layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// True when the scheme was `https`.
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ParsedUrl {
    /// Split `scheme://host[:port][/path]`. The port defaults to 80, or 443
    /// when the scheme signals secure transport; the path defaults to `/`.
    /// A URL without a scheme separator is rejected outright.
    pub fn parse(url: &str, max_host: usize, max_path: usize) -> Result<Self, TransportError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        let secure = scheme.eq_ignore_ascii_case("https");

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
                (h, port)
            }
            None => (authority, if secure { 443 } else { 80 }),
        };

        if host.is_empty() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }
        if host.len() >= max_host {
            return Err(TransportError::HostTooLong);
        }
        if path.len() >= max_path {
            return Err(TransportError::PathTooLong);
        }

        Ok(Self {
            secure,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

// ============================================================================
// REQUEST COMPOSITION
// ============================================================================

/// Compose a full HTTP/1.1 request (request line, headers, optional body)
/// into a single buffer bounded by `limit` bytes. Exceeding the bound is a
/// local error for this transaction, never a truncated send.
pub fn compose_request(
    method: &str,
    target: &ParsedUrl,
    bearer_token: Option<&str>,
    user_agent: &str,
    payload: Option<&str>,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut head = String::with_capacity(256);
    head.push_str(method);
    head.push(' ');
    head.push_str(&target.path);
    head.push_str(" HTTP/1.1\r\nHost: ");
    head.push_str(&target.host);
    head.push_str("\r\n");
    if let Some(token) = bearer_token {
        head.push_str("Authorization: Bearer ");
        head.push_str(token);
        head.push_str("\r\n");
    }
    head.push_str("User-Agent: ");
    head.push_str(user_agent);
    head.push_str("\r\n");

    let body = payload.unwrap_or("");
    if !body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");

    if head.len() + body.len() > limit {
        return Err(TransportError::RequestOverflow);
    }

    let mut out = Vec::with_capacity(head.len() + body.len());
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(body.as_bytes());
    Ok(out)
}

// ============================================================================
// RESPONSE HEAD PARSING
// ============================================================================

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parsed response status line + the framing headers the body phase needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: i32,
    pub content_length: Option<usize>,
    pub chunked: bool,
    /// Bytes that arrived past the header terminator: the first body slice.
    pub leftover: Vec<u8>,
}

impl ResponseHead {
    /// Scan an accumulation buffer for the blank-line terminator. Returns
    /// `None` while the head is still incomplete; once terminated, parses
    /// the status line and framing headers. `Transfer-Encoding: chunked`
    /// overrides any `Content-Length`.
    pub fn parse(buf: &[u8]) -> Option<Result<Self, TransportError>> {
        let end = find_subslice(buf, HEADER_TERMINATOR)?;
        let head = &buf[..end];
        let leftover = buf[end + HEADER_TERMINATOR.len()..].to_vec();

        let text = String::from_utf8_lossy(head);
        let mut lines = text.split("\r\n");

        let status_line = lines.next().unwrap_or("");
        let status = match status_line.split_whitespace().nth(1) {
            Some(tok) => match tok.parse::<u16>() {
                Ok(code) => i32::from(code),
                Err(_) => return Some(Err(TransportError::MalformedStatusLine)),
            },
            None => return Some(Err(TransportError::MalformedStatusLine)),
        };

        let mut content_length = None;
        let mut chunked = false;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse::<usize>().ok();
            } else if name.eq_ignore_ascii_case("transfer-encoding")
                && value.to_ascii_lowercase().contains("chunked")
            {
                chunked = true;
            }
        }
        if chunked {
            content_length = None;
        }

        Some(Ok(Self {
            status,
            content_length,
            chunked,
            leftover,
        }))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ============================================================================
// CHUNKED DECODING
// ============================================================================

/// Unwrap chunked transfer framing. Returns `None` until the zero-size
/// terminal chunk has been framed; then the exact concatenation of every
/// chunk payload, in order. Partially received chunks never leak into the
/// output; an incomplete tail just means "keep reading".
pub fn decode_chunked(raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    loop {
        let line_end = pos + find_subslice(&raw[pos..], b"\r\n")?;
        let size_line = &raw[pos..line_end];
        let size_text = String::from_utf8_lossy(size_line);
        // Chunk extensions (";name=value") are permitted and ignored.
        let size_hex = size_text.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).ok()?;

        if size == 0 {
            return Some(out);
        }

        let data_start = line_end + 2;
        let data_end = data_start.checked_add(size)?;
        // Need the payload plus its trailing CRLF before consuming.
        if raw.len() < data_end.checked_add(2)? {
            return None;
        }
        out.extend_from_slice(&raw[data_start..data_end]);
        pos = data_end + 2;
    }
}

/// Cheap completeness probe: has the terminal chunk marker arrived yet?
/// Used to skip full decodes while bytes are still trickling in.
pub fn chunked_terminator_seen(raw: &[u8]) -> bool {
    find_subslice(raw, b"\r\n0\r\n").is_some() || raw.starts_with(b"0\r\n")
}

// ============================================================================
// RETRY CLASSIFICATION
// ============================================================================

/// Shared retry rule set, identical for both transports. A non-positive
/// status means no response was obtained at all (connect failure, timeout,
/// client-side error code) and is always retryable; nothing downstream
/// distinguishes those cases, so neither does the classifier. HTTP 408 and
/// 429 are retryable, as is the whole 5xx class. Every other 4xx is a client
/// error and is not retried.
pub fn is_retryable_status(status: i32) -> bool {
    if status <= 0 {
        return true;
    }
    if status == 408 || status == 429 {
        return true;
    }
    (500..=599).contains(&status)
}
