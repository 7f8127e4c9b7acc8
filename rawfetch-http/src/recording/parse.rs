//! Reader for the multipart raw trace format, for replay and inspection

use crate::errors::RecordingError;

const PREAMBLE_PREFIX: &str = "Content-Type: multipart/mixed; boundary=\"";

/// Declared type of a trace part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Request,
    Response,
    TimingHint,
    Unknown,
}

impl PartKind {
    fn from_label(label: &str) -> Self {
        match label {
            "request" => PartKind::Request,
            "response" => PartKind::Response,
            "timing-hint" => PartKind::TimingHint,
            _ => PartKind::Unknown,
        }
    }
}

/// One boundary-delimited part, content still raw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePart {
    pub kind: PartKind,
    pub content: Vec<u8>,
}

impl TracePart {
    /// Text of a `<< ... >>` note (failure reason or timing hint)
    pub fn note(&self) -> Option<&str> {
        std::str::from_utf8(&self.content)
            .ok()?
            .strip_suffix("\r\n")?
            .strip_prefix("<< ")?
            .strip_suffix(" >>")
    }
}

/// Split a trace into its parts, in the order they were written
pub fn parse_trace(bytes: &[u8]) -> Result<Vec<TracePart>, RecordingError> {
    let preamble_end = find(bytes, b"\r\n\r\n")
        .ok_or_else(|| RecordingError::MalformedTrace("missing preamble".to_string()))?;
    let preamble = std::str::from_utf8(&bytes[..preamble_end])
        .map_err(|_| RecordingError::MalformedTrace("preamble is not UTF-8".to_string()))?;
    let boundary = preamble
        .strip_prefix(PREAMBLE_PREFIX)
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| RecordingError::MalformedTrace(format!("unexpected preamble: {}", preamble)))?;

    let delimiter = format!("--{}\r\n", boundary);
    let mut segments = split(&bytes[preamble_end + 4..], delimiter.as_bytes()).into_iter();

    if segments.next().is_some_and(|leading| !leading.is_empty()) {
        return Err(RecordingError::MalformedTrace(
            "data before the first boundary".to_string(),
        ));
    }

    segments.map(parse_part).collect()
}

fn parse_part(segment: &[u8]) -> Result<TracePart, RecordingError> {
    if let Some(rest) = segment.strip_prefix(b"\r\n".as_slice()) {
        return Ok(TracePart {
            kind: PartKind::Unknown,
            content: rest.to_vec(),
        });
    }

    let rest = segment
        .strip_prefix(b"X-Type: \"".as_slice())
        .ok_or_else(|| RecordingError::MalformedTrace("part without X-Type".to_string()))?;
    let label_end = find(rest, b"\"\r\n\r\n")
        .ok_or_else(|| RecordingError::MalformedTrace("unterminated X-Type".to_string()))?;
    let label = String::from_utf8_lossy(&rest[..label_end]);

    Ok(TracePart {
        kind: PartKind::from_label(&label),
        content: rest[label_end + 5..].to_vec(),
    })
}

/// A recorded request part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    /// Path and query, or an absolute URL for proxied requests
    pub target: String,
    /// Headers as recorded, `Host` first
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn from_part(part: &TracePart) -> Result<Self, RecordingError> {
        expect_kind(part, PartKind::Request)?;
        let (start_line, headers, body) = split_message(&part.content)?;

        let mut fields = start_line.splitn(3, ' ');
        let (Some(method), Some(target), Some("HTTP/1.1")) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(RecordingError::MalformedTrace(format!(
                "bad request line: {}",
                start_line
            )));
        };

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            headers,
            body,
        })
    }

    pub fn host(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.as_str())
    }
}

/// A recorded response part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedResponse {
    pub fn from_part(part: &TracePart) -> Result<Self, RecordingError> {
        expect_kind(part, PartKind::Response)?;
        let (status_line, headers, body) = split_message(&part.content)?;

        let malformed = || RecordingError::MalformedTrace(format!("bad status line: {}", status_line));
        let mut fields = status_line.splitn(3, ' ');
        let version = fields
            .next()
            .and_then(|v| v.strip_prefix("HTTP/"))
            .ok_or_else(malformed)?;
        let status = fields
            .next()
            .and_then(|s| s.parse::<u16>().ok())
            .ok_or_else(malformed)?;
        let reason = fields.next().unwrap_or_default();

        Ok(Self {
            version: version.to_string(),
            status,
            reason: reason.to_string(),
            headers,
            body,
        })
    }
}

fn expect_kind(part: &TracePart, kind: PartKind) -> Result<(), RecordingError> {
    if part.kind != kind {
        return Err(RecordingError::MalformedTrace(format!(
            "expected a {:?} part, found {:?}",
            kind, part.kind
        )));
    }
    Ok(())
}

type Message = (String, Vec<(String, String)>, Vec<u8>);

/// Start line, headers and body of a request or response part
fn split_message(content: &[u8]) -> Result<Message, RecordingError> {
    let head_end = find(content, b"\r\n\r\n")
        .ok_or_else(|| RecordingError::MalformedTrace("part has no header block".to_string()))?;
    let head = std::str::from_utf8(&content[..head_end])
        .map_err(|_| RecordingError::MalformedTrace("header block is not UTF-8".to_string()))?;

    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default().to_string();
    let headers = lines
        .map(|line| {
            line.split_once(": ")
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| RecordingError::MalformedTrace(format!("bad header line: {}", line)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rest = &content[head_end + 4..];
    let body = rest.strip_suffix(b"\r\n".as_slice()).unwrap_or(rest).to_vec();

    Ok((start_line, headers, body))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split<'a>(mut haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    while let Some(at) = find(haystack, delimiter) {
        pieces.push(&haystack[..at]);
        haystack = &haystack[at + delimiter.len()..];
    }
    pieces.push(haystack);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{FailureNote, HeaderFilter, RawTrace, Timer, TrafficRecorder};
    use crate::types::{HttpRequest, HttpResponse};

    #[test]
    fn test_round_trip_request_response_timing() {
        let request = HttpRequest::post("https://api.example.com/v2/orders")
            .with_query("dry run", "yes")
            .with_header("Content-Type", "application/json")
            .with_header("X-Api-Key", "k-123456")
            .with_body("{\"qty\":2}\r\n{\"qty\":3}");
        let response = HttpResponse::new(request, 201)
            .with_header("Content-Type", "application/json")
            .with_header("Location", "/v2/orders/9")
            .with_body("{\"id\":9}");

        let mut trace = RawTrace::new()
            .with_request_header_filter(HeaderFilter::new().mask_by_name("x-api-key", Some(2)));
        trace.record_success(&response, &Timer::start().stop());

        let parts = parse_trace(trace.as_bytes()).unwrap();
        let kinds: Vec<PartKind> = parts.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PartKind::Request, PartKind::Response, PartKind::TimingHint]
        );

        let parsed_request = ParsedRequest::from_part(&parts[0]).unwrap();
        assert_eq!(parsed_request.method, "POST");
        assert_eq!(parsed_request.target, "/v2/orders?dry%20run=yes");
        assert_eq!(parsed_request.host(), Some("api.example.com"));
        assert_eq!(
            parsed_request.headers[1..],
            [
                ("Content-Type".to_string(), "application/json".to_string()),
                ("X-Api-Key".to_string(), "<<masked value=k-...>>".to_string()),
            ]
        );
        assert_eq!(parsed_request.body, b"{\"qty\":2}\r\n{\"qty\":3}");

        let parsed_response = ParsedResponse::from_part(&parts[1]).unwrap();
        assert_eq!(parsed_response.version, "1.1");
        assert_eq!(parsed_response.status, 201);
        assert_eq!(parsed_response.reason, "Created");
        assert_eq!(parsed_response.headers, response.headers);
        assert_eq!(parsed_response.body, response.body);

        assert!(parts[2].note().unwrap().starts_with("Request sent at "));
    }

    #[test]
    fn test_failure_part_is_a_note() {
        let mut trace = RawTrace::with_boundary("x");
        trace.record_failure(
            &HttpRequest::get("http://example.com/a"),
            &FailureNote::reason("connection reset"),
            &Timer::start().stop(),
        );

        let parts = parse_trace(trace.as_bytes()).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].kind, PartKind::Response);
        assert_eq!(parts[1].note(), Some("connection reset"));
        assert!(ParsedResponse::from_part(&parts[1]).is_err());
    }

    #[test]
    fn test_empty_trace_has_no_parts() {
        let trace = RawTrace::with_boundary("x");
        assert!(parse_trace(trace.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_foreign_input() {
        assert!(parse_trace(b"HTTP/1.1 200 OK\r\n\r\n").is_err());
        assert!(parse_trace(b"no preamble").is_err());
    }
}
