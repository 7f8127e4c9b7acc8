//! Multipart raw trace writer

use super::filter::HeaderFilter;
use super::{FailureNote, Timing, TrafficRecorder};
use crate::errors::RecordingError;
use crate::types::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use std::iter;
use std::path::Path;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_FORMAT_MICROS: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Append-only `multipart/mixed` dump of every attempt of one logical
/// operation.
///
/// Each attempt adds a `request` part followed by either a `response`
/// part or a failure note, then a `timing-hint` part. Redirect hops are
/// written as request/response pairs in traversal order.
#[derive(Debug, Clone)]
pub struct RawTrace {
    buffer: Vec<u8>,
    boundary: String,
    request_filter: Option<HeaderFilter>,
    response_filter: Option<HeaderFilter>,
}

impl Default for RawTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl RawTrace {
    /// New trace with a `rawtrace.<unix seconds>.<32 hex chars>` boundary
    pub fn new() -> Self {
        Self::with_boundary(random_boundary())
    }

    /// New trace with a caller-chosen boundary, for reproducible output
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        let boundary = boundary.into();
        let mut buffer = Vec::new();
        buffer.extend_from_slice(
            format!("Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n", boundary).as_bytes(),
        );
        Self {
            buffer,
            boundary,
            request_filter: None,
            response_filter: None,
        }
    }

    pub fn with_request_header_filter(mut self, filter: HeaderFilter) -> Self {
        self.request_filter = Some(filter);
        self
    }

    pub fn with_response_header_filter(mut self, filter: HeaderFilter) -> Self {
        self.response_filter = Some(filter);
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub async fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
        let path = path.as_ref();
        tokio::fs::write(path, &self.buffer).await?;
        debug!("Wrote {} byte trace to {}", self.buffer.len(), path.display());
        Ok(())
    }

    fn write_boundary(&mut self, kind: &str) {
        self.buffer.extend_from_slice(
            format!("--{}\r\nX-Type: \"{}\"\r\n\r\n", self.boundary, kind).as_bytes(),
        );
    }

    fn write_request(&mut self, request: &HttpRequest, via_proxy: bool) {
        let (method, target, host) = request_line(request, via_proxy);

        self.write_boundary("request");
        self.buffer
            .extend_from_slice(format!("{} {} HTTP/1.1\r\n", method, target).as_bytes());
        self.buffer
            .extend_from_slice(format!("Host: {}\r\n", host).as_bytes());

        let headers: Vec<&(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
            .collect();
        write_headers(&mut self.buffer, headers, self.request_filter.as_ref());
        self.buffer.extend_from_slice(b"\r\n");

        if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
            if std::str::from_utf8(body).is_ok() {
                self.buffer.extend_from_slice(body);
            } else {
                self.buffer
                    .extend_from_slice(b"<< Request body is not a string-like type >>");
            }
        }
        self.buffer.extend_from_slice(b"\r\n");
    }

    fn write_response(&mut self, response: &HttpResponse) {
        self.write_boundary("response");
        self.buffer.extend_from_slice(
            format!(
                "HTTP/{} {} {}\r\n",
                response.version, response.status, response.reason
            )
            .as_bytes(),
        );
        write_headers(
            &mut self.buffer,
            response.headers.iter(),
            self.response_filter.as_ref(),
        );
        self.buffer.extend_from_slice(b"\r\n");

        if response.has_binary_body() {
            self.buffer.extend_from_slice(b"<< Binary response body >>");
        } else {
            self.buffer.extend_from_slice(&response.body);
        }
        self.buffer.extend_from_slice(b"\r\n");
    }

    fn write_timing(&mut self, timing: &Timing) {
        self.write_boundary("timing-hint");
        self.buffer.extend_from_slice(
            format!(
                "<< Request sent at {} ; response received (or timed out) at {} ; time elapsed (s): {} >>\r\n",
                format_timestamp(&timing.started_at),
                format_timestamp(&timing.ended_at),
                timing.elapsed.as_secs_f64()
            )
            .as_bytes(),
        );
    }
}

impl TrafficRecorder for RawTrace {
    fn record_success(&mut self, response: &HttpResponse, timing: &Timing) {
        for hop in response.history.iter().chain(iter::once(response)) {
            self.write_request(&hop.request, hop.via_proxy);
            self.write_response(hop);
        }
        self.write_timing(timing);
    }

    fn record_failure(&mut self, request: &HttpRequest, failure: &FailureNote, timing: &Timing) {
        self.write_request(request, false);
        self.write_boundary("response");
        self.buffer
            .extend_from_slice(format!("<< {} >>\r\n", failure).as_bytes());
        self.write_timing(timing);
    }
}

/// Microseconds are left out when they are zero
fn format_timestamp(at: &DateTime<Utc>) -> String {
    if at.timestamp_subsec_micros() == 0 {
        at.format(TIMESTAMP_FORMAT).to_string()
    } else {
        at.format(TIMESTAMP_FORMAT_MICROS).to_string()
    }
}

fn write_headers<'a, I>(buffer: &mut Vec<u8>, headers: I, filter: Option<&HeaderFilter>)
where
    I: IntoIterator<Item = &'a (String, String)>,
{
    for (name, value) in headers {
        let value = match filter {
            Some(filter) => filter.apply(name, value),
            None => value.clone(),
        };
        buffer.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
}

/// Method, request target and host for the request line. Through a proxy
/// the target is the absolute URL, and HTTPS goes through `CONNECT`.
fn request_line(request: &HttpRequest, via_proxy: bool) -> (String, String, String) {
    let method = request.method.as_str().to_string();

    let Ok(url) = request.resolved_url() else {
        let host = request.header("host").unwrap_or_default().to_string();
        return (method, request.url.clone(), host);
    };

    let host = match request.header("host") {
        Some(host) => host.to_string(),
        None => match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        },
    };

    if via_proxy {
        let method = if url.scheme() == "https" {
            "CONNECT".to_string()
        } else {
            method
        };
        return (method, url.to_string(), host);
    }

    let target = match url.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", url.path(), query),
        _ => url.path().to_string(),
    };
    (method, target, host)
}

fn random_boundary() -> String {
    let entropy: [u8; 16] = rand::random();
    let hex: String = entropy.iter().map(|b| format!("{:02x}", b)).collect();
    format!("rawtrace.{}.{}", Utc::now().timestamp(), hex)
}
