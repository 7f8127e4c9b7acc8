//! HTTP transport implementation

use crate::config::HttpConfig;
use crate::errors::TransportError;
use crate::types::{HttpMethod, HttpRequest, HttpResponse, Timeouts};
use parking_lot::Mutex;
use reqwest::{
    self,
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::str::FromStr;
use tracing::{debug, info};

/// The raw HTTP transport a resilient client delegates to.
///
/// One call is one logical exchange, including any redirect hops, which
/// come back in [`HttpResponse::history`]. HTTP error statuses are not
/// errors at this level.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &HttpRequest,
        timeouts: &Timeouts,
    ) -> Result<HttpResponse, TransportError>;

    /// `request` as it goes on the wire, with the transport's default
    /// headers filled in. This is what gets recorded.
    fn prepare(&self, request: &HttpRequest) -> HttpRequest {
        request.clone()
    }
}

/// reqwest-backed transport that follows redirects itself so that every
/// hop is visible to the recorder.
#[derive(Debug)]
pub struct ReqwestTransport {
    config: HttpConfig,
    // Rebuilt only when the timeouts change, so connections stay pooled
    // across the attempts of one strategy.
    client: Mutex<Option<(Timeouts, Client)>>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Create a new transport with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpConfig::default())
    }

    /// Create a new transport with specific configuration
    pub fn with_config(config: HttpConfig) -> Self {
        debug!(
            "Creating ReqwestTransport (max redirects: {}, proxy: {:?})",
            config.max_redirects, config.proxy
        );
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn client_for(&self, timeouts: &Timeouts) -> Result<Client, TransportError> {
        let mut cached = self.client.lock();
        if let Some((cached_timeouts, client)) = cached.as_ref() {
            if cached_timeouts == timeouts {
                return Ok(client.clone());
            }
        }

        debug!(
            "Building HTTP client with connect timeout {:?}, read timeout {:?}",
            timeouts.connect, timeouts.read
        );
        let mut builder = Client::builder()
            .connect_timeout(timeouts.connect)
            .read_timeout(timeouts.read)
            .danger_accept_invalid_certs(!self.config.verify_ssl)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(proxy) = &self.config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        let client = builder.build()?;
        *cached = Some((*timeouts, client.clone()));
        Ok(client)
    }

    async fn send_hop(
        &self,
        client: &Client,
        request: &HttpRequest,
    ) -> Result<HttpResponse, TransportError> {
        let url = request.resolved_url()?;

        let mut header_map = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name = HeaderName::from_str(name)
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            header_map.append(header_name, header_value);
        }

        let mut builder = client
            .request(reqwest::Method::from(request.method), url)
            .headers(header_map);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status();
        let version = version_label(response.version()).to_string();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        info!("HTTP response received: {} {}", status.as_u16(), final_url);

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            version,
            headers,
            body,
            url: final_url,
            request: request.clone(),
            via_proxy: self.config.proxy.is_some(),
            history: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        timeouts: &Timeouts,
    ) -> Result<HttpResponse, TransportError> {
        let client = self.client_for(timeouts)?;

        debug!("Sending {} {}", request.method, request.url);
        let mut current = self.prepare(request);
        let mut history = Vec::new();

        loop {
            let mut response = self.send_hop(&client, &current).await?;

            let location = if current.follows_redirects() && response.is_redirect() {
                response.header("location").map(str::to_string)
            } else {
                None
            };

            match location {
                Some(location) => {
                    if history.len() as u32 >= self.config.max_redirects {
                        return Err(TransportError::TooManyRedirects {
                            max: self.config.max_redirects,
                        });
                    }
                    debug!("Following {} redirect to {}", response.status, location);
                    let next = redirect_request(&current, response.status, &location)?;
                    history.push(response);
                    current = next;
                }
                None => {
                    response.history = history;
                    return Ok(response);
                }
            }
        }
    }

    fn prepare(&self, request: &HttpRequest) -> HttpRequest {
        let mut prepared = request.clone();
        if prepared.header("user-agent").is_none() {
            prepared
                .headers
                .insert(0, ("User-Agent".to_string(), self.config.user_agent.clone()));
        }
        prepared
    }
}

/// Build the request for the next hop of a redirect chain.
///
/// 303, and 302 for anything but HEAD, become GET; so does a POST answered
/// with 301. Credentials are not forwarded to another host.
fn redirect_request(
    previous: &HttpRequest,
    status: u16,
    location: &str,
) -> Result<HttpRequest, TransportError> {
    let base = previous.resolved_url()?;
    let next_url = base
        .join(location)
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", location, e)))?;

    let becomes_get = match status {
        302 | 303 => previous.method != HttpMethod::Head,
        301 => previous.method == HttpMethod::Post,
        _ => false,
    };

    let mut next = HttpRequest {
        method: previous.method,
        url: next_url.to_string(),
        headers: previous.headers.clone(),
        body: previous.body.clone(),
        query: Vec::new(),
        allow_redirects: previous.allow_redirects,
    };

    if becomes_get {
        next.method = HttpMethod::Get;
        next.body = None;
        next.headers.retain(|(name, _)| {
            !name.eq_ignore_ascii_case("content-type") && !name.eq_ignore_ascii_case("content-length")
        });
    }

    if base.host_str() != next_url.host_str() {
        next.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
    }

    Ok(next)
}

fn version_label(version: reqwest::Version) -> &'static str {
    match version {
        reqwest::Version::HTTP_09 => "0.9",
        reqwest::Version::HTTP_10 => "1.0",
        reqwest::Version::HTTP_11 => "1.1",
        reqwest::Version::HTTP_2 => "2",
        reqwest::Version::HTTP_3 => "3",
        _ => "?",
    }
}
