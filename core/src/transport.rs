//! The HTTP transport stack handed to the discovery builder.
//!
//! # Design
//! [`Transport`] executes one plain-data [`HttpRequest`]. [`UreqTransport`]
//! is the network-facing implementation; [`AuthorizedTransport`] wraps any
//! transport and, per request:
//! 1. sets `Authorization: OAuth2 <token>` (and `X-External-Client: 1` when
//!    configured),
//! 2. answers fresh GETs from the on-disk cache,
//! 3. forwards to the inner transport, retrying exactly once if the server
//!    had closed the reused connection.
//!
//! The decorator holds only immutable state, so one instance can serve
//! concurrent callers without locking.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ureq::tls::{PemItem, RootCerts, TlsConfig};

use crate::cache::DiskCache;
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::settings::Settings;

/// Trust bundle used instead of the built-in roots when it exists.
pub const SYSTEM_CA_BUNDLE: &str = "/etc/ssl/certs/ca-certificates.crt";

/// Executes HTTP requests.
pub trait Transport: Send + Sync {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).request(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).request(request)
    }
}

/// Certificate validation and trust root for [`UreqTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    pub validate_certificates: bool,
    /// PEM bundle to trust; `None` keeps the transport's built-in roots.
    pub ca_bundle: Option<PathBuf>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            validate_certificates: true,
            ca_bundle: None,
        }
    }
}

impl TlsOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let bundle = Path::new(SYSTEM_CA_BUNDLE);
        Self {
            validate_certificates: !settings.insecure(),
            ca_bundle: bundle.exists().then(|| bundle.to_path_buf()),
        }
    }
}

/// Blocking transport over a shared `ureq` agent (keep-alive pool).
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

impl UreqTransport {
    /// Agent for `tls`. A trust bundle that cannot be used falls back to the
    /// built-in roots; construction itself never fails.
    pub fn new(tls: &TlsOptions) -> Self {
        let mut tls_config = TlsConfig::builder().disable_verification(!tls.validate_certificates);
        if let Some(roots) = trust_roots(tls) {
            tls_config = tls_config.root_certs(roots);
        }
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls_config.build())
            .build()
            .new_agent();
        Self { agent }
    }
}

/// Roots from the configured bundle, or `None` to keep the built-in roots.
fn trust_roots(tls: &TlsOptions) -> Option<RootCerts> {
    if !tls.validate_certificates {
        return None;
    }
    let path = tls.ca_bundle.as_deref()?;
    match load_root_certs(path) {
        Ok(roots) => Some(roots),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring CA bundle, using built-in roots");
            None
        }
    }
}

fn load_root_certs(path: &Path) -> Result<RootCerts, TransportError> {
    let pem = std::fs::read(path)
        .map_err(|err| TransportError::Tls(format!("{}: {err}", path.display())))?;
    let certs: Vec<_> = ureq::tls::parse_pem(&pem)
        .filter_map(|item| match item {
            Ok(PemItem::Certificate(cert)) => Some(cert.to_owned()),
            _ => None,
        })
        .collect();
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    tracing::debug!(path = %path.display(), count = certs.len(), "loaded CA bundle");
    Ok(RootCerts::new_with_certs(&certs))
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let uri = request.uri.as_str();
        let headers = &request.headers;
        let body = request.body.as_deref();

        let result = match (request.method, body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(uri), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(uri), headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(uri), headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(uri), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(uri), headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(uri), headers).send_empty(),
            (HttpMethod::Patch, Some(body)) => {
                with_headers(self.agent.patch(uri), headers).send(body.as_bytes())
            }
            (HttpMethod::Patch, None) => with_headers(self.agent.patch(uri), headers).send_empty(),
        };

        let mut response = result.map_err(map_ureq_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(map_ureq_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(io) => map_io_error(&io),
        other => TransportError::Request(other.to_string()),
    }
}

/// A reused keep-alive socket that the server already closed shows up as a
/// reset, abort, broken pipe, or premature EOF.
fn map_io_error(err: &std::io::Error) -> TransportError {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => TransportError::StaleConnection(err.to_string()),
        _ => TransportError::Io(err.to_string()),
    }
}

/// Adds credentials, one stale-connection retry, and response caching to an
/// inner transport.
#[derive(Clone)]
pub struct AuthorizedTransport<T> {
    inner: T,
    token: String,
    external_client: bool,
    cache: Option<DiskCache>,
}

impl<T: fmt::Debug> fmt::Debug for AuthorizedTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedTransport")
            .field("inner", &self.inner)
            .field("token", &"<redacted>")
            .field("external_client", &self.external_client)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<T: Transport> AuthorizedTransport<T> {
    pub fn new(inner: T, token: impl Into<String>) -> Self {
        Self {
            inner,
            token: token.into(),
            external_client: false,
            cache: None,
        }
    }

    /// Token and external-client flag taken from `settings`.
    pub fn from_settings(inner: T, settings: &Settings) -> Self {
        Self::new(inner, settings.api_token()).with_external_client(settings.external_client())
    }

    pub fn with_external_client(mut self, external_client: bool) -> Self {
        self.external_client = external_client;
        self
    }

    /// `None` disables caching for this transport.
    pub fn with_cache(mut self, cache: Option<DiskCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.cache.as_ref()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn forward(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        match self.inner.request(request) {
            Err(err) if err.is_stale_connection() => {
                // The first attempt may have reached the server; we retry anyway.
                tracing::warn!(
                    method = request.method.as_str(),
                    uri = %request.uri,
                    error = %err,
                    "connection closed by server, retrying once"
                );
                self.inner.request(request)
            }
            other => other,
        }
    }
}

impl<T: Transport> Transport for AuthorizedTransport<T> {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut request = request.clone();
        request.set_header("Authorization", format!("OAuth2 {}", self.token));
        if self.external_client {
            request.set_header("X-External-Client", "1");
        }

        let cache = self
            .cache
            .as_ref()
            .filter(|_| request.method == HttpMethod::Get);

        if let Some(cache) = cache {
            if let Some(response) = cached_response(cache, &request.uri) {
                tracing::debug!(uri = %request.uri, "served from cache");
                return Ok(response);
            }
        }

        tracing::debug!(method = request.method.as_str(), uri = %request.uri, "sending request");
        let response = self.forward(&request)?;

        if let Some(cache) = cache {
            store_response(cache, &request.uri, &response);
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    max_age_secs: u64,
    response: HttpResponse,
}

/// Freshness lifetime of a response, if it may be cached at all.
fn cache_lifetime(response: &HttpResponse) -> Option<u64> {
    if response.status != 200 {
        return None;
    }
    let mut max_age = None;
    for directive in response.header("Cache-Control")?.split(',') {
        let directive = directive.trim().to_ascii_lowercase();
        if directive == "no-store" || directive == "no-cache" {
            return None;
        }
        if let Some(seconds) = directive.strip_prefix("max-age=") {
            max_age = seconds.trim_matches('"').parse::<u64>().ok();
        }
    }
    max_age.filter(|seconds| *seconds > 0)
}

fn cached_response(cache: &DiskCache, uri: &str) -> Option<HttpResponse> {
    let bytes = cache.get(uri)?;
    let entry: CacheEntry = serde_json::from_slice(&bytes).ok()?;
    let age = Utc::now()
        .signed_duration_since(entry.stored_at)
        .num_seconds();
    let max_age = i64::try_from(entry.max_age_secs).unwrap_or(i64::MAX);
    (0..max_age).contains(&age).then_some(entry.response)
}

fn store_response(cache: &DiskCache, uri: &str, response: &HttpResponse) {
    let Some(max_age_secs) = cache_lifetime(response) else {
        return;
    };
    let entry = CacheEntry {
        stored_at: Utc::now(),
        max_age_secs,
        response: response.clone(),
    };
    let stored = serde_json::to_vec(&entry)
        .map_err(std::io::Error::other)
        .and_then(|bytes| cache.set(uri, &bytes));
    if let Err(err) = stored {
        tracing::warn!(uri = %uri, error = %err, "failed to write cache entry");
    }
}
