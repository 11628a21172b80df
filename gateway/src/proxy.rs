//! Prefix routing to backend services.
//!
//! `/v1/<prefix>/rest` is forwarded to `<upstream>/api/<prefix>/rest` with the
//! query string, method and body unchanged. The request content type is forced
//! to JSON unless the client sent multipart form data, which passes through
//! untouched so file uploads keep their boundary.

use crate::config::UpstreamConfig;
use agora_core::USER_ID_HEADER;
use agora_web::AppError;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, header};
use axum::response::Response;
use std::time::{Duration, Instant};

/// Whether `name` describes one hop and must not be forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        header::CONNECTION,
        header::HOST,
        header::CONTENT_LENGTH,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
    ]
    .contains(name)
}

/// One backend behind a path prefix.
#[derive(Debug, Clone)]
pub struct Upstream {
    /// Name used in logs and metrics
    pub name: &'static str,
    /// Path segment after `/v1/`
    pub prefix: &'static str,
    /// Base URL, no trailing slash
    pub base_url: String,
    /// Whether a valid bearer token is required
    pub requires_auth: bool,
}

impl Upstream {
    fn new(name: &'static str, prefix: &'static str, base_url: &str, requires_auth: bool) -> Self {
        Self {
            name,
            prefix,
            base_url: base_url.trim_end_matches('/').to_string(),
            requires_auth,
        }
    }

    /// Upstream path for a gateway path this upstream serves.
    fn rewrite(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix("/v1/")?.strip_prefix(self.prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then(|| format!("/api/{}{rest}", self.prefix))
    }
}

/// Reverse proxy over the configured upstreams.
#[derive(Debug, Clone)]
pub struct Proxy {
    client: reqwest::Client,
    upstreams: Vec<Upstream>,
    max_body_bytes: usize,
}

impl Proxy {
    /// The four backends: `auth` is public, `posts`, `media` and `search`
    /// need a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        upstreams: &UpstreamConfig,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            upstreams: vec![
                Upstream::new("identity-service", "auth", &upstreams.identity, false),
                Upstream::new("post-service", "posts", &upstreams.posts, true),
                Upstream::new("media-service", "media", &upstreams.media, true),
                Upstream::new("search-service", "search", &upstreams.search, true),
            ],
            max_body_bytes,
        })
    }

    /// Upstream serving `path`, if any.
    #[must_use]
    pub fn upstream_for(&self, path: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.rewrite(path).is_some())
    }

    /// Forward `request` to `upstream`, setting `subject` as the trusted user
    /// header. Any client-supplied user header is dropped.
    ///
    /// # Errors
    ///
    /// 404 if the path does not belong to `upstream`, 413 for an oversized
    /// body, 502 if the upstream cannot be reached.
    pub async fn forward(
        &self,
        upstream: &Upstream,
        request: Request<Body>,
        subject: Option<&str>,
    ) -> Result<Response, AppError> {
        let (parts, body) = request.into_parts();
        let path = upstream
            .rewrite(parts.uri.path())
            .ok_or_else(|| AppError::not_found("Route not found"))?;
        let url = match parts.uri.query() {
            Some(query) => format!("{}{path}?{query}", upstream.base_url),
            None => format!("{}{path}", upstream.base_url),
        };

        let body = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|_| AppError::payload_too_large("Request body too large"))?;
        let headers = outbound_headers(&parts.headers, subject);

        let started = Instant::now();
        let upstream_response = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| upstream_error(upstream, &e))?;

        let status = upstream_response.status();
        let response_headers = upstream_response.headers().clone();
        let bytes = upstream_response
            .bytes()
            .await
            .map_err(|e| upstream_error(upstream, &e))?;

        tracing::info!(
            upstream = upstream.name,
            method = %parts.method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Proxied request"
        );
        metrics::counter!(
            "agora_gateway_proxied_total",
            "upstream" => upstream.name,
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        for (name, value) in &response_headers {
            if !is_hop_by_hop(name) {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(response)
    }
}

fn upstream_error(upstream: &Upstream, e: &reqwest::Error) -> AppError {
    tracing::error!(upstream = upstream.name, timeout = e.is_timeout(), error = %e, "Upstream request failed");
    metrics::counter!("agora_gateway_upstream_errors_total", "upstream" => upstream.name)
        .increment(1);
    AppError::bad_gateway()
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Headers for the upstream hop.
fn outbound_headers(inbound: &HeaderMap, subject: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);
    for (name, value) in inbound {
        if is_hop_by_hop(name) || name.as_str() == USER_ID_HEADER {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if !is_multipart(inbound) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    if let Some(value) = subject.and_then(|s| HeaderValue::from_str(s).ok()) {
        headers.insert(HeaderName::from_static(USER_ID_HEADER), value);
    }
    headers
}
