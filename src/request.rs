//! Requests to the local service.

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, COOKIE, HOST, TRANSFER_ENCODING},
    redirect, Client, Method, Url,
};
use std::time::Duration;

use crate::{
    config::Config,
    error::{AdapterError, Result},
    event::CanonicalRequest,
};

/// The HTTP client used for every invocation.
///
/// Redirects are never followed: whatever the local service says first is
/// what goes back to the invoker. Headers go out in `Header-Case`, matching
/// what most web frameworks are used to seeing behind a real proxy.
pub fn local_client() -> reqwest::Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .http1_title_case_headers()
        .no_proxy()
        .build()
}

/// Like `local_client()`, but for the readiness probe, with a per-request
/// timeout.
pub fn probe_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .timeout(timeout)
        .no_proxy()
        .build()
}

/// Translate a `CanonicalRequest` into a request against the local service.
///
/// The body is passed separately so that the caller can hand it over without
/// copying while keeping the rest of the request around.
pub fn build(
    client: &Client,
    config: &Config,
    req: &CanonicalRequest,
    body: Vec<u8>,
) -> Result<reqwest::Request> {
    let method = Method::from_bytes(req.method.as_bytes())
        .map_err(|e| AdapterError::RequestBuild(format!("method {:?}: {e}", req.method)))?;

    let mut target = config.local_base_url();
    if !req.path.starts_with('/') {
        target.push('/');
    }
    target.push_str(&req.path);
    if !req.raw_query.is_empty() {
        target.push('?');
        target.push_str(&req.raw_query);
    }

    let url = Url::parse(&target)
        .map_err(|e| AdapterError::RequestBuild(format!("URL {target:?}: {e}")))?;

    let mut headers = HeaderMap::with_capacity(req.headers.len() + 2);

    for (name, value) in req.headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AdapterError::RequestBuild(format!("header name {name:?}: {e}")))?;

        // The body is fully buffered, so the transport frames it itself.
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == HOST {
            continue;
        }

        headers.insert(name, header_value(value)?);
    }

    if !req.cookies.is_empty() {
        headers.insert(COOKIE, header_value(&req.cookies.join("; "))?);
    }

    // Without this, the transport would send `Host: localhost:<port>`, and
    // the local service would build absolute URLs pointing at itself.
    if let Some(host) = req.host() {
        headers.insert(HOST, header_value(host)?);
    }

    client
        .request(method, url)
        .headers(headers)
        .body(body)
        .build()
        .map_err(|e| AdapterError::RequestBuild(e.to_string()))
}

/// Issue a request to the local service. Transport failures are not retried.
pub async fn send(client: &Client, request: reqwest::Request) -> Result<reqwest::Response> {
    client
        .execute(request)
        .await
        .map_err(AdapterError::UpstreamUnavailable)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AdapterError::RequestBuild(format!("header value {value:?}: {e}")))
}
