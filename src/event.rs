//! Inbound invocation events.
//!
//! We can be invoked two ways: through an API Gateway HTTP API (payload
//! format 2.0), or as the target of an Application Load Balancer target
//! group. The two payloads look quite different, so we resolve which one we
//! got exactly once, here, and hand everything downstream a single
//! `CanonicalRequest` tagged with where it came from.
//!
//! There's no explicit discriminator field in either payload. An API Gateway
//! request always carries `requestContext.apiId`, so if that's present we go
//! with API Gateway; otherwise we try the ALB shape.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{AdapterError, Result},
    headers::{deserialize_pairs, HeaderList},
};

/// Which kind of invoker produced a request. This decides how the response
/// must be encoded, so it travels with the request the whole way through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    GatewayV2,
    LoadBalancer,
}

/// An inbound invocation, independent of the payload format it arrived in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanonicalRequest {
    pub method: String,

    /// Request path, without the query string.
    pub path: String,

    /// Already-encoded query string, without the leading `?`. Possibly empty.
    pub raw_query: String,

    /// Never contains `Cookie` for API Gateway requests; see `cookies`.
    pub headers: HeaderList,

    /// Raw cookie strings, to be sent as a single `Cookie` header. Only API
    /// Gateway separates these out; for ALB they stay inside `headers`.
    pub cookies: Vec<String>,

    pub body: Vec<u8>,

    pub source: SourceKind,
}

impl CanonicalRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The `Host` the invoker saw, if any.
    pub fn host(&self) -> Option<&str> {
        self.header("host").filter(|h| !h.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayV2Request {
    #[serde(default)]
    raw_query_string: String,

    #[serde(default)]
    cookies: Option<Vec<String>>,

    #[serde(default, deserialize_with = "deserialize_pairs")]
    headers: Vec<(String, String)>,

    #[serde(default)]
    request_context: GatewayV2RequestContext,

    #[serde(default)]
    body: Option<String>,

    #[serde(default)]
    is_base64_encoded: bool,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayV2RequestContext {
    #[serde(default)]
    api_id: Option<String>,

    #[serde(default)]
    http: GatewayV2Http,
}

#[derive(Default, Deserialize)]
struct GatewayV2Http {
    #[serde(default)]
    method: String,

    #[serde(default)]
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbRequest {
    http_method: String,

    path: String,

    #[serde(default, deserialize_with = "deserialize_pairs")]
    headers: Vec<(String, String)>,

    #[serde(default, deserialize_with = "deserialize_pairs")]
    multi_value_headers: Vec<(String, Vec<String>)>,

    #[serde(default, deserialize_with = "deserialize_pairs")]
    multi_value_query_string_parameters: Vec<(String, Vec<String>)>,

    #[serde(default)]
    body: Option<String>,

    #[serde(default)]
    is_base64_encoded: bool,
}

/// Parse a raw invocation payload into a `CanonicalRequest`.
pub fn normalize(payload: &[u8]) -> Result<CanonicalRequest> {
    let gateway_err = match serde_json::from_slice::<GatewayV2Request>(payload) {
        Ok(req) if req.request_context.api_id.as_deref().is_some_and(|id| !id.is_empty()) => {
            debug!("parsed as API Gateway v2 request");
            return from_gateway(req);
        }
        Ok(_) => None,
        Err(e) => Some(e),
    };

    let req: AlbRequest = serde_json::from_slice(payload).map_err(|alb_err| {
        AdapterError::MalformedEvent(match gateway_err {
            Some(gw_err) => format!("API Gateway: {gw_err}; ALB: {alb_err}"),
            None => format!("no requestContext.apiId, and ALB: {alb_err}"),
        })
    })?;

    debug!("parsed as ALB request");
    from_alb(req)
}

fn from_gateway(req: GatewayV2Request) -> Result<CanonicalRequest> {
    let http = req.request_context.http;

    if http.method.is_empty() || http.path.is_empty() {
        return Err(AdapterError::MalformedEvent(
            "API Gateway request without requestContext.http method and path".to_owned(),
        ));
    }

    // API Gateway moves cookies into their own field. If a stray `cookie`
    // header is left over we drop it: the cookie list is authoritative.
    let mut headers = HeaderList::new();
    for (name, value) in &req.headers {
        if name.eq_ignore_ascii_case("cookie") {
            continue;
        }
        headers.append_joined(name, value, ", ");
    }

    Ok(CanonicalRequest {
        method: http.method,
        path: http.path,
        raw_query: req.raw_query_string,
        headers,
        cookies: req.cookies.unwrap_or_default(),
        body: decode_body(req.body, req.is_base64_encoded)?,
        source: SourceKind::GatewayV2,
    })
}

fn from_alb(req: AlbRequest) -> Result<CanonicalRequest> {
    if req.http_method.is_empty() || req.path.is_empty() {
        return Err(AdapterError::MalformedEvent(
            "ALB request without httpMethod and path".to_owned(),
        ));
    }

    // A target group sends either single- or multi-value headers, for both
    // requests and responses. Single-value mode can't return more than one
    // `Set-Cookie`, so we refuse to run in it at all.
    if !req.headers.is_empty() {
        return Err(AdapterError::MissingMultiValueHeaders);
    }

    let raw_query = req
        .multi_value_query_string_parameters
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |v| format!("{name}={v}")))
        .collect::<Vec<_>>()
        .join("&");

    let mut headers = HeaderList::new();
    for (name, values) in &req.multi_value_headers {
        let separator = if name.eq_ignore_ascii_case("cookie") {
            "; "
        } else {
            ", "
        };

        for value in values {
            headers.append_joined(name, value, separator);
        }
    }

    Ok(CanonicalRequest {
        method: req.http_method,
        path: req.path,
        raw_query,
        headers,
        cookies: Vec::new(),
        body: decode_body(req.body, req.is_base64_encoded)?,
        source: SourceKind::LoadBalancer,
    })
}

fn decode_body(body: Option<String>, is_base64: bool) -> Result<Vec<u8>> {
    let body = body.unwrap_or_default();

    if is_base64 {
        Ok(STANDARD.decode(body.as_bytes())?)
    } else {
        Ok(body.into_bytes())
    }
}
