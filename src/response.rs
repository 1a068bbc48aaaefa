//! Responses from the local service, and the payloads we return for them.
//!
//! The two invokers want rather different things back:
//!
//! - API Gateway v2 takes single-valued `headers` plus a separate `cookies`
//!   list.
//! - An ALB target group (in multi-value mode, which we insist on) takes
//!   everything in `multiValueHeaders`, one entry per `Set-Cookie`.
//!
//! `Set-Cookie` values are never comma-joined, since cookie values may
//! themselves contain commas. Bodies always go back base64-encoded, so the
//! invoker never has to guess.

use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::{write::GzEncoder, Compression};
use reqwest::{
    header::{SET_COOKIE, TRANSFER_ENCODING},
    StatusCode,
};
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use crate::{
    error::{AdapterError, Result},
    event::SourceKind,
    headers::{canonical_header_key, serialize_pairs, HeaderList},
};

/// A local service response, buffered and split up the way both invokers
/// need it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CanonicalResponse {
    pub status: u16,

    /// Everything except `Set-Cookie`, with repeated headers joined by `, `.
    pub headers: HeaderList,

    /// `Set-Cookie` values in the order the local service sent them.
    pub set_cookies: Vec<String>,

    /// The body exactly as received.
    pub body: Vec<u8>,
}

impl CanonicalResponse {
    /// Buffer a response from the local service.
    pub async fn read(resp: reqwest::Response) -> Result<Self> {
        let status = resp.status().as_u16();
        let mut headers = HeaderList::new();
        let mut set_cookies = Vec::new();

        for name in resp.headers().keys() {
            // The body has already been de-chunked.
            if name == TRANSFER_ENCODING {
                continue;
            }

            let values = resp
                .headers()
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());

            if name == SET_COOKIE {
                set_cookies.extend(values);
            } else {
                headers.set(
                    canonical_header_key(name.as_str()),
                    values.collect::<Vec<_>>().join(", "),
                );
            }
        }

        let body = resp
            .bytes()
            .await
            .map_err(AdapterError::UpstreamUnavailable)?
            .to_vec();

        debug!(status, body_len = body.len(), "received response");

        Ok(CanonicalResponse {
            status,
            headers,
            set_cookies,
            body,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayV2Response<'a> {
    status_code: u16,
    headers: &'a HeaderList,
    cookies: &'a [String],
    body: String,
    is_base64_encoded: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AlbResponse {
    status_code: u16,
    status_description: String,
    #[serde(serialize_with = "serialize_pairs")]
    multi_value_headers: Vec<(String, Vec<String>)>,
    body: String,
    is_base64_encoded: bool,
}

/// Encode a response as the payload expected by the invoker that sent
/// `source`.
pub fn encode(mut resp: CanonicalResponse, source: SourceKind, force_gzip: bool) -> Result<Vec<u8>> {
    let body = if force_gzip {
        // The length we were given is for the uncompressed body.
        resp.headers.remove("content-length");
        resp.headers.set("Content-Encoding", "gzip");
        gzip(&resp.body)?
    } else {
        resp.body
    };

    let body = STANDARD.encode(body);

    let payload = match source {
        SourceKind::GatewayV2 => serde_json::to_vec(&GatewayV2Response {
            status_code: resp.status,
            headers: &resp.headers,
            cookies: &resp.set_cookies,
            body,
            is_base64_encoded: true,
        })?,

        SourceKind::LoadBalancer => {
            let mut multi_value_headers: Vec<(String, Vec<String>)> = resp
                .headers
                .iter()
                .map(|(n, v)| (n.to_owned(), vec![v.to_owned()]))
                .collect();

            if !resp.set_cookies.is_empty() {
                multi_value_headers.push(("Set-Cookie".to_owned(), resp.set_cookies));
            }

            serde_json::to_vec(&AlbResponse {
                status_code: resp.status,
                status_description: status_description(resp.status),
                multi_value_headers,
                body,
                is_base64_encoded: true,
            })?
        }
    };

    Ok(payload)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut enc = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 32), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

fn status_description(status: u16) -> String {
    match StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("{status} {reason}"),
        None => status.to_string(),
    }
}
