//! Fixing up redirect targets.
//!
//! The local service believes it is being addressed as
//! `http://localhost:<port>`, so absolute redirects that it generates can
//! leak that identity: the wrong host, the internal port, or plain `http`
//! where the outside world is using `https`. The classic example is Apache
//! redirecting `/dir` to `http://example.com:8080/dir/`.
//!
//! Any absolute redirect that targets `localhost` or the host the invoker
//! was asked for gets a few conditional fixes; redirects elsewhere, and
//! relative ones, are passed through as-is.

use tracing::debug;
use url::{ParseError, Position, Url};

use crate::{
    config::Config,
    error::{AdapterError, Result},
    event::{CanonicalRequest, SourceKind},
    response::CanonicalResponse,
    LOOPBACK_HOST,
};

/// Rewrite the `Location` header of `resp` in place, if it has one that
/// needs fixing.
pub fn rewrite_response(
    resp: &mut CanonicalResponse,
    req: &CanonicalRequest,
    config: &Config,
) -> Result<()> {
    let Some(location) = resp.headers.get("location").filter(|l| !l.is_empty()) else {
        return Ok(());
    };

    if let Some(fixed) = rewrite(location, req, config)? {
        resp.headers.set("Location", fixed);
    }

    Ok(())
}

/// Compute the externally correct form of a redirect target. Returns `None`
/// if the value should be left alone.
pub fn rewrite(location: &str, req: &CanonicalRequest, config: &Config) -> Result<Option<String>> {
    let url = match Url::parse(location) {
        Ok(u) => u,
        Err(ParseError::RelativeUrlWithoutBase) => return Ok(None),
        Err(source) => {
            return Err(AdapterError::LocationParse {
                value: location.to_owned(),
                source,
            })
        }
    };

    let Some(host) = url.host_str() else {
        return Ok(None);
    };

    let mut target = Target {
        scheme: url.scheme().to_owned(),
        userinfo: url[Position::BeforeUsername..Position::BeforeHost].to_owned(),
        host: host.to_owned(),
        port: explicit_port(location).or_else(|| url.port().map(|p| p.to_string())),
        tail: url[Position::BeforePath..].to_owned(),
    };

    let Some((inbound_host, _)) = req.host().map(split_host_port) else {
        return Ok(None);
    };

    let mut changed = false;

    if target.host == LOOPBACK_HOST {
        debug!(from = %target.host, to = %inbound_host, "Location fix: loopback host");
        target.host = inbound_host.to_owned();
        changed = true;
    }

    if target.host.eq_ignore_ascii_case(inbound_host) {
        let forwarded_port = req
            .header("x-forwarded-port")
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let app_port = config.application_port.to_string();

        // The local service advertised the port it listens on, rather than
        // the port the request actually came in on.
        if target.port.as_deref() == Some(app_port.as_str())
            && forwarded_port != Some(app_port.as_str())
        {
            debug!(from = %app_port, to = ?forwarded_port, "Location fix: port");
            target.host = inbound_host.to_owned();
            target.port = forwarded_port.map(str::to_owned);
            changed = true;
        }

        if target.scheme == "http"
            && req.source == SourceKind::GatewayV2
            && config.gateway_force_https
        {
            debug!("Location fix: http -> https (API Gateway)");
            target.scheme = "https".to_owned();
            changed = true;
        }

        let forwarded_https = req
            .header("x-forwarded-proto")
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("https"));

        if target.scheme == "http" && forwarded_https {
            debug!("Location fix: http -> https (X-Forwarded-Proto)");
            target.scheme = "https".to_owned();
            changed = true;
        }
    }

    Ok(changed.then(|| target.to_string()))
}

/// A redirect target broken into the parts we may replace. Unlike `Url`,
/// this keeps an explicit port even when it's the default for the scheme.
struct Target {
    scheme: String,
    userinfo: String,
    host: String,
    port: Option<String>,
    tail: String,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.userinfo, self.host)?;

        if let Some(port) = &self.port {
            write!(f, ":{port}")?;
        }

        f.write_str(&self.tail)
    }
}

/// The port as written in an absolute URL's authority. `Url` forgets ports
/// that are the default for the scheme, but those still count here.
fn explicit_port(location: &str) -> Option<String> {
    let (_, rest) = location.trim().split_once("://")?;
    let end = rest
        .find(|c| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    let authority = &rest[..end];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    split_host_port(host_port).1.map(str::to_owned)
}

/// Split a `Host` header value into host name and optional port.
fn split_host_port(host: &str) -> (&str, Option<&str>) {
    let host = host.trim();

    // Bracketed IPv6 literal
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => {
                let port = host[end + 1..].strip_prefix(':');
                (&host[..=end], port)
            }
            None => (host, None),
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            (name, Some(port))
        }
        _ => (host, None),
    }
}
