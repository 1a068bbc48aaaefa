//! re:Web for AWS Lambda
//!
//! This library lets an ordinary web application run inside a Lambda
//! function. The application is started as a child process listening on a
//! loopback port (the "local service"); each Lambda invocation is then
//! translated into a plain HTTP request against it, and its HTTP response is
//! translated back into whatever the invoker expects.
//!
//! Two invokers are supported, and they disagree about almost everything:
//!
//! - API Gateway HTTP APIs, with payload format 2.0
//! - Application Load Balancer target groups, with multi-value headers
//!   enabled
//!
//! The pipeline for each invocation is: `event::normalize` →
//! `request::build` → `request::send` → `location::rewrite_response` →
//! `response::encode`. Nothing carries over between invocations apart from
//! the configuration and the HTTP connection pool.
//!
//! The same code is compiled into two executables: `reweb-lambda`, the
//! actual Lambda bootstrap, and `reweb-oneshot`, which runs a single payload
//! from the command line for local testing.

use lambda_runtime::Error;
use serde_json::value::RawValue;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod event;
pub mod headers;
pub mod launcher;
pub mod location;
pub mod probe;
pub mod request;
pub mod response;

pub use config::Config;
pub use error::AdapterError;
pub use event::{CanonicalRequest, SourceKind};
pub use response::CanonicalResponse;

/// How the local service is addressed. Redirects pointing here are assumed
/// to have leaked the internal address.
pub const LOOPBACK_HOST: &str = "localhost";

/// Set up logging for the executables.
///
/// `RUST_LOG` wins if set; otherwise we log at INFO, or DEBUG if
/// `REWEB_DEBUG` is on. Records from crates that use `log` rather than
/// `tracing` are forwarded too.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false) // don't print the module name
        .without_time() // don't print time (CloudWatch has it)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        let _ = tracing_log::LogTracer::init();
    }
}

/// State shared by all invocations handled by this process.
pub struct Adapter {
    config: Config,
    client: reqwest::Client,
}

impl Adapter {
    pub fn init(config: Config) -> reqwest::Result<Self> {
        Ok(Adapter {
            client: request::local_client()?,
            config,
        })
    }

    /// Handle one invocation: a raw event payload in, a raw response payload
    /// out. Any error fails the invocation as a whole.
    pub async fn invoke(&self, payload: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let result = self.invoke_inner(payload).await;

        if let Err(e) = &result {
            error!(error = %e, "invocation failed");
        }

        result
    }

    async fn invoke_inner(&self, payload: &[u8]) -> Result<Vec<u8>, AdapterError> {
        debug!(payload_len = payload.len(), "invoke");

        let mut req = event::normalize(payload)?;
        let body = std::mem::take(&mut req.body);

        let outbound = request::build(&self.client, &self.config, &req, body)?;
        debug!(method = %outbound.method(), url = %outbound.url(), source = ?req.source, "request");

        let resp = request::send(&self.client, outbound).await?;
        let mut resp = CanonicalResponse::read(resp).await?;

        location::rewrite_response(&mut resp, &req, &self.config)?;

        response::encode(resp, req.source, self.config.force_gzip)
    }

    /// Lambda runtime glue around `invoke()`. The payload is taken as raw
    /// JSON so that shape detection sees the event exactly as sent.
    pub async fn handle(&self, payload: Box<RawValue>) -> Result<Box<RawValue>, Error> {
        let out = self.invoke(payload.get().as_bytes()).await?;
        Ok(RawValue::from_string(String::from_utf8(out)?)?)
    }
}
