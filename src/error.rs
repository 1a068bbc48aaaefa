//! Invocation failures.
//!
//! Every variant is terminal for the invocation that raised it: the invoker
//! gets the error and no partial response is ever produced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("payload is neither an API Gateway v2 nor an ALB request: {0}")]
    MalformedEvent(String),

    #[error("ALB payload without multiValueHeaders; enable multi-value headers on the target group")]
    MissingMultiValueHeaders,

    #[error("cannot base64-decode request body: {0}")]
    BodyDecode(#[from] base64::DecodeError),

    #[error("cannot build request for the local service: {0}")]
    RequestBuild(String),

    #[error("local service request failed: {0}")]
    UpstreamUnavailable(#[source] reqwest::Error),

    #[error("cannot parse 'Location' response header {value:?}: {source}")]
    LocationParse {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("cannot encode response payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot gzip response body: {0}")]
    Compress(#[from] std::io::Error),
}

pub type Result<T, E = AdapterError> = std::result::Result<T, E>;
