//! Waiting for the local service to come up.
//!
//! Lambda only starts sending us invocations once we ask for the first one,
//! so we hold off on that until the local service answers on its wait path
//! (with the expected status, if one is configured). There is deliberately
//! no upper bound on how long we wait: if the service never comes up, the
//! Lambda init timeout will take care of us.

use reqwest::{header::LOCATION, Client};
use std::time::Duration;
use tokio::{sync::broadcast, time};
use tracing::{debug, info};

use crate::{config::Config, request::probe_client};

/// Per-attempt timeout.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Connection failures are only logged once per this many attempts.
pub const CONNECT_LOG_EVERY: u64 = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeState {
    Polling,
    Ready,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeOutcome {
    Ready { status: u16, attempts: u64 },
    Cancelled { attempts: u64 },
}

pub struct ReadinessProbe {
    client: Client,
    url: String,
    wait_code: Option<String>,
    state: ProbeState,
    attempts: u64,
    last_status: u16,
}

impl ReadinessProbe {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        Ok(ReadinessProbe {
            client: probe_client(ATTEMPT_TIMEOUT)?,
            url: format!("{}{}", config.local_base_url(), config.wait_path),
            wait_code: config.wait_code.clone(),
            state: ProbeState::Polling,
            attempts: 0,
            last_status: 0,
        })
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Make one attempt, returning the resulting state.
    pub async fn poll_once(&mut self) -> ProbeState {
        if self.state == ProbeState::Ready {
            return self.state;
        }

        let attempt = self.attempts;
        self.attempts += 1;

        let resp = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                if attempt % CONNECT_LOG_EVERY == 0 {
                    info!(url = %self.url, error = %e, "service not up");
                } else {
                    debug!(url = %self.url, error = %e, "service not up");
                }
                return self.state;
            }
        };

        let status = resp.status();

        let ready = match &self.wait_code {
            None => true,
            Some(code) => status.as_str() == code,
        };

        if ready {
            info!(%status, attempts = self.attempts, "service up");
            self.state = ProbeState::Ready;
            self.last_status = status.as_u16();
        } else if status.is_redirection() {
            let location = resp
                .headers()
                .get(LOCATION)
                .map(|l| String::from_utf8_lossy(l.as_bytes()).into_owned())
                .unwrap_or_default();
            info!(
                expected = ?self.wait_code,
                %status,
                %location,
                "service up, not ready"
            );
        } else {
            info!(expected = ?self.wait_code, %status, "service up, not ready");
        }

        self.state
    }

    /// Poll until the service is ready, or until `shutdown` fires.
    ///
    /// A dropped shutdown sender is not a shutdown request; we just stop
    /// listening for one.
    pub async fn wait(&mut self, mut shutdown: Option<broadcast::Receiver<()>>) -> ProbeOutcome {
        loop {
            if self.poll_once().await == ProbeState::Ready {
                return ProbeOutcome::Ready {
                    status: self.last_status,
                    attempts: self.attempts,
                };
            }

            let mut closed = false;

            match shutdown.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = time::sleep(RETRY_INTERVAL) => {}
                        res = rx.recv() => match res {
                            Err(broadcast::error::RecvError::Closed) => closed = true,
                            _ => {
                                info!(attempts = self.attempts, "readiness probe cancelled");
                                return ProbeOutcome::Cancelled { attempts: self.attempts };
                            }
                        },
                    }
                }
                None => time::sleep(RETRY_INTERVAL).await,
            }

            if closed {
                shutdown = None;
            }
        }
    }
}
