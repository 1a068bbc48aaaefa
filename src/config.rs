//! Process configuration.
//!
//! Everything is read from `REWEB_*` environment variables exactly once, in
//! `main`, and then handed around by reference. Nothing here is mutable after
//! startup.

use thiserror::Error;

pub const ENV_APPLICATION_EXEC: &str = "REWEB_APPLICATION_EXEC";
pub const ENV_APPLICATION_PORT: &str = "REWEB_APPLICATION_PORT";
pub const ENV_FORCE_GZIP: &str = "REWEB_FORCE_GZIP";
pub const ENV_WAIT_PATH: &str = "REWEB_WAIT_PATH";
pub const ENV_WAIT_CODE: &str = "REWEB_WAIT_CODE";
pub const ENV_DEBUG: &str = "REWEB_DEBUG";
pub const ENV_GATEWAY_FORCE_HTTPS: &str = "REWEB_GATEWAY_FORCE_HTTPS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing {0} environment variable")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Shell command line that starts the local service.
    pub application_exec: String,

    /// Port the local service listens on, on loopback.
    pub application_port: u16,

    /// Gzip every response body and mark it `Content-Encoding: gzip`.
    pub force_gzip: bool,

    /// Path polled by the readiness probe. Always starts with `/`.
    pub wait_path: String,

    /// Status code the readiness probe waits for. `None` means any response
    /// at all counts as ready.
    pub wait_code: Option<String>,

    pub debug: bool,

    /// Upgrade same-host `http://` redirects to `https://` for API Gateway
    /// invocations, which are never served over plain HTTP.
    pub gateway_force_https: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nonempty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let application_exec =
            nonempty(ENV_APPLICATION_EXEC).ok_or(ConfigError::Missing(ENV_APPLICATION_EXEC))?;

        let port_text =
            nonempty(ENV_APPLICATION_PORT).ok_or(ConfigError::Missing(ENV_APPLICATION_PORT))?;
        let application_port = match port_text.trim().parse::<u16>() {
            Ok(p) if p != 0 => p,
            _ => {
                return Err(ConfigError::Invalid {
                    name: ENV_APPLICATION_PORT,
                    value: port_text,
                    reason: "expected a TCP port number",
                })
            }
        };

        let mut wait_path = nonempty(ENV_WAIT_PATH).unwrap_or_else(|| "/".to_owned());
        if !wait_path.starts_with('/') {
            wait_path.insert(0, '/');
        }

        let wait_code = match nonempty(ENV_WAIT_CODE) {
            None => None,
            Some(code) => {
                let code = code.trim().to_owned();
                if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ConfigError::Invalid {
                        name: ENV_WAIT_CODE,
                        value: code,
                        reason: "expected a three-digit HTTP status code",
                    });
                }
                Some(code)
            }
        };

        let gateway_force_https = match nonempty(ENV_GATEWAY_FORCE_HTTPS) {
            None => true,
            Some(v) => !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            ),
        };

        Ok(Config {
            application_exec,
            application_port,
            force_gzip: nonempty(ENV_FORCE_GZIP).is_some(),
            wait_path,
            wait_code,
            debug: nonempty(ENV_DEBUG).is_some(),
            gateway_force_https,
        })
    }

    /// Base URL of the local service, without a trailing slash.
    pub fn local_base_url(&self) -> String {
        format!("http://{}:{}", crate::LOOPBACK_HOST, self.application_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_APPLICATION_EXEC, "httpd -DFOREGROUND"),
            (ENV_APPLICATION_PORT, "8080"),
        ]))
        .unwrap();

        assert_eq!(cfg.application_port, 8080);
        assert_eq!(cfg.wait_path, "/");
        assert_eq!(cfg.wait_code, None);
        assert!(!cfg.force_gzip);
        assert!(!cfg.debug);
        assert!(cfg.gateway_force_https);
        assert_eq!(cfg.local_base_url(), "http://localhost:8080");
    }

    #[test]
    fn flags_and_wait_settings() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_APPLICATION_EXEC, "app"),
            (ENV_APPLICATION_PORT, "3000"),
            (ENV_FORCE_GZIP, "1"),
            (ENV_DEBUG, "yes"),
            (ENV_WAIT_PATH, "healthz"),
            (ENV_WAIT_CODE, "200"),
            (ENV_GATEWAY_FORCE_HTTPS, "off"),
        ]))
        .unwrap();

        assert!(cfg.force_gzip);
        assert!(cfg.debug);
        assert_eq!(cfg.wait_path, "/healthz");
        assert_eq!(cfg.wait_code.as_deref(), Some("200"));
        assert!(!cfg.gateway_force_https);
    }

    #[test]
    fn empty_flag_counts_as_unset() {
        let cfg = Config::from_lookup(lookup(&[
            (ENV_APPLICATION_EXEC, "app"),
            (ENV_APPLICATION_PORT, "3000"),
            (ENV_FORCE_GZIP, ""),
        ]))
        .unwrap();
        assert!(!cfg.force_gzip);
    }

    #[test]
    fn missing_required() {
        assert_eq!(
            Config::from_lookup(lookup(&[(ENV_APPLICATION_PORT, "80")])),
            Err(ConfigError::Missing(ENV_APPLICATION_EXEC))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[(ENV_APPLICATION_EXEC, "app")])),
            Err(ConfigError::Missing(ENV_APPLICATION_PORT))
        );
    }

    #[test]
    fn rejects_bad_port_and_code() {
        assert!(matches!(
            Config::from_lookup(lookup(&[
                (ENV_APPLICATION_EXEC, "app"),
                (ENV_APPLICATION_PORT, "http"),
            ])),
            Err(ConfigError::Invalid { name: ENV_APPLICATION_PORT, .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[
                (ENV_APPLICATION_EXEC, "app"),
                (ENV_APPLICATION_PORT, "8080"),
                (ENV_WAIT_CODE, "OK"),
            ])),
            Err(ConfigError::Invalid { name: ENV_WAIT_CODE, .. })
        ));
    }
}
