//! Starting the local service.
//!
//! We run the configured command through `/bin/sh -c` so that it can be a
//! full shell command line, with its stderr folded into stdout so everything
//! ends up in the same CloudWatch stream as our own logs. We don't supervise
//! it beyond logging if it exits.

use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{error, info};

use crate::config::Config;

pub const SHELL: &str = "/bin/sh";

pub fn command(config: &Config) -> Command {
    let mut cmd = Command::new(SHELL);
    cmd.arg("-c")
        .arg(format!("{} 2>&1", config.application_exec))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

pub fn spawn(config: &Config) -> Result<Child> {
    let child = command(config)
        .spawn()
        .with_context(|| format!("cannot start local service {:?}", config.application_exec))?;

    info!(pid = ?child.id(), exec = %config.application_exec, "started local service");
    Ok(child)
}

/// Log when the local service exits. Invocations after that will fail with
/// `UpstreamUnavailable`; restarting it is up to the Lambda runtime.
pub fn watch(mut child: Child) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => error!(%status, "local service exited"),
            Err(e) => error!(error = %e, "cannot wait for local service"),
        }
    });
}
