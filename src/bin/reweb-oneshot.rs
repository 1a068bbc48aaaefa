//! "Oneshot" version of re:Web.
//!
//! This executable runs a single invocation payload through the whole
//! lifecycle: start the local service, wait for it, translate the payload,
//! print the response payload, and stop the service again. Configuration
//! comes from the same `REWEB_*` environment variables as the Lambda
//! bootstrap.

use anyhow::{anyhow, Context};
use lambda_runtime::Error;
use std::{env, io::Write};

use reweb_lambda::{
    launcher,
    probe::{ProbeOutcome, ReadinessProbe},
    Adapter, Config,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let arg = args.next().ok_or_else(|| -> Error {
        "argument should be JSON payload text, or @path to a file containing it".into()
    })?;

    let payload = match arg.strip_prefix('@') {
        Some(path) => std::fs::read(path).with_context(|| format!("cannot read {path}"))?,
        None => arg.into_bytes(),
    };

    let config = Config::from_env()?;
    reweb_lambda::init_logging(config.debug);

    let mut child = launcher::spawn(&config)?;

    let result = invoke_once(&config, &payload).await;

    let _ = child.kill().await;

    let out = result?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&out)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

async fn invoke_once(config: &Config, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    match ReadinessProbe::new(config)?.wait(None).await {
        ProbeOutcome::Ready { .. } => {}
        ProbeOutcome::Cancelled { .. } => return Err(anyhow!("readiness probe cancelled")),
    }

    let adapter = Adapter::init(config.clone())?;
    Ok(adapter.invoke(payload).await?)
}
