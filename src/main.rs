//! The re:Web Lambda bootstrap.
//!
//! Startup goes: read the configuration, start the local service, wait for
//! it to answer, and only then register with the Lambda runtime. Lambda
//! counts all of this against the function's init phase.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::value::RawValue;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::broadcast,
};
use tracing::info;

use reweb_lambda::{
    launcher,
    probe::{ProbeOutcome, ReadinessProbe},
    Adapter, Config,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    reweb_lambda::init_logging(config.debug);

    info!(version = env!("CARGO_PKG_VERSION"), "re:Web starting");

    let child = launcher::spawn(&config)?;
    launcher::watch(child);

    // Lambda stops us with SIGTERM; SIGINT is for running by hand.
    let mut sigterm = signal(SignalKind::terminate())?;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            res = tokio::signal::ctrl_c() => {
                if res.is_err() {
                    return;
                }
            }
        }
        let _ = shutdown_tx.send(());
    });

    let mut probe = ReadinessProbe::new(&config)?;
    if let ProbeOutcome::Cancelled { .. } = probe.wait(Some(shutdown_rx)).await {
        return Ok(());
    }

    let adapter = Adapter::init(config)?;
    let ref_adapter = &adapter;

    run(service_fn(|event: LambdaEvent<Box<RawValue>>| async move {
        let (payload, _context) = event.into_parts();
        ref_adapter.handle(payload).await
    }))
    .await?;

    Ok(())
}
