mod analysis;
mod config;
mod dispatcher;
mod nodes;
mod rpc;
mod watch;

use std::sync::Arc;

use alloy_primitives::utils::format_ether;
use color_eyre::eyre::{eyre, Result};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use config::Config;

use self::analysis::Analyzer;
use self::dispatcher::RotatingDispatcher;
use self::watch::{ContractEvent, ContractWatcher, WatchSettings};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::read()?;

    let endpoints = nodes::find_working_endpoints(&config.nodes).await?;
    if endpoints.is_empty() {
        return Err(eyre!("no reliable RPC endpoints available"));
    }
    for endpoint in &endpoints {
        info!(%endpoint, "using endpoint");
    }

    let dispatcher = Arc::new(RotatingDispatcher::connect(
        &endpoints,
        config.watch.rpc_timeout(),
    )?);
    let analyzer = config.analysis.as_ref().map(Analyzer::new).transpose()?;
    let token = CancellationToken::new();

    let settings = WatchSettings::new(&config.watch, endpoints.len());
    let (watcher, mut stream) = ContractWatcher::new(dispatcher, settings, token.clone());

    // spawn tasks and track them
    let tracker = TaskTracker::new();
    let watch = tracker.spawn(watcher.run());
    tracker.spawn(shutdown_on_ctrl_c(token.clone()));

    // the stream ends when the watcher stops, for any reason
    while let Some(event) = stream.next().await {
        select! {
            _ = token.cancelled() => break,
            _ = report(analyzer.as_ref(), &event) => {}
        }
    }

    token.cancel();
    tracker.close();
    tracker.wait().await;

    watch.await??;

    info!("graceful shutdown achieved. Closing");

    Ok(())
}

async fn shutdown_on_ctrl_c(token: CancellationToken) {
    select! {
        _ = token.cancelled() => {}
        res = signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("failed to listen for ctrl-c: {}", e);
            }
            token.cancel();
        }
    }
}

async fn report(analyzer: Option<&Analyzer>, event: &ContractEvent) {
    let address = event.checksummed();
    let balance = format_ether(event.balance);

    let Some(analyzer) = analyzer else {
        info!(%address, %balance, "contract found");
        return;
    };

    match analyzer.is_verified(event.address).await {
        Ok(true) => info!(%address, %balance, "VERIFIED"),
        Ok(false) => {
            info!(%address, %balance, "UNVERIFIED");
            return;
        }
        Err(e) => {
            warn!(%address, "verification lookup failed: {}", e);
            return;
        }
    }

    match analyzer.drainable_functions(event.address).await {
        Ok(functions) if functions.is_empty() => info!(%address, "no drainable functions"),
        Ok(functions) => {
            for function in functions {
                warn!(%address, %balance, %function, "PROFIT: unguarded arbitrary ether send");
            }
        }
        Err(e) => warn!(%address, "analysis failed: {}", e),
    }
}

fn setup() -> Result<()> {
    color_eyre::install()?;

    let filter = EnvFilter::from_default_env();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NEW)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
