#![deny(rust_2018_idioms)]

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use time::OffsetDateTime;
use tmtop_common::consts::VERSION;
use tmtop_lib::config::Config;
use tmtop_lib::display::Screen;
use tmtop_lib::monitoring;
use tmtop_lib::refresh::{self, Cycle, Snapshot};
use tmtop_rpc_client::{Client, LcdClient};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    let config = Config::parse();

    setup_tracing(
        config.color.is_color_enabled(std::io::stderr()),
        config.log_output_json,
    );

    info!(version = VERSION, rpc_host = %config.rpc_host, "🏁 Starting tmtop");

    let (snapshot, snapshot_rx) = watch::channel(Snapshot::default());
    let snapshot = Arc::new(snapshot);

    // Installed before the clients are created, so that their metrics are registered.
    if let Some(monitor_address) = config.monitor_address {
        let prometheus_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Creating Prometheus recorder")?;
        let (addr, _jh) =
            monitoring::spawn_server(monitor_address, snapshot_rx.clone(), prometheus_handle)?;
        info!(%addr, "Monitoring server started");
    }

    let client =
        Client::new(config.rpc_host.clone(), config.request_timeout).context("Creating RPC client")?;
    let lcd = config
        .lcd_host
        .clone()
        .map(|url| LcdClient::new(url, config.request_timeout))
        .transpose()
        .context("Creating LCD client")?;

    let staking = config
        .chain_validators_host()
        .cloned()
        .map(|url| LcdClient::new(url, config.request_timeout))
        .transpose()
        .context("Creating staking LCD client")?;

    if lcd.is_none() {
        info!("No LCD host configured, upgrades are not queried");
    }
    if staking.is_none() {
        info!("Validator monikers are not queried");
    }

    let intervals = config.intervals;
    let cancel = CancellationToken::new();
    let tasks = TaskTracker::new();

    tasks.spawn({
        let client = client.clone();
        let snapshot = snapshot.clone();
        let cancel = cancel.clone();
        async move {
            refresh::run(
                Cycle::Consensus,
                intervals.consensus,
                &snapshot,
                cancel,
                || {
                    let chain_validators = snapshot.borrow().chain_validators.clone();
                    refresh::fetch_state(&client, chain_validators)
                },
                |s, state| s.state = Some(state),
            )
            .await
        }
    });

    tasks.spawn({
        let client = client.clone();
        let snapshot = snapshot.clone();
        let cancel = cancel.clone();
        async move {
            refresh::run(
                Cycle::ChainInfo,
                intervals.chain_info,
                &snapshot,
                cancel,
                || refresh::fetch_chain_info(&client),
                |s, info| s.chain_info = Some(info),
            )
            .await
        }
    });

    tasks.spawn({
        let client = client.clone();
        let snapshot = snapshot.clone();
        let cancel = cancel.clone();
        async move {
            refresh::run(
                Cycle::BlockTime,
                intervals.block_time,
                &snapshot,
                cancel,
                || refresh::fetch_block_time(&client),
                |s, block_time| s.block_time = block_time,
            )
            .await
        }
    });

    if let Some(staking) = staking {
        tasks.spawn({
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            async move {
                refresh::run(
                    Cycle::ChainValidators,
                    intervals.chain_validators,
                    &snapshot,
                    cancel,
                    || refresh::fetch_chain_validators(&staking),
                    |s, validators| s.chain_validators = validators,
                )
                .await
            }
        });
    }

    if let Some(lcd) = lcd {
        tasks.spawn({
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            async move {
                refresh::run(
                    Cycle::Upgrade,
                    intervals.upgrade,
                    &snapshot,
                    cancel,
                    || refresh::fetch_upgrade(&lcd),
                    |s, plan| s.upgrade = plan,
                )
                .await
            }
        });
    }

    tasks.spawn(render(
        snapshot_rx,
        intervals.consensus,
        config.color.is_color_enabled(std::io::stdout()),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Listening for the interrupt signal")?;

    info!("Shutdown started, waiting for tasks to finish...");
    cancel.cancel();
    tasks.close();
    tasks.wait().await;
    info!("Shutdown finished successfully");

    Ok(())
}

/// Prints the snapshot every `interval`. Stops on `cancel` or when stdout is gone.
async fn render(
    snapshot: watch::Receiver<Snapshot>,
    interval: Duration,
    color: bool,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let clear = std::io::stdout().is_terminal();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let screen = Screen::new(&snapshot.borrow(), OffsetDateTime::now_utc(), color).to_string();

        if let Err(e) = print(&screen, clear) {
            tracing::error!(error=%e, "Writing to stdout failed");
            break;
        }
    }
}

fn print(screen: &str, clear: bool) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if clear {
        // Clear the terminal and move the cursor home.
        write!(stdout, "\x1b[2J\x1b[H")?;
    }
    writeln!(stdout, "{screen}")?;
    stdout.flush()
}

fn setup_tracing(color: bool, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(color);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
