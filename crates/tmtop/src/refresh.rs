//! Periodic refresh of everything tmtop shows.
//!
//! Every data source has its own cycle. A cycle fetches, then replaces its
//! part of the shared [Snapshot] in one [watch::Sender::send_modify] call, so
//! readers never observe a partially updated value. A failed fetch keeps the
//! previous value and records the error instead.
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use num_traits::ToPrimitive;
use serde::Serialize;
use tmtop_common::reply::BlockHeader;
use tmtop_common::{
    BlockTime, ChainInfo, ChainValidator, ChainValidators, State, UpgradePlan,
};
use tmtop_rpc_client::{ClientApi, LcdApi};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Number of blocks the average block time is measured over.
pub const BLOCK_TIME_SAMPLE: u64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cycle {
    Consensus,
    ChainValidators,
    ChainInfo,
    Upgrade,
    BlockTime,
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cycle::Consensus => "consensus",
            Cycle::ChainValidators => "chain validators",
            Cycle::ChainInfo => "chain info",
            Cycle::Upgrade => "upgrade",
            Cycle::BlockTime => "block time",
        })
    }
}

/// Latest known value of every data source.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// `None` until the first round state was converted.
    pub state: Option<State>,
    /// Cache fed to the consensus cycle.
    pub chain_validators: ChainValidators,
    pub chain_info: Option<ChainInfo>,
    pub block_time: Option<BlockTime>,
    pub upgrade: Option<UpgradePlan>,
    /// Error of the last run of each cycle, cleared by the next success.
    pub errors: BTreeMap<Cycle, String>,
}

/// Runs `fetch` every `interval` until `cancel` fires, storing the result
/// with `apply` on success.
pub async fn run<T, F, Fut>(
    cycle: Cycle,
    interval: Duration,
    snapshot: &watch::Sender<Snapshot>,
    cancel: CancellationToken,
    mut fetch: F,
    apply: impl Fn(&mut Snapshot, T),
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = async {
                ticker.tick().await;
                fetch().await
            } => result,
        };

        match result {
            Ok(value) => snapshot.send_modify(|s| {
                s.errors.remove(&cycle);
                apply(s, value);
            }),
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(%cycle, error=%message, "Refresh failed");
                snapshot.send_modify(|s| {
                    s.errors.insert(cycle, message);
                });
            }
        }
    }

    tracing::debug!(%cycle, "Refresh stopped");
}

/// Fetches the round state and the validator set at its height, and joins
/// them into a [State].
pub async fn fetch_state(
    client: &impl ClientApi,
    chain_validators: ChainValidators,
) -> anyhow::Result<State> {
    let round_state = client
        .consensus_state()
        .await
        .context("Fetching consensus state")?
        .round_state;

    let height = round_state.height().context("Reading round height")?;
    let validators = client
        .validators(height)
        .await
        .with_context(|| format!("Fetching validators at height {height}"))?;

    let state = State::from_round_state(&round_state, &validators, chain_validators)
        .context("Converting consensus state")?;

    record_state_metrics(&state);

    Ok(state)
}

fn record_state_metrics(state: &State) {
    metrics::gauge!("tmtop_consensus_height", state.height as f64);
    metrics::gauge!("tmtop_consensus_round", state.round as f64);
    metrics::gauge!("tmtop_consensus_step", state.step as f64);

    let prevoted = state.validators.prevoted_percent(true).to_f64();
    let precommitted = state.validators.precommitted_percent(true).to_f64();
    if let (Some(prevoted), Some(precommitted)) = (prevoted, precommitted) {
        metrics::gauge!("tmtop_prevoted_percent", prevoted);
        metrics::gauge!("tmtop_precommitted_percent", precommitted);
    }
}

pub async fn fetch_chain_validators(lcd: &impl LcdApi) -> anyhow::Result<ChainValidators> {
    let validators = lcd
        .staking_validators()
        .await
        .context("Fetching staking validators")?;

    Ok(validators.into_iter().map(ChainValidator::from).collect())
}

pub async fn fetch_chain_info(client: &impl ClientApi) -> anyhow::Result<ChainInfo> {
    let status = client.status().await.context("Fetching node status")?;
    Ok(status.into())
}

pub async fn fetch_upgrade(lcd: &impl LcdApi) -> anyhow::Result<Option<UpgradePlan>> {
    let plan = lcd
        .current_upgrade_plan()
        .await
        .context("Fetching upgrade plan")?;

    Ok(plan.map(UpgradePlan::from))
}

/// Averages the block time over the last [BLOCK_TIME_SAMPLE] blocks, or all
/// of them on a younger chain. `None` while there is only one block.
pub async fn fetch_block_time(client: &impl ClientApi) -> anyhow::Result<Option<BlockTime>> {
    let latest = header(client, None).await?;

    let earlier_height = latest.height.saturating_sub(BLOCK_TIME_SAMPLE).max(1);
    if earlier_height >= latest.height {
        return Ok(None);
    }
    let earlier = header(client, Some(earlier_height)).await?;

    Ok(BlockTime::between(&earlier, &latest))
}

async fn header(client: &impl ClientApi, height: Option<u64>) -> anyhow::Result<BlockHeader> {
    let block = client.block(height).await.with_context(|| match height {
        Some(height) => format!("Fetching block {height}"),
        None => "Fetching latest block".to_owned(),
    })?;

    Ok(block.block.header)
}
