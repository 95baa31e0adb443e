//! Chain level metadata that is displayed next to the round state but plays
//! no part in building it.
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::reply::{self, lcd};
use crate::ValidatorAddress;

const ED25519_PUBKEY_TYPE: &str = "/cosmos.crypto.ed25519.PubKey";

/// Staking metadata of one validator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainValidator {
    pub moniker: String,
    pub operator_address: String,
    /// Consensus address matching [Validator::address](crate::Validator),
    /// when it could be derived from the consensus key.
    pub assigned_address: Option<ValidatorAddress>,
    pub jailed: bool,
    pub status: String,
    pub tokens: String,
}

impl From<lcd::StakingValidator> for ChainValidator {
    fn from(validator: lcd::StakingValidator) -> Self {
        let assigned_address = consensus_address(&validator.consensus_pubkey);
        if assigned_address.is_none() {
            tracing::debug!(
                operator = %validator.operator_address,
                key_type = %validator.consensus_pubkey.type_url,
                "Cannot derive consensus address"
            );
        }

        Self {
            moniker: validator.description.moniker,
            operator_address: validator.operator_address,
            assigned_address,
            jailed: validator.jailed,
            status: validator.status,
            tokens: validator.tokens,
        }
    }
}

/// Derives the Tendermint address of an ed25519 consensus key: the first 20
/// bytes of its SHA-256 digest.
///
/// Returns `None` for other key types or keys that are not valid base64.
pub fn consensus_address(key: &lcd::ConsensusPubKey) -> Option<ValidatorAddress> {
    if key.type_url != ED25519_PUBKEY_TYPE {
        return None;
    }

    let bytes = base64::decode(&key.key).ok()?;
    let digest = Sha256::digest(&bytes);

    Some(ValidatorAddress(hex::encode_upper(&digest[..20])))
}

/// Metadata for the whole validator set. Opaque to the round state
/// converter, which only passes it through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChainValidators(Vec<ChainValidator>);

impl ChainValidators {
    pub fn new(validators: Vec<ChainValidator>) -> Self {
        Self(validators)
    }

    pub fn by_address(&self, address: &ValidatorAddress) -> Option<&ChainValidator> {
        self.0
            .iter()
            .find(|v| v.assigned_address.as_ref() == Some(address))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ChainValidator> for ChainValidators {
    fn from_iter<T: IntoIterator<Item = ChainValidator>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Node and chain identity, from `/status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub node_version: String,
    pub latest_block_height: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub latest_block_time: OffsetDateTime,
    pub catching_up: bool,
}

impl From<reply::Status> for ChainInfo {
    fn from(status: reply::Status) -> Self {
        Self {
            chain_id: status.node_info.network,
            node_version: status.node_info.version,
            latest_block_height: status.sync_info.latest_block_height,
            latest_block_time: status.sync_info.latest_block_time,
            catching_up: status.sync_info.catching_up,
        }
    }
}

/// Average interval between blocks over a sample of recent blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlockTime {
    pub average: Duration,
    pub sample_size: u64,
}

impl BlockTime {
    /// Averages the interval between `earlier` and `latest`.
    ///
    /// Returns `None` unless `latest` is both higher and later than `earlier`.
    pub fn between(earlier: &reply::BlockHeader, latest: &reply::BlockHeader) -> Option<Self> {
        let sample_size = latest.height.checked_sub(earlier.height)?;
        if sample_size == 0 {
            return None;
        }

        let elapsed = Duration::try_from(latest.time - earlier.time).ok()?;

        Some(Self {
            average: elapsed.div_f64(sample_size as f64),
            sample_size,
        })
    }
}

/// A pending software upgrade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpgradePlan {
    pub name: String,
    pub height: u64,
    pub info: String,
}

impl From<lcd::Plan> for UpgradePlan {
    fn from(plan: lcd::Plan) -> Self {
        Self {
            name: plan.name,
            height: plan.height,
            info: plan.info,
        }
    }
}

impl UpgradePlan {
    /// Extrapolates when the upgrade height will be reached. `None` if it
    /// already has been.
    pub fn estimated_time(
        &self,
        chain: &ChainInfo,
        block_time: &BlockTime,
    ) -> Option<OffsetDateTime> {
        let remaining = self.height.checked_sub(chain.latest_block_height)?;
        if remaining == 0 {
            return None;
        }

        let until = block_time.average.mul_f64(remaining as f64);
        let until = time::Duration::try_from(until).ok()?;

        chain.latest_block_time.checked_add(until)
    }
}
