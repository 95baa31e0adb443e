//! Replies of the Tendermint RPC and the Cosmos SDK REST API.
//!
//! Only the fields tmtop consumes are declared, everything else is ignored.
//! These are the `result` payloads: the JSON-RPC envelope is handled by the
//! client.
use serde::Deserialize;
use time::OffsetDateTime;

use crate::ValidatorAddress;

/// `GET /consensus_state`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ConsensusState {
    pub round_state: RoundState,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RoundState {
    /// `<height>/<round>/<step>`
    #[serde(rename = "height/round/step")]
    pub height_round_step: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub proposer: Proposer,
    #[serde(default)]
    pub height_vote_set: Vec<HeightVoteSet>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Proposer {
    pub address: ValidatorAddress,
}

/// Raw votes of one round, positionally indexed to the validator set.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HeightVoteSet {
    pub round: i64,
    pub prevotes: Vec<String>,
    pub precommits: Vec<String>,
}

/// `GET /validators?height=&page=&per_page=`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ValidatorsPage {
    #[serde(with = "dec_str")]
    pub block_height: u64,
    pub validators: Vec<TendermintValidator>,
    #[serde(with = "dec_str")]
    pub count: u64,
    #[serde(with = "dec_str")]
    pub total: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct TendermintValidator {
    pub address: ValidatorAddress,
    /// Decimal string. Kept raw, parsing is the converter's job.
    pub voting_power: String,
}

/// `GET /status`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub network: String,
    pub version: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SyncInfo {
    #[serde(with = "dec_str")]
    pub latest_block_height: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub latest_block_time: OffsetDateTime,
    pub catching_up: bool,
}

/// `GET /block?height=`
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub block: BlockBody,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BlockBody {
    pub header: BlockHeader,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    #[serde(with = "dec_str")]
    pub height: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

/// JSON-RPC error object.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// Cosmos SDK REST replies.
pub mod lcd {
    use serde::Deserialize;

    use super::dec_str;

    /// `GET /cosmos/staking/v1beta1/validators`
    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct StakingValidators {
        pub validators: Vec<StakingValidator>,
        #[serde(default)]
        pub pagination: Option<Pagination>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct StakingValidator {
        pub operator_address: String,
        pub consensus_pubkey: ConsensusPubKey,
        #[serde(default)]
        pub jailed: bool,
        pub status: String,
        pub tokens: String,
        pub description: Description,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct ConsensusPubKey {
        #[serde(rename = "@type")]
        pub type_url: String,
        /// Base64 encoded key bytes.
        pub key: String,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct Description {
        pub moniker: String,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct Pagination {
        pub next_key: Option<String>,
    }

    /// `GET /cosmos/upgrade/v1beta1/current_plan`
    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct CurrentPlan {
        pub plan: Option<Plan>,
    }

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
    pub struct Plan {
        pub name: String,
        #[serde(with = "dec_str")]
        pub height: u64,
        #[serde(default)]
        pub info: String,
    }
}

/// Integers encoded as decimal strings, which is how both APIs send 64-bit
/// values.
pub(crate) mod dec_str {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(|e| {
            serde::de::Error::custom(format!("invalid decimal integer {raw:?}: {e}"))
        })
    }
}
