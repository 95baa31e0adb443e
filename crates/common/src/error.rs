use crate::ValidatorAddress;

/// Reasons a round state cannot be turned into a [State](crate::State).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("Malformed height/round/step field: {0:?}")]
    MalformedRoundField(String),
    #[error("Malformed voting power {voting_power:?} of validator {address}")]
    MalformedVotingPower {
        address: ValidatorAddress,
        voting_power: String,
    },
    #[error(
        "Vote arrays do not match the validator set: {prevotes} prevotes, {precommits} \
         precommits, {validators} validators"
    )]
    ArrayLengthMismatch {
        prevotes: usize,
        precommits: usize,
        validators: usize,
    },
    #[error("Round state has no vote set")]
    MissingVoteSet,
}
