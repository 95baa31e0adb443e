//! Captured node replies used across the unit tests.

/// `result` of `/consensus_state` at height 120045, round 2.
pub const CONSENSUS_STATE: &str = include_str!("../fixtures/consensus_state.json");

/// `result` of `/validators?height=120045`, total voting power 2000.
pub const VALIDATORS: &str = include_str!("../fixtures/validators.json");

/// `/cosmos/staking/v1beta1/validators` covering two of the four validators
/// above plus a jailed secp256k1 validator.
pub const STAKING_VALIDATORS: &str = include_str!("../fixtures/staking_validators.json");
