//! Core types of tmtop: the replies of the node APIs, the classified votes
//! and the [State] snapshot built from them.
//!
//! Everything here is pure. Fetching is done by `tmtop-rpc-client` and the
//! scheduling of refreshes lives in the `tmtop` binary.
use std::fmt::Display;

use serde::Serializer;

pub mod chain;
pub mod consts;
mod error;
pub mod reply;
mod state;
mod validator;
mod vote;

#[cfg(test)]
mod fixtures;

pub use chain::{BlockTime, ChainInfo, ChainValidator, ChainValidators, UpgradePlan};
pub use error::ConversionError;
pub use state::State;
pub use validator::{Validator, ValidatorAddress, Validators};
pub use vote::Vote;

/// Serializes arbitrary precision numbers as their decimal string.
pub(crate) fn serialize_display<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Display,
{
    serializer.collect_str(value)
}
