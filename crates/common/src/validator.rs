use std::fmt;
use std::ops::Deref;

use bigdecimal::BigDecimal;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::Vote;

/// Upper-case hex consensus address of a validator, as reported by
/// Tendermint RPC.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorAddress(pub String);

impl ValidatorAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ValidatorAddress {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A member of the active validator set together with its votes in the
/// current round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Validator {
    /// Position in the vote arrays of the round state.
    pub index: usize,
    pub address: ValidatorAddress,
    pub prevote: Vote,
    pub precommit: Vote,
    #[serde(serialize_with = "crate::serialize_display")]
    pub voting_power: BigUint,
    /// Share of the total voting power, in percent.
    #[serde(serialize_with = "crate::serialize_display")]
    pub voting_power_percent: BigDecimal,
    pub is_proposer: bool,
}

/// Validators of one round, in the order of the round state's vote arrays.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Validators(Vec<Validator>);

impl Validators {
    pub fn new(validators: Vec<Validator>) -> Self {
        Self(validators)
    }

    pub fn total_voting_power(&self) -> BigUint {
        self.0.iter().map(|v| &v.voting_power).sum()
    }

    pub fn proposer(&self) -> Option<&Validator> {
        self.0.iter().find(|v| v.is_proposer)
    }

    /// Share of voting power that has prevoted, in percent.
    ///
    /// Prevotes for the zero hash are only counted when `count_zero` is set.
    pub fn prevoted_percent(&self, count_zero: bool) -> BigDecimal {
        self.percent_where(|v| counts(v.prevote, count_zero))
    }

    /// Share of voting power that has precommitted, in percent.
    pub fn precommitted_percent(&self, count_zero: bool) -> BigDecimal {
        self.percent_where(|v| counts(v.precommit, count_zero))
    }

    fn percent_where(&self, f: impl Fn(&Validator) -> bool) -> BigDecimal {
        self.0
            .iter()
            .filter(|v| f(v))
            .fold(BigDecimal::zero(), |acc, v| acc + &v.voting_power_percent)
    }
}

fn counts(vote: Vote, count_zero: bool) -> bool {
    match vote {
        Vote::Voted => true,
        Vote::VotedZero => count_zero,
        Vote::VotedNil => false,
    }
}

impl Deref for Validators {
    type Target = [Validator];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Validators {
    type Item = &'a Validator;
    type IntoIter = std::slice::Iter<'a, Validator>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(index: usize, prevote: Vote, precommit: Vote, percent: u32) -> Validator {
        Validator {
            index,
            address: ValidatorAddress(format!("{index:040X}")),
            prevote,
            precommit,
            voting_power: BigUint::from(percent),
            voting_power_percent: BigDecimal::from(percent),
            is_proposer: index == 1,
        }
    }

    fn validators() -> Validators {
        Validators::new(vec![
            validator(0, Vote::Voted, Vote::Voted, 40),
            validator(1, Vote::VotedZero, Vote::VotedNil, 30),
            validator(2, Vote::VotedNil, Vote::Voted, 20),
            validator(3, Vote::Voted, Vote::VotedNil, 10),
        ])
    }

    #[test]
    fn aggregates() {
        let validators = validators();

        assert_eq!(validators.total_voting_power(), BigUint::from(100u32));
        assert_eq!(validators.proposer().map(|v| v.index), Some(1));
        assert_eq!(validators.prevoted_percent(false), BigDecimal::from(50u32));
        assert_eq!(validators.prevoted_percent(true), BigDecimal::from(80u32));
        assert_eq!(validators.precommitted_percent(true), BigDecimal::from(60u32));
    }

    #[test]
    fn empty_set_has_no_power() {
        let validators = Validators::default();

        assert!(validators.total_voting_power().is_zero());
        assert!(validators.proposer().is_none());
        assert!(validators.prevoted_percent(true).is_zero());
    }

    #[test]
    fn serializes_big_numbers_as_strings() {
        let mut validator = validator(0, Vote::Voted, Vote::VotedNil, 25);
        validator.voting_power = "999999999999999999999999".parse().unwrap();

        let json = serde_json::to_value(&validator).unwrap();

        assert_eq!(json["voting_power"], "999999999999999999999999");
        assert_eq!(json["voting_power_percent"], "25");
        assert_eq!(json["prevote"], "Voted");
    }
}
