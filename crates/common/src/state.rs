//! Turns a raw round state and validator roster into a [State].
use bigdecimal::BigDecimal;
use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use serde::Serialize;
use time::OffsetDateTime;

use crate::reply::{RoundState, TendermintValidator};
use crate::{ChainValidators, ConversionError, Validator, Validators, Vote};

/// One fully formed snapshot of the observed consensus round.
///
/// Built from scratch every refresh and never modified afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct State {
    pub validators: Validators,
    pub chain_validators: ChainValidators,
    pub height: i64,
    pub round: i64,
    pub step: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
}

impl State {
    /// Joins the first vote set of `round_state` with `validators` by position.
    ///
    /// Either every field is valid and a complete [State] is returned, or
    /// nothing is. `chain_validators` is passed through as is.
    pub fn from_round_state(
        round_state: &RoundState,
        validators: &[TendermintValidator],
        chain_validators: ChainValidators,
    ) -> Result<Self, ConversionError> {
        let vote_set = round_state
            .height_vote_set
            .first()
            .ok_or(ConversionError::MissingVoteSet)?;

        let prevotes = &vote_set.prevotes;
        let precommits = &vote_set.precommits;

        if prevotes.len() != precommits.len() || prevotes.len() != validators.len() {
            return Err(ConversionError::ArrayLengthMismatch {
                prevotes: prevotes.len(),
                precommits: precommits.len(),
                validators: validators.len(),
            });
        }

        let powers = validators
            .iter()
            .map(parse_voting_power)
            .collect::<Result<Vec<_>, _>>()?;

        let (height, round, step) = parse_height_round_step(&round_state.height_round_step)?;

        let total: BigUint = powers.iter().sum();
        let total = to_decimal(&total);
        let hundred = BigDecimal::from(100u32);

        let mut built = Vec::with_capacity(validators.len());
        for (i, power) in powers.into_iter().enumerate() {
            let roster = &validators[i];

            let voting_power_percent = if total.is_zero() {
                BigDecimal::zero()
            } else {
                to_decimal(&power) * &hundred / &total
            };

            built.push(Validator {
                index: i,
                address: roster.address.clone(),
                prevote: Vote::from_raw(&prevotes[i]),
                precommit: Vote::from_raw(&precommits[i]),
                voting_power: power,
                voting_power_percent,
                is_proposer: roster.address == round_state.proposer.address,
            });
        }

        Ok(Self {
            validators: Validators::new(built),
            chain_validators,
            height,
            round,
            step,
            start_time: round_state.start_time,
        })
    }
}

impl RoundState {
    /// Block height of the round, used to fetch the matching validator set.
    pub fn height(&self) -> Result<u64, ConversionError> {
        let (height, _, _) = parse_height_round_step(&self.height_round_step)?;
        u64::try_from(height)
            .map_err(|_| ConversionError::MalformedRoundField(self.height_round_step.clone()))
    }
}

fn parse_voting_power(validator: &TendermintValidator) -> Result<BigUint, ConversionError> {
    let raw = validator.voting_power.as_str();
    let malformed = || ConversionError::MalformedVotingPower {
        address: validator.address.clone(),
        voting_power: raw.to_owned(),
    };

    // BigUint's parser also accepts a sign and digit separators.
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    BigUint::parse_bytes(raw.as_bytes(), 10).ok_or_else(malformed)
}

fn parse_height_round_step(raw: &str) -> Result<(i64, i64, i64), ConversionError> {
    let malformed = || ConversionError::MalformedRoundField(raw.to_owned());

    match raw.split('/').collect::<Vec<_>>().as_slice() {
        [height, round, step] => {
            let parse = |s: &str| s.parse::<i64>().map_err(|_| malformed());
            Ok((parse(height)?, parse(round)?, parse(step)?))
        }
        _ => Err(malformed()),
    }
}

fn to_decimal(value: &BigUint) -> BigDecimal {
    BigDecimal::new(BigInt::from(value.clone()), 0)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use assert_matches::assert_matches;
    use pretty_assertions_sorted::assert_eq;
    use rstest::rstest;
    use time::macros::datetime;

    use super::*;
    use crate::reply::{ConsensusState, HeightVoteSet, Proposer, ValidatorsPage};
    use crate::ValidatorAddress;

    const BLOCK_PREVOTE: &str = "Vote{0:B00A6323737F 120045/00/SIGNED_MSG_TYPE_PREVOTE(Prevote) 8A1C8C6B6A7D 5A1F3A2B9C0D @ 2023-07-03T12:00:01.1Z}";

    fn address(i: usize) -> ValidatorAddress {
        ValidatorAddress(format!("{i:040X}"))
    }

    fn roster(powers: &[&str]) -> Vec<TendermintValidator> {
        powers
            .iter()
            .enumerate()
            .map(|(i, power)| TendermintValidator {
                address: address(i),
                voting_power: (*power).to_owned(),
            })
            .collect()
    }

    fn round_state(height_round_step: &str, prevotes: usize, precommits: usize) -> RoundState {
        RoundState {
            height_round_step: height_round_step.to_owned(),
            start_time: datetime!(2023-07-03 12:00:00 UTC),
            proposer: Proposer {
                address: address(0),
            },
            height_vote_set: vec![HeightVoteSet {
                round: 0,
                prevotes: vec![BLOCK_PREVOTE.to_owned(); prevotes],
                precommits: vec!["nil-Vote".to_owned(); precommits],
            }],
        }
    }

    fn build(round_state: &RoundState, roster: &[TendermintValidator]) -> Result<State, ConversionError> {
        State::from_round_state(round_state, roster, ChainValidators::default())
    }

    #[test]
    fn fixture() {
        let consensus: ConsensusState =
            serde_json::from_str(crate::fixtures::CONSENSUS_STATE).unwrap();
        let page: ValidatorsPage = serde_json::from_str(crate::fixtures::VALIDATORS).unwrap();

        let state = build(&consensus.round_state, &page.validators).unwrap();

        assert_eq!((state.height, state.round, state.step), (120045, 2, 3));
        assert_eq!(state.start_time, datetime!(2023-07-03 12:00:00.123456789 UTC));

        let votes = state
            .validators
            .iter()
            .map(|v| (v.prevote, v.precommit))
            .collect::<Vec<_>>();
        assert_eq!(
            votes,
            vec![
                (Vote::Voted, Vote::Voted),
                (Vote::VotedZero, Vote::VotedNil),
                (Vote::VotedNil, Vote::VotedNil),
                (Vote::Voted, Vote::Voted),
            ]
        );

        let percents = state
            .validators
            .iter()
            .map(|v| v.voting_power_percent.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            percents,
            [5u32, 15, 30, 50].map(BigDecimal::from).to_vec()
        );

        let proposer = state.validators.proposer().unwrap();
        assert_eq!(proposer.index, 1);
        assert_eq!(
            proposer.address,
            ValidatorAddress::from("6F5ECB8FC873D204B6D63341061DA5235D987850")
        );
        assert_eq!(state.validators.iter().filter(|v| v.is_proposer).count(), 1);
    }

    #[test]
    fn height_round_step() {
        let state = build(&round_state("120045/2/3", 1, 1), &roster(&["1"])).unwrap();

        assert_eq!(state.height, 120045);
        assert_eq!(state.round, 2);
        assert_eq!(state.step, 3);
    }

    #[test]
    fn round_state_height() {
        assert_eq!(round_state("120045/2/3", 1, 1).height(), Ok(120045));

        let negative = round_state("-1/0/1", 1, 1);
        assert_eq!(
            negative.height(),
            Err(ConversionError::MalformedRoundField("-1/0/1".to_owned()))
        );
    }

    #[rstest]
    #[case::too_few("120045/2")]
    #[case::too_many("120045/2/3/4")]
    #[case::not_a_number("120045/two/3")]
    #[case::empty_segment("120045//3")]
    #[case::empty("")]
    #[case::overflow("9223372036854775808/0/1")]
    fn malformed_round_field(#[case] raw: &str) {
        let error = build(&round_state(raw, 1, 1), &roster(&["1"])).unwrap_err();
        assert_eq!(error, ConversionError::MalformedRoundField(raw.to_owned()));
    }

    #[rstest]
    #[case::empty("")]
    #[case::negative("-5")]
    #[case::signed("+5")]
    #[case::separator("1_000")]
    #[case::decimal("1.5")]
    #[case::hex("0x10")]
    #[case::whitespace(" 10")]
    fn malformed_voting_power(#[case] raw: &str) {
        let error = build(&round_state("1/0/1", 2, 2), &roster(&["10", raw])).unwrap_err();
        assert_eq!(
            error,
            ConversionError::MalformedVotingPower {
                address: address(1),
                voting_power: raw.to_owned(),
            }
        );
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let error = build(&round_state("1/0/1", 4, 3), &roster(&["1", "1", "1", "1"])).unwrap_err();
        assert_eq!(
            error,
            ConversionError::ArrayLengthMismatch {
                prevotes: 4,
                precommits: 3,
                validators: 4,
            }
        );

        let error = build(&round_state("1/0/1", 3, 3), &roster(&["1", "1", "1", "1"])).unwrap_err();
        assert_matches!(error, ConversionError::ArrayLengthMismatch { validators: 4, .. });
    }

    #[test]
    fn missing_vote_set() {
        let mut round_state = round_state("1/0/1", 0, 0);
        round_state.height_vote_set.clear();

        assert_eq!(build(&round_state, &[]), Err(ConversionError::MissingVoteSet));
    }

    #[test]
    fn exact_percentages() {
        let state = build(&round_state("1/0/1", 2, 2), &roster(&["100", "300"])).unwrap();

        assert_eq!(state.validators[0].voting_power_percent, BigDecimal::from(25u32));
        assert_eq!(state.validators[1].voting_power_percent, BigDecimal::from(75u32));
    }

    #[test]
    fn tiny_share_of_huge_power() {
        let state = build(
            &round_state("1/0/1", 2, 2),
            &roster(&["1", "999999999999999999"]),
        )
        .unwrap();

        let small = &state.validators[0].voting_power_percent;
        let large = &state.validators[1].voting_power_percent;

        assert!(small > &BigDecimal::zero());
        assert!(large < &BigDecimal::from(100u32));
        assert_eq!(small, &BigDecimal::from_str("0.0000000000000001").unwrap());
        assert_eq!(
            state.validators.total_voting_power(),
            BigUint::from(1_000_000_000_000_000_000u64)
        );
    }

    #[test]
    fn powers_beyond_u64() {
        let huge = "340282366920938463463374607431768211456";
        let state = build(&round_state("1/0/1", 2, 2), &roster(&[huge, huge])).unwrap();

        assert_eq!(state.validators[0].voting_power.to_string(), huge);
        assert_eq!(state.validators[0].voting_power_percent, BigDecimal::from(50u32));
    }

    #[test]
    fn zero_total_power() {
        let state = build(&round_state("1/0/1", 2, 2), &roster(&["0", "0"])).unwrap();

        assert!(state
            .validators
            .iter()
            .all(|v| v.voting_power_percent.is_zero()));
    }

    #[test]
    fn chain_validators_pass_through() {
        let chain_validators = ChainValidators::new(vec![crate::ChainValidator {
            moniker: "Quokka".to_owned(),
            operator_address: "cosmosvaloper1quokka".to_owned(),
            assigned_address: Some(address(0)),
            jailed: false,
            status: "BOND_STATUS_BONDED".to_owned(),
            tokens: "1".to_owned(),
        }]);

        let state = State::from_round_state(
            &round_state("1/0/1", 1, 1),
            &roster(&["1"]),
            chain_validators.clone(),
        )
        .unwrap();

        assert_eq!(state.chain_validators, chain_validators);
    }

    #[test]
    fn deterministic() {
        let round_state = round_state("7/1/2", 3, 3);
        let roster = roster(&["3", "5", "7"]);

        assert_eq!(build(&round_state, &roster), build(&round_state, &roster));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        prop_compose! {
            fn powers()(powers in prop::collection::vec("[1-9][0-9]{0,30}", 1..50)) -> Vec<String> {
                powers
            }
        }

        proptest! {
            #[test]
            fn percentages_sum_to_hundred(powers in powers()) {
                let powers = powers.iter().map(String::as_str).collect::<Vec<_>>();
                let state = build(&round_state("1/0/1", powers.len(), powers.len()), &roster(&powers)).unwrap();

                let sum = state
                    .validators
                    .iter()
                    .fold(BigDecimal::zero(), |acc, v| acc + &v.voting_power_percent);
                let epsilon = BigDecimal::from_str("0.000001").unwrap();

                prop_assert!((sum - BigDecimal::from(100u32)).abs() < epsilon);
            }

            #[test]
            fn index_matches_position(powers in powers()) {
                let powers = powers.iter().map(String::as_str).collect::<Vec<_>>();
                let state = build(&round_state("1/0/1", powers.len(), powers.len()), &roster(&powers)).unwrap();

                for (i, validator) in state.validators.iter().enumerate() {
                    prop_assert_eq!(validator.index, i);
                    prop_assert_eq!(&validator.address, &address(i));
                }
            }
        }
    }
}
