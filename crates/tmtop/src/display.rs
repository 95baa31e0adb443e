//! Plain text rendering of a [Snapshot].
use std::fmt;

use bigdecimal::{BigDecimal, RoundingMode};
use num_bigint::BigInt;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tmtop_common::{State, Validator, Vote};

use crate::refresh::Snapshot;

const TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// One screen of output, rendered through [fmt::Display].
pub struct Screen<'a> {
    snapshot: &'a Snapshot,
    now: OffsetDateTime,
    color: bool,
}

impl<'a> Screen<'a> {
    pub fn new(snapshot: &'a Snapshot, now: OffsetDateTime, color: bool) -> Self {
        Self {
            snapshot,
            now,
            color,
        }
    }

    fn chain(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmtop {}", tmtop_common::consts::VERSION)?;
        if let Some(info) = &self.snapshot.chain_info {
            write!(f, " | {} | node {}", info.chain_id, info.node_version)?;
            if info.catching_up {
                f.write_str(" | catching up")?;
            }
        }
        writeln!(f)?;

        let mut extra = Vec::new();
        if let Some(block_time) = &self.snapshot.block_time {
            extra.push(format!(
                "block time {:.2}s over {} blocks",
                block_time.average.as_secs_f64(),
                block_time.sample_size
            ));
        }
        if let Some(plan) = &self.snapshot.upgrade {
            let mut upgrade = format!("upgrade {} at height {}", plan.name, plan.height);
            let estimate = self
                .snapshot
                .chain_info
                .as_ref()
                .zip(self.snapshot.block_time.as_ref())
                .and_then(|(info, block_time)| plan.estimated_time(info, block_time));
            if let Some(estimate) = estimate {
                upgrade.push_str(&format!(", expected {}", timestamp(estimate)));
            }
            extra.push(upgrade);
        }
        if !extra.is_empty() {
            writeln!(f, "{}", extra.join(" | "))?;
        }

        Ok(())
    }

    fn round(&self, f: &mut fmt::Formatter<'_>, state: &State) -> fmt::Result {
        let elapsed = (self.now - state.start_time).as_seconds_f64().max(0.0);
        writeln!(
            f,
            "height {} | round {} | step {} | round started {:.1}s ago",
            state.height, state.round, state.step, elapsed
        )?;

        let validators = &state.validators;
        writeln!(
            f,
            "prevoted {}% ({}% with zero-hash) | precommitted {}%",
            percent(&validators.prevoted_percent(false)),
            percent(&validators.prevoted_percent(true)),
            percent(&validators.precommitted_percent(false)),
        )
    }

    fn table(&self, f: &mut fmt::Formatter<'_>, state: &State) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:<9}  {:<9}  {:>7}  VALIDATOR",
            "#", "PREVOTE", "PRECOMMIT", "SHARE"
        )?;

        for validator in &state.validators {
            writeln!(
                f,
                "{:>4}  {}  {}  {:>6}%  {}{}",
                validator.index,
                self.vote(validator.prevote),
                self.vote(validator.precommit),
                percent(&validator.voting_power_percent),
                name(state, validator),
                if validator.is_proposer { " (proposer)" } else { "" },
            )?;
        }

        Ok(())
    }

    fn vote(&self, vote: Vote) -> String {
        let (label, color) = match vote {
            Vote::Voted => ("voted", GREEN),
            Vote::VotedZero => ("zero", YELLOW),
            Vote::VotedNil => ("nil", RED),
        };

        if self.color {
            format!("{color}{label:<9}{RESET}")
        } else {
            format!("{label:<9}")
        }
    }
}

impl fmt::Display for Screen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.chain(f)?;

        match &self.snapshot.state {
            Some(state) => self.round(f, state)?,
            None => writeln!(f, "Waiting for the consensus state")?,
        }

        for (cycle, error) in &self.snapshot.errors {
            writeln!(f, "error ({cycle}): {error}")?;
        }

        if let Some(state) = &self.snapshot.state {
            writeln!(f)?;
            self.table(f, state)?;
        }

        Ok(())
    }
}

fn name<'a>(state: &'a State, validator: &'a Validator) -> &'a str {
    state
        .chain_validators
        .by_address(&validator.address)
        .map(|v| v.moniker.as_str())
        .unwrap_or_else(|| validator.address.as_str())
}

/// Fixed two decimals, rounding half up. `BigDecimal`'s own Display drops
/// trailing zeros of small values.
fn percent(value: &BigDecimal) -> String {
    let (hundredths, _) = value
        .with_scale_round(2, RoundingMode::HalfUp)
        .into_bigint_and_scale();
    let hundred = BigInt::from(100u32);
    format!("{}.{:02}", &hundredths / &hundred, &hundredths % &hundred)
}

fn timestamp(t: OffsetDateTime) -> String {
    t.format(TIMESTAMP).unwrap_or_else(|_| t.to_string())
}
