//! Classification of the free-form vote strings reported by `/consensus_state`.
//!
//! Tendermint does not expose a discrete vote status per validator. Each entry
//! of `prevotes`/`precommits` is the `String()` rendering of the vote, e.g.
//!
//! ```text
//! Vote{0:B00A6323737F 14/00/SIGNED_MSG_TYPE_PREVOTE(Prevote) 8A1C8C6B6A7D 5A1F3A2B9C0D @ 2023-07-03T12:00:01.123456789Z}
//! ```
//!
//! or the literal `nil-Vote` when nothing was received from that validator.
use serde::Serialize;

/// Literal reported for a validator that has not voted in this round.
pub const NIL_VOTE: &str = "nil-Vote";

/// Signature of a prevote whose block hash is the all-zero placeholder.
pub const ZERO_HASH_PREVOTE: &str = "SIGNED_MSG_TYPE_PREVOTE(Prevote) 000000000000";

/// Prefix of every vote rendered by Tendermint.
const VOTE_PREFIX: &str = "Vote{";

/// Classified prevote or precommit of one validator in the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Vote {
    /// No vote was received.
    VotedNil,
    /// A signed prevote for the zero block hash, i.e. for nil.
    VotedZero,
    /// A vote for an actual block.
    Voted,
}

#[derive(Clone, Copy, Debug)]
enum Predicate {
    Exact(&'static str),
    Contains(&'static str),
}

impl Predicate {
    fn matches(&self, raw: &str) -> bool {
        match self {
            Predicate::Exact(expected) => raw == *expected,
            Predicate::Contains(needle) => raw.contains(needle),
        }
    }
}

/// Evaluated in order, first match wins. Anything unmatched is a [Vote::Voted].
const RULES: &[(Predicate, Vote)] = &[
    (Predicate::Exact(NIL_VOTE), Vote::VotedNil),
    (Predicate::Contains(ZERO_HASH_PREVOTE), Vote::VotedZero),
];

impl Vote {
    /// Classifies a raw vote string. Never fails.
    pub fn from_raw(raw: &str) -> Self {
        if let Some((_, vote)) = RULES.iter().find(|(predicate, _)| predicate.matches(raw)) {
            return *vote;
        }

        if !raw.starts_with(VOTE_PREFIX) {
            tracing::debug!(%raw, "Unrecognized vote status, counting it as a vote");
            metrics::increment_counter!("tmtop_votes_unrecognized_total");
        }

        Vote::Voted
    }
}

impl From<&str> for Vote {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}
