use ethers::types::{H160, H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Predictions a user can submit before the per-prediction fee applies.
pub const FREE_QUOTA: u64 = 5;

/// 20-byte account identifier, rendered as lowercase `0x` hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(H160);

impl Address {
    pub fn to_h160(self) -> H160 {
        self.0
    }

    /// The 40 hex characters without the `0x` prefix.
    pub fn hex_body(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Left-padded 32-byte topic form used by indexed event arguments.
    pub fn to_topic(self) -> H256 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(self.0.as_bytes());
        H256(word)
    }

    /// Takes the low 20 bytes of an indexed topic.
    pub fn from_topic(topic: &H256) -> Option<Self> {
        let bytes = topic.as_bytes();
        if bytes[..12].iter().any(|b| *b != 0) {
            return None;
        }
        Some(Self(H160::from_slice(&bytes[12..])))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.hex_body())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressParseError {
    pub input: String,
}

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {:?}", self.input)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError {
            input: s.to_string(),
        };
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .filter(|b| b.len() == 40)
            .ok_or_else(invalid)?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(H160(bytes)))
    }
}

/// Position of a log in the ledger: block order, then in-block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

/// `PredictionsSubmitted`: one submission covering one or more matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionEvent {
    pub user: Address,
    pub match_ids: Vec<u64>,
    pub predictions_count: u64,
    pub free_used: u64,
    /// Fee in the token's smallest unit (uint256 on chain).
    pub fee_paid: U256,
}

/// `PredictionResult`: the outcome of one match recorded against a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    pub user: Address,
    pub match_id: u64,
    pub correct: bool,
}

/// `MatchAdded`: a match registered on the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRegistered {
    pub match_id: u64,
    pub home_team: String,
    pub away_team: String,
    pub league: String,
    /// Kickoff, unix seconds.
    pub start_time: i64,
}

/// Counters as reported by the contract's `getUserStats`.
///
/// `correct_predictions` is known to double count and is never surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub correct_predictions: u64,
    pub total_predictions: u64,
    pub free_predictions_used: u64,
    pub current_streak: u64,
    pub longest_streak: u64,
}

/// Per-user statistics with `correct_predictions` recounted from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledStats {
    pub address: Address,
    pub name: Option<String>,
    pub correct_predictions: u64,
    pub total_predictions: u64,
    pub free_predictions_used: u64,
    pub current_streak: u64,
    pub longest_streak: u64,
    pub accuracy: u8,
    pub remaining_free_predictions: u64,
}

/// `round(100 * correct / total)`, half rounding up, capped at 100. Zero when `total == 0`.
pub fn accuracy_percent(correct: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let (correct, total) = (correct as u128, total as u128);
    let pct = (200 * correct + total) / (2 * total);
    pct.min(100) as u8
}

pub fn remaining_free_predictions(free_used: u64) -> u64 {
    FREE_QUOTA.saturating_sub(free_used)
}
