//! ABI surface of the SeersLeague contract.
//!
//! Selectors, event topics and decoders for `getUserStats` and the three
//! events the reader consumes. Encoding and decoding go through `ethers`.

use anyhow::{anyhow, bail, Context, Result};
use ethers::core::abi::{self, ParamType, Token};
use ethers::types::{Bytes, Log, H256, U256};
use ethers::utils::keccak256;

use crate::models::{Address, AggregateStats, MatchRegistered, PredictionEvent, ResultEvent};

pub const GET_USER_STATS: &str = "getUserStats(address)";
pub const NAME: &str = "name(bytes32)";
pub const PREDICTIONS_SUBMITTED: &str =
    "PredictionsSubmitted(address,uint256[],uint256,uint256,uint256)";
pub const PREDICTION_RESULT: &str = "PredictionResult(address,uint256,bool)";
pub const MATCH_ADDED: &str = "MatchAdded(uint256,string,string,string,uint256)";

pub fn selector(signature: &str) -> [u8; 4] {
    ethers::utils::id(signature)
}

/// `topics[0]` for an event signature.
pub fn event_topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

/// Selector followed by the ABI-encoded arguments.
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = selector(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

pub fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        bail!("{field} does not fit in u64: {value}");
    }
    Ok(value.as_u64())
}

fn uint(token: Token, field: &str) -> Result<U256> {
    token
        .into_uint()
        .ok_or_else(|| anyhow!("{field} is not a uint"))
}

fn string(token: Token, field: &str) -> Result<String> {
    token
        .into_string()
        .ok_or_else(|| anyhow!("{field} is not a string"))
}

fn topic(log: &Log, index: usize) -> Result<&H256> {
    log.topics
        .get(index)
        .ok_or_else(|| anyhow!("missing topic {index}"))
}

fn topic_address(log: &Log, index: usize) -> Result<Address> {
    Address::from_topic(topic(log, index)?).ok_or_else(|| anyhow!("topic {index} is not an address"))
}

fn topic_u64(log: &Log, index: usize, field: &str) -> Result<u64> {
    u256_to_u64(U256::from_big_endian(topic(log, index)?.as_bytes()), field)
}

/// Decodes the five-word `getUserStats` return tuple.
pub fn decode_aggregate_stats(data: &[u8]) -> Result<AggregateStats> {
    let tokens = abi::decode(&vec![ParamType::Uint(256); 5], data).context("getUserStats return")?;
    let mut fields = Vec::with_capacity(5);
    for (token, field) in tokens.into_iter().zip([
        "correctPredictions",
        "totalPredictions",
        "freePredictionsUsed",
        "currentStreak",
        "longestStreak",
    ]) {
        fields.push(u256_to_u64(uint(token, field)?, field)?);
    }
    Ok(AggregateStats {
        correct_predictions: fields[0],
        total_predictions: fields[1],
        free_predictions_used: fields[2],
        current_streak: fields[3],
        longest_streak: fields[4],
    })
}

/// Decodes a `name(bytes32)` return; an empty string means no name.
pub fn decode_name(data: &[u8]) -> Result<Option<String>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut tokens = abi::decode(&[ParamType::String], data).context("name return")?;
    let name = string(tokens.remove(0), "name")?;
    Ok(Some(name).filter(|n| !n.is_empty()))
}

pub fn decode_predictions_submitted(log: &Log) -> Result<PredictionEvent> {
    let user = topic_address(log, 1)?;
    let mut tokens = abi::decode(
        &[
            ParamType::Array(Box::new(ParamType::Uint(256))),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ],
        &log.data,
    )
    .context("PredictionsSubmitted data")?
    .into_iter();

    let match_ids = tokens
        .next()
        .and_then(Token::into_array)
        .ok_or_else(|| anyhow!("matchIds is not an array"))?
        .into_iter()
        .map(|t| uint(t, "matchIds").and_then(|v| u256_to_u64(v, "matchIds")))
        .collect::<Result<Vec<_>>>()?;
    if match_ids.is_empty() {
        bail!("PredictionsSubmitted with empty matchIds");
    }

    let mut next_uint = |field: &str| -> Result<U256> {
        uint(tokens.next().ok_or_else(|| anyhow!("missing {field}"))?, field)
    };
    let predictions_count = u256_to_u64(next_uint("predictionsCount")?, "predictionsCount")?;
    if predictions_count == 0 {
        bail!("PredictionsSubmitted with zero predictionsCount");
    }
    let free_used = u256_to_u64(next_uint("freeUsed")?, "freeUsed")?;
    let fee_paid = next_uint("feePaid")?;

    Ok(PredictionEvent {
        user,
        match_ids,
        predictions_count,
        free_used,
        fee_paid,
    })
}

pub fn decode_prediction_result(log: &Log) -> Result<ResultEvent> {
    let mut tokens = abi::decode(&[ParamType::Bool], &log.data).context("PredictionResult data")?;
    let correct = tokens
        .remove(0)
        .into_bool()
        .ok_or_else(|| anyhow!("correct is not a bool"))?;
    Ok(ResultEvent {
        user: topic_address(log, 1)?,
        match_id: topic_u64(log, 2, "matchId")?,
        correct,
    })
}

pub fn decode_match_added(log: &Log) -> Result<MatchRegistered> {
    let mut tokens = abi::decode(
        &[
            ParamType::String,
            ParamType::String,
            ParamType::String,
            ParamType::Uint(256),
        ],
        &log.data,
    )
    .context("MatchAdded data")?
    .into_iter();

    let mut next = |field: &str| tokens.next().ok_or_else(|| anyhow!("missing {field}"));
    let home_team = string(next("homeTeam")?, "homeTeam")?;
    let away_team = string(next("awayTeam")?, "awayTeam")?;
    let league = string(next("league")?, "league")?;
    let start_time = u256_to_u64(uint(next("startTime")?, "startTime")?, "startTime")?;

    Ok(MatchRegistered {
        match_id: topic_u64(log, 1, "matchId")?,
        home_team,
        away_team,
        league,
        start_time: i64::try_from(start_time).context("startTime out of range")?,
    })
}
