use chrono::{DateTime, Utc};
use ethers::types::U256;
use serde::Serialize;
use std::collections::HashMap;

use crate::{
    ledger::{LedgerEvent, LoggedEvent},
    models::{accuracy_percent, Address},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingEntry {
    pub rank: usize,
    pub address: Address,
    pub total_predictions: u64,
    pub correct_predictions: u64,
    pub accuracy: u8,
    pub current_streak: u64,
    pub longest_streak: u64,
    /// Sum of fees in the token's smallest unit, as a decimal string.
    pub fees_paid: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standings {
    pub generated_at: DateTime<Utc>,
    pub from_block: u64,
    pub to_block: u64,
    pub entries: Vec<StandingEntry>,
}

#[derive(Default)]
struct Tally {
    total: u64,
    correct: u64,
    current_streak: u64,
    longest_streak: u64,
    fees: U256,
}

/// Per-user league table from submission and result events.
///
/// Totals come from `predictionsCount`, correct counts from raw result
/// events, and streaks from results in ledger order. Ranked by correct
/// count, then accuracy, then address.
pub fn aggregate_standings(submissions: &[LoggedEvent], results: &[LoggedEvent]) -> Vec<StandingEntry> {
    let mut tallies: HashMap<Address, Tally> = HashMap::new();

    for logged in submissions {
        if let LedgerEvent::PredictionsSubmitted(p) = &logged.event {
            let tally = tallies.entry(p.user).or_default();
            tally.total = tally.total.saturating_add(p.predictions_count);
            tally.fees = tally.fees.saturating_add(p.fee_paid);
        }
    }

    let mut ordered: Vec<&LoggedEvent> = results.iter().collect();
    ordered.sort_by_key(|e| e.position);
    for logged in ordered {
        if let LedgerEvent::PredictionResult(r) = &logged.event {
            let tally = tallies.entry(r.user).or_default();
            if r.correct {
                tally.correct += 1;
                tally.current_streak += 1;
                tally.longest_streak = tally.longest_streak.max(tally.current_streak);
            } else {
                tally.current_streak = 0;
            }
        }
    }

    let mut entries: Vec<StandingEntry> = tallies
        .into_iter()
        .map(|(address, t)| StandingEntry {
            rank: 0,
            accuracy: accuracy_percent(t.correct, t.total),
            address,
            total_predictions: t.total,
            correct_predictions: t.correct,
            current_streak: t.current_streak,
            longest_streak: t.longest_streak,
            fees_paid: t.fees.to_string(),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.correct_predictions
            .cmp(&a.correct_predictions)
            .then_with(|| b.accuracy.cmp(&a.accuracy))
            .then_with(|| a.address.cmp(&b.address))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LogPosition, PredictionEvent, ResultEvent};

    fn addr(n: u8) -> Address {
        format!("0x{:040x}", n).parse().unwrap()
    }

    fn at(block: u64, index: u64) -> LogPosition {
        LogPosition {
            block_number: block,
            log_index: index,
        }
    }

    fn submitted(block: u64, user: &Address, count: u64, fee: u64) -> LoggedEvent {
        LoggedEvent {
            position: at(block, 0),
            event: LedgerEvent::PredictionsSubmitted(PredictionEvent {
                user: *user,
                match_ids: (0..count).collect(),
                predictions_count: count,
                free_used: 0,
                fee_paid: U256::from(fee),
            }),
        }
    }

    fn result(block: u64, index: u64, user: &Address, match_id: u64, correct: bool) -> LoggedEvent {
        LoggedEvent {
            position: at(block, index),
            event: LedgerEvent::PredictionResult(ResultEvent {
                user: *user,
                match_id,
                correct,
            }),
        }
    }

    #[test]
    fn test_totals_fees_and_ranking() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let submissions = vec![
            submitted(1, &a, 5, 0),
            submitted(2, &a, 5, 1_000),
            submitted(3, &b, 4, 0),
            submitted(4, &c, 2, 250),
        ];
        let results = vec![
            result(10, 0, &a, 1, true),
            result(10, 1, &a, 2, true),
            result(10, 2, &b, 1, true),
            result(10, 3, &b, 2, true),
            result(11, 0, &c, 1, true),
        ];
        let table = aggregate_standings(&submissions, &results);

        assert_eq!(table.len(), 3);
        // a and b tie on correct; b wins on accuracy (2/4 vs 2/10).
        assert_eq!(table[0].address, b);
        assert_eq!(table[0].accuracy, 50);
        assert_eq!(table[1].address, a);
        assert_eq!(table[1].total_predictions, 10);
        assert_eq!(table[1].fees_paid, "1000");
        assert_eq!(table[2].address, c);
        assert_eq!(table[2].fees_paid, "250");
        assert_eq!(table.iter().map(|e| e.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_streaks_follow_ledger_order() {
        let a = addr(1);
        // Supplied out of order on purpose.
        let results = vec![
            result(5, 0, &a, 5, true),
            result(1, 0, &a, 1, true),
            result(2, 0, &a, 2, true),
            result(3, 0, &a, 3, true),
            result(4, 0, &a, 4, false),
        ];
        let table = aggregate_standings(&[], &results);
        assert_eq!(table[0].longest_streak, 3);
        assert_eq!(table[0].current_streak, 1);
        assert_eq!(table[0].correct_predictions, 4);
        // No submissions seen in window: accuracy stays 0.
        assert_eq!(table[0].accuracy, 0);
    }

    #[test]
    fn test_address_breaks_full_ties() {
        let (a, b) = (addr(9), addr(8));
        let table = aggregate_standings(&[submitted(1, &a, 1, 0), submitted(2, &b, 1, 0)], &[]);
        assert_eq!(table[0].address, b);
        assert_eq!(table[1].address, a);
    }
}
