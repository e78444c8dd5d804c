use serde::Serialize;
use std::collections::BTreeMap;

use crate::{
    ledger::{LedgerEvent, LoggedEvent},
    models::MatchRegistered,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Matches that have not kicked off yet, ordered by kickoff then id.
///
/// Finite and restartable: every call to [`UpcomingMatches::iter`] walks the
/// same sequence from the start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UpcomingMatches {
    matches: Vec<MatchRegistered>,
}

impl UpcomingMatches {
    pub fn iter(&self) -> std::slice::Iter<'_, MatchRegistered> {
        self.matches.iter()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn into_vec(self) -> Vec<MatchRegistered> {
        self.matches
    }
}

impl<'a> IntoIterator for &'a UpcomingMatches {
    type Item = &'a MatchRegistered;
    type IntoIter = std::slice::Iter<'a, MatchRegistered>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Filters `MatchAdded` events down to matches starting in `(now, now + window_days]`.
///
/// A match registered more than once keeps its latest registration.
pub fn upcoming_from_events(events: &[LoggedEvent], now: i64, window_days: u32) -> UpcomingMatches {
    let horizon = now.saturating_add(i64::from(window_days) * SECONDS_PER_DAY);

    let mut ordered: Vec<&LoggedEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.position);

    let mut latest: BTreeMap<u64, &MatchRegistered> = BTreeMap::new();
    for logged in ordered {
        if let LedgerEvent::MatchAdded(m) = &logged.event {
            latest.insert(m.match_id, m);
        }
    }

    let mut matches: Vec<MatchRegistered> = latest
        .into_values()
        .filter(|m| m.start_time > now && m.start_time <= horizon)
        .cloned()
        .collect();
    matches.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.match_id.cmp(&b.match_id))
    });

    UpcomingMatches { matches }
}
