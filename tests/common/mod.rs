//! In-memory ledger and name resolver for integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::U256;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use seersleague_backend::{
    ledger::{EventFilter, EventKind, LedgerEvent, LedgerReader, LoggedEvent, NameResolver},
    models::{Address, AggregateStats, LogPosition, MatchRegistered, PredictionEvent, ResultEvent},
};

pub const ALICE: &str = "0x1111111111111111111111111111111111111111";
pub const BOB: &str = "0x2222222222222222222222222222222222222222";

pub fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

pub fn at(block_number: u64, log_index: u64) -> LogPosition {
    LogPosition {
        block_number,
        log_index,
    }
}

pub fn result(block: u64, user: &str, match_id: u64, correct: bool) -> LoggedEvent {
    LoggedEvent {
        position: at(block, 0),
        event: LedgerEvent::PredictionResult(ResultEvent {
            user: addr(user),
            match_id,
            correct,
        }),
    }
}

pub fn submission(block: u64, user: &str, count: u64, fee: u64) -> LoggedEvent {
    LoggedEvent {
        position: at(block, 0),
        event: LedgerEvent::PredictionsSubmitted(PredictionEvent {
            user: addr(user),
            match_ids: (1..=count).collect(),
            predictions_count: count,
            free_used: 0,
            fee_paid: U256::from(fee),
        }),
    }
}

pub fn match_added(block: u64, match_id: u64, start_time: i64) -> LoggedEvent {
    LoggedEvent {
        position: at(block, 0),
        event: LedgerEvent::MatchAdded(MatchRegistered {
            match_id,
            home_team: format!("Home {}", match_id),
            away_team: format!("Away {}", match_id),
            league: "Premier League".to_string(),
            start_time,
        }),
    }
}

#[derive(Default)]
pub struct FakeLedger {
    pub aggregate: AggregateStats,
    pub tip: u64,
    pub events: Vec<LoggedEvent>,
    pub scan_delay: Option<Duration>,
    pub aggregate_delay: Option<Duration>,
    pub fail_scans: AtomicBool,
    pub fail_aggregate: AtomicBool,
    pub calls: AtomicUsize,
    pub scans: Mutex<Vec<(EventKind, u64, u64)>>,
}

impl FakeLedger {
    pub fn new(tip: u64, aggregate: AggregateStats, events: Vec<LoggedEvent>) -> Self {
        Self {
            aggregate,
            tip,
            events,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scan_log(&self) -> Vec<(EventKind, u64, u64)> {
        self.scans.lock().clone()
    }
}

#[async_trait]
impl LedgerReader for FakeLedger {
    async fn read_aggregate_stats(&self, _user: &Address) -> Result<AggregateStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.aggregate_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_aggregate.load(Ordering::SeqCst) {
            return Err(anyhow!("eth_call: execution reverted"));
        }
        Ok(self.aggregate)
    }

    async fn current_height(&self) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tip)
    }

    async fn query_events(
        &self,
        kind: EventKind,
        filter: &EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<LoggedEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scans.lock().push((kind, from_height, to_height));
        if let Some(delay) = self.scan_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(anyhow!("eth_getLogs: 429 Too Many Requests"));
        }
        let mut events: Vec<LoggedEvent> = self
            .events
            .iter()
            .filter(|e| e.event.kind() == kind)
            .filter(|e| filter.matches(&e.event))
            .filter(|e| (from_height..=to_height).contains(&e.position.block_number))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.position);
        Ok(events)
    }
}

pub struct FixedNames(pub Option<String>);

#[async_trait]
impl NameResolver for FixedNames {
    async fn resolve_name(&self, _address: &Address) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

pub struct FailingNames;

#[async_trait]
impl NameResolver for FailingNames {
    async fn resolve_name(&self, _address: &Address) -> Result<Option<String>> {
        Err(anyhow!("resolver reverted"))
    }
}

/// Resolves a name only after the given delay.
pub struct SlowNames(pub Duration);

#[async_trait]
impl NameResolver for SlowNames {
    async fn resolve_name(&self, _address: &Address) -> Result<Option<String>> {
        tokio::time::sleep(self.0).await;
        Ok(Some("late.base.eth".to_string()))
    }
}
