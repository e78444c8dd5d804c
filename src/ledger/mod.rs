//! Ledger access: the read interface the stats reader depends on, plus the
//! JSON-RPC implementation against the SeersLeague contract on Base.

pub mod abi;
pub mod names;
pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Address, AggregateStats, LogPosition, MatchRegistered, PredictionEvent, ResultEvent,
};

pub use names::{BasenameResolver, NoNameResolver};
pub use rpc::{JsonRpcClient, RpcLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PredictionsSubmitted,
    PredictionResult,
    MatchAdded,
}

impl EventKind {
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::PredictionsSubmitted => abi::PREDICTIONS_SUBMITTED,
            EventKind::PredictionResult => abi::PREDICTION_RESULT,
            EventKind::MatchAdded => abi::MATCH_ADDED,
        }
    }

    /// Whether `topics[1]` is the indexed user address.
    pub fn has_user_topic(&self) -> bool {
        !matches!(self, EventKind::MatchAdded)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub user: Option<Address>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn user(address: Address) -> Self {
        Self {
            user: Some(address),
        }
    }

    pub fn matches(&self, event: &LedgerEvent) -> bool {
        match (&self.user, event.user()) {
            (None, _) => true,
            (Some(want), Some(got)) => want == got,
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    PredictionsSubmitted(PredictionEvent),
    PredictionResult(ResultEvent),
    MatchAdded(MatchRegistered),
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::PredictionsSubmitted(_) => EventKind::PredictionsSubmitted,
            LedgerEvent::PredictionResult(_) => EventKind::PredictionResult,
            LedgerEvent::MatchAdded(_) => EventKind::MatchAdded,
        }
    }

    pub fn user(&self) -> Option<&Address> {
        match self {
            LedgerEvent::PredictionsSubmitted(e) => Some(&e.user),
            LedgerEvent::PredictionResult(e) => Some(&e.user),
            LedgerEvent::MatchAdded(_) => None,
        }
    }
}

/// A decoded event and where it sits in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    pub position: LogPosition,
    pub event: LedgerEvent,
}

/// Read side of the ledger. Implementations may be rate limited or time out;
/// errors are returned as-is and never replaced by empty results.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn read_aggregate_stats(&self, user: &Address) -> Result<AggregateStats>;

    async fn current_height(&self) -> Result<u64>;

    /// Events of `kind` in `[from_height, to_height]`, in ledger order.
    async fn query_events(
        &self,
        kind: EventKind,
        filter: &EventFilter,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<LoggedEvent>>;
}

#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, address: &Address) -> Result<Option<String>>;
}
