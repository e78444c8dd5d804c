//! Read models over the SeersLeague ledger.
//!
//! Every operation reads live from the ledger per call. The contract's own
//! `correctPredictions` counter double counts, so anything correctness
//! related is recomputed from `PredictionResult` events.
//!
//! A scan window narrower than an address's history undercounts; pass no
//! block hint to scan from the deployment block.

mod matches;
mod reconcile;
mod standings;

pub use matches::{upcoming_from_events, UpcomingMatches};
pub use reconcile::{count_correct, reconcile};
pub use standings::{aggregate_standings, StandingEntry, Standings};

use anyhow::anyhow;
use chrono::Utc;
use metrics::increment_counter;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    ledger::{EventFilter, EventKind, LedgerEvent, LedgerReader, LoggedEvent, NameResolver},
    models::{Address, ReconciledStats},
};

#[derive(Debug)]
pub enum StatsError {
    /// Input is not a `0x` + 40 hex address.
    InvalidAddress(String),
    /// Ledger read failed, timed out, or returned malformed data.
    UpstreamUnavailable(anyhow::Error),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::InvalidAddress(input) => write!(f, "invalid address: {:?}", input),
            StatsError::UpstreamUnavailable(cause) => write!(f, "upstream unavailable: {:#}", cause),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::InvalidAddress(_) => None,
            StatsError::UpstreamUnavailable(cause) => Some(cause.as_ref()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Default lower bound for scans; usually the contract deployment block.
    pub deployment_block: Option<u64>,
    /// Fallback window below the tip when neither a hint nor a deployment block exists.
    pub recent_window_blocks: u64,
    /// Bound applied to every upstream call, including each log chunk.
    pub upstream_timeout: Duration,
    /// Widest block range requested from the ledger in one event query.
    pub max_log_block_span: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            deployment_block: None,
            recent_window_blocks: 100_000,
            upstream_timeout: Duration::from_secs(10),
            max_log_block_span: 10_000,
        }
    }
}

/// Inclusive block range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from: u64,
    pub to: u64,
}

impl ScanWindow {
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn resolve(hint: Option<u64>, deployment_block: Option<u64>, recent_window: u64, tip: u64) -> Self {
        let from = match (hint, deployment_block) {
            (None, None) => tip.saturating_sub(recent_window),
            (hint, deployment) => hint.unwrap_or(0).max(deployment.unwrap_or(0)),
        };
        Self { from, to: tip }
    }

    /// Splits the window into inclusive sub-ranges of at most `span` blocks.
    pub fn chunks(&self, span: u64) -> Vec<ScanWindow> {
        let span = span.max(1);
        let mut chunks = Vec::new();
        if self.is_empty() {
            return chunks;
        }
        let mut start = self.from;
        loop {
            let end = start.saturating_add(span - 1).min(self.to);
            chunks.push(ScanWindow { from: start, to: end });
            if end == self.to {
                break;
            }
            start = end + 1;
        }
        chunks
    }
}

pub struct StatsReader {
    ledger: Arc<dyn LedgerReader>,
    names: Arc<dyn NameResolver>,
    settings: ScanSettings,
}

impl StatsReader {
    pub fn new(ledger: Arc<dyn LedgerReader>, names: Arc<dyn NameResolver>, settings: ScanSettings) -> Self {
        Self {
            ledger,
            names,
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    async fn bounded<T, F>(&self, what: &'static str, fut: F) -> Result<T, StatsError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.settings.upstream_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                increment_counter!("seersleague_upstream_failures_total", "call" => what, "cause" => "error");
                Err(StatsError::UpstreamUnavailable(e.context(what)))
            }
            Err(_) => {
                increment_counter!("seersleague_upstream_failures_total", "call" => what, "cause" => "timeout");
                Err(StatsError::UpstreamUnavailable(anyhow!(
                    "{} timed out after {}ms",
                    what,
                    self.settings.upstream_timeout.as_millis()
                )))
            }
        }
    }

    /// Reads the tip and resolves the scan window against it.
    pub async fn scan_window(&self, hint: Option<u64>) -> Result<ScanWindow, StatsError> {
        let tip = self
            .bounded("current height", self.ledger.current_height())
            .await?;
        Ok(ScanWindow::resolve(
            hint,
            self.settings.deployment_block,
            self.settings.recent_window_blocks,
            tip,
        ))
    }

    async fn fetch(
        &self,
        kind: EventKind,
        filter: &EventFilter,
        window: ScanWindow,
    ) -> Result<Vec<LoggedEvent>, StatsError> {
        let mut events = Vec::new();
        for chunk in window.chunks(self.settings.max_log_block_span) {
            let mut part = self
                .bounded(
                    "event scan",
                    self.ledger.query_events(kind, filter, chunk.from, chunk.to),
                )
                .await?;
            debug!(event = ?kind, from = chunk.from, to = chunk.to, count = part.len(), "event chunk scanned");
            events.append(&mut part);
        }
        events.sort_by_key(|e| e.position);
        debug!(event = ?kind, from = window.from, to = window.to, count = events.len(), "event scan complete");
        Ok(events)
    }

    async fn lookup_name(&self, address: &Address) -> Option<String> {
        match self.bounded("name lookup", self.names.resolve_name(address)).await {
            Ok(name) => name,
            Err(e) => {
                debug!(address = %address, error = %e, "name lookup failed, continuing without name");
                None
            }
        }
    }

    /// Statistics for `address` with `correctPredictions` recounted from
    /// `PredictionResult` events in the scan window.
    ///
    /// The aggregate read, the event scan and the name lookup run
    /// concurrently. A failure of either mandatory read fails the whole call
    /// at once, without waiting on the name lookup.
    pub async fn get_reconciled_stats(
        &self,
        address: &str,
        block_range_hint: Option<u64>,
    ) -> Result<ReconciledStats, StatsError> {
        let address: Address = address
            .parse()
            .map_err(|_| StatsError::InvalidAddress(address.to_string()))?;

        let aggregate = self.bounded(
            "aggregate stats read",
            self.ledger.read_aggregate_stats(&address),
        );
        let results = async {
            let window = self.scan_window(block_range_hint).await?;
            let filter = EventFilter::user(address);
            let events = self.fetch(EventKind::PredictionResult, &filter, window).await?;
            Ok::<_, StatsError>((window, events))
        };

        let name = async { Ok::<_, StatsError>(self.lookup_name(&address).await) };

        let (aggregate, (window, events), name) =
            tokio::try_join!(aggregate, results, name).map_err(|e| {
                warn!(address = %address, error = %e, "reconciled stats read failed");
                e
            })?;

        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.event {
                LedgerEvent::PredictionResult(r) => Some(r),
                _ => None,
            })
            .collect();
        let stats = reconcile(&address, name, &aggregate, results);

        if aggregate.correct_predictions != stats.correct_predictions {
            increment_counter!("seersleague_correct_count_mismatches_total");
            debug!(
                address = %address,
                contract_correct = aggregate.correct_predictions,
                event_correct = stats.correct_predictions,
                "contract correct counter disagrees with event log"
            );
        }
        info!(
            address = %address,
            from_block = window.from,
            to_block = window.to,
            correct = stats.correct_predictions,
            total = stats.total_predictions,
            accuracy = stats.accuracy,
            "reconciled stats computed"
        );
        Ok(stats)
    }

    /// Matches registered on chain that kick off within `window_days` of now.
    pub async fn list_upcoming_matches(
        &self,
        window_days: u32,
        block_range_hint: Option<u64>,
    ) -> Result<UpcomingMatches, StatsError> {
        let window = self.scan_window(block_range_hint).await?;
        let events = self
            .fetch(EventKind::MatchAdded, &EventFilter::all(), window)
            .await?;
        let upcoming = upcoming_from_events(&events, Utc::now().timestamp(), window_days);
        info!(
            window_days,
            registered = events.len(),
            upcoming = upcoming.len(),
            "upcoming matches listed"
        );
        Ok(upcoming)
    }

    /// League-wide standings over the scan window.
    pub async fn compute_standings(&self, block_range_hint: Option<u64>) -> Result<Standings, StatsError> {
        let window = self.scan_window(block_range_hint).await?;
        let all = EventFilter::all();
        let (submissions, results) = tokio::try_join!(
            self.fetch(EventKind::PredictionsSubmitted, &all, window),
            self.fetch(EventKind::PredictionResult, &all, window),
        )?;

        let entries = aggregate_standings(&submissions, &results);
        info!(
            from_block = window.from,
            to_block = window.to,
            players = entries.len(),
            "league standings computed"
        );
        Ok(Standings {
            generated_at: Utc::now(),
            from_block: window.from,
            to_block: window.to,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_prefers_max_of_hint_and_deployment() {
        assert_eq!(ScanWindow::resolve(Some(500), Some(100), 1000, 2000).from, 500);
        assert_eq!(ScanWindow::resolve(Some(50), Some(100), 1000, 2000).from, 100);
        assert_eq!(ScanWindow::resolve(None, Some(100), 1000, 2000).from, 100);
        assert_eq!(ScanWindow::resolve(Some(0), None, 1000, 2000).from, 0);
    }

    #[test]
    fn test_window_falls_back_to_recent() {
        let w = ScanWindow::resolve(None, None, 1000, 2500);
        assert_eq!(w, ScanWindow { from: 1500, to: 2500 });
        assert_eq!(ScanWindow::resolve(None, None, 1000, 300).from, 0);
    }

    #[test]
    fn test_window_beyond_tip_is_empty() {
        let w = ScanWindow::resolve(Some(3000), None, 1000, 2000);
        assert!(w.is_empty());
        assert!(!ScanWindow::resolve(Some(2000), None, 1000, 2000).is_empty());
    }

    #[test]
    fn test_chunks_exact_and_remainder() {
        let w = |from, to| ScanWindow { from, to };
        assert_eq!(w(0, 9).chunks(5), vec![w(0, 4), w(5, 9)]);
        assert_eq!(w(10, 22).chunks(5), vec![w(10, 14), w(15, 19), w(20, 22)]);
        assert_eq!(w(7, 7).chunks(100), vec![w(7, 7)]);
    }

    #[test]
    fn test_chunks_empty_and_degenerate() {
        let w = |from, to| ScanWindow { from, to };
        assert!(w(10, 9).chunks(5).is_empty());
        assert_eq!(w(1, 3).chunks(0), vec![w(1, 1), w(2, 2), w(3, 3)]);
        assert_eq!(w(u64::MAX - 1, u64::MAX).chunks(10), vec![w(u64::MAX - 1, u64::MAX)]);
    }

    #[test]
    fn test_stats_error_display_and_source() {
        let err = StatsError::InvalidAddress("nope".to_string());
        assert_eq!(err.to_string(), "invalid address: \"nope\"");
        assert!(std::error::Error::source(&err).is_none());

        let err = StatsError::UpstreamUnavailable(anyhow!("connection reset").context("event scan"));
        assert!(err.to_string().contains("event scan"));
        assert!(err.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
