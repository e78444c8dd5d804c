use crate::models::{
    accuracy_percent, remaining_free_predictions, Address, AggregateStats, ReconciledStats,
    ResultEvent,
};

/// Raw count of `correct == true` results for `user`. Duplicate emissions
/// for the same match are counted each time they appear.
pub fn count_correct<'a>(user: &Address, results: impl IntoIterator<Item = &'a ResultEvent>) -> u64 {
    results
        .into_iter()
        .filter(|r| r.user == *user && r.correct)
        .count() as u64
}

/// Combines the contract snapshot with the event-derived correct count.
/// The contract's `correct_predictions` field is ignored.
pub fn reconcile<'a>(
    address: &Address,
    name: Option<String>,
    aggregate: &AggregateStats,
    results: impl IntoIterator<Item = &'a ResultEvent>,
) -> ReconciledStats {
    let correct = count_correct(address, results);
    ReconciledStats {
        address: *address,
        name,
        correct_predictions: correct,
        total_predictions: aggregate.total_predictions,
        free_predictions_used: aggregate.free_predictions_used,
        current_streak: aggregate.current_streak,
        longest_streak: aggregate.longest_streak,
        accuracy: accuracy_percent(correct, aggregate.total_predictions),
        remaining_free_predictions: remaining_free_predictions(aggregate.free_predictions_used),
    }
}
