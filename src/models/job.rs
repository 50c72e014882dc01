use serde::Serialize;
use strum::Display;

/// Outcome of asking the coordinator to process a single key.
#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessOutcome {
    AlreadyCached,
    AlreadyProcessing,
    Started,
}

/// Counts reported for a batch submission.
///
/// `total` is the number of unique keys in the submission, not the raw row
/// count. `ignored` covers invalid, cached and in-flight keys.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub queued: usize,
    pub ignored: usize,
}
