//! Persistence port for validation results.

use crate::domain::error::PicklabError;
use crate::domain::walk_forward::{Fold, ValidationSummary, WalkForwardResult};
use serde::{Deserialize, Serialize};

/// A summary row as stored, keyed by source and algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub source: String,
    pub algorithm: String,
    pub train_days: u32,
    pub test_days: u32,
    pub summary: ValidationSummary,
}

pub trait ResultStorePort {
    /// Replace every stored row for (source, algorithm) with `result`.
    fn save_result(
        &self,
        source: &str,
        algorithm: &str,
        result: &WalkForwardResult,
    ) -> Result<(), PicklabError>;

    fn load_summary(&self, source: &str, algorithm: &str)
    -> Result<Option<StoredSummary>, PicklabError>;

    fn load_folds(&self, source: &str, algorithm: &str) -> Result<Vec<Fold>, PicklabError>;

    /// Every stored summary, ordered by source then algorithm.
    fn list_summaries(&self) -> Result<Vec<StoredSummary>, PicklabError>;
}
