//! Removal of models by age or wholesale

use super::index::IndexEntry;
use super::manager::ModelStorage;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", content = "days", rename_all = "snake_case")]
pub enum CleanPolicy {
    /// Every downloaded model
    All,
    /// Models neither used nor downloaded within this many days
    UnusedFor(u32),
}

impl CleanPolicy {
    pub fn selects(&self, entry: &IndexEntry, now: DateTime<Utc>) -> bool {
        match self {
            Self::All => true,
            // A cutoff before the earliest representable time selects nothing
            Self::UnusedFor(days) => Duration::try_days(i64::from(*days))
                .and_then(|age| now.checked_sub_signed(age))
                .is_some_and(|cutoff| entry.last_activity() < cutoff),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedModel {
    pub source: String,
    pub model_id: String,
    pub size_bytes: u64,
}

impl From<&IndexEntry> for CleanedModel {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            source: entry.source.clone(),
            model_id: entry.model_id.clone(),
            size_bytes: entry.size_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanFailure {
    pub source: String,
    pub model_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub dry_run: bool,
    /// Models selected by the policy
    pub candidates: Vec<CleanedModel>,
    /// Models actually removed; empty on a dry run
    pub removed: Vec<CleanedModel>,
    pub failures: Vec<CleanFailure>,
    pub freed_bytes: u64,
}

impl CleanReport {
    pub fn candidate_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.size_bytes).sum()
    }
}

impl ModelStorage {
    /// Models the policy would remove right now
    pub async fn clean_candidates(&self, policy: CleanPolicy) -> Result<Vec<IndexEntry>> {
        self.refresh().await?;
        let now = Utc::now();
        Ok(self
            .list(None)
            .await
            .into_iter()
            .filter(|e| policy.selects(e, now))
            .collect())
    }

    /// Remove every model selected by `policy`
    ///
    /// A model that fails to delete is recorded in the report and does not stop the
    /// rest. With `dry_run` nothing is touched.
    pub async fn clean(&self, policy: CleanPolicy, dry_run: bool) -> Result<CleanReport> {
        let candidates = self.clean_candidates(policy).await?;

        let mut report = CleanReport {
            dry_run,
            candidates: candidates.iter().map(CleanedModel::from).collect(),
            ..Default::default()
        };

        if dry_run {
            tracing::info!(
                candidates = report.candidates.len(),
                bytes = report.candidate_bytes(),
                "Clean dry run"
            );
            return Ok(report);
        }

        for entry in &candidates {
            match self.delete(&entry.source, &entry.model_id).await {
                Ok(true) => {
                    report.freed_bytes += entry.size_bytes;
                    report.removed.push(CleanedModel::from(entry));
                }
                // Removed concurrently by someone else
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(key = %entry.key(), error = %e, "Failed to clean model");
                    report.failures.push(CleanFailure {
                        source: entry.source.clone(),
                        model_id: entry.model_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            removed = report.removed.len(),
            failed = report.failures.len(),
            freed_bytes = report.freed_bytes,
            "Clean complete"
        );

        Ok(report)
    }
}
