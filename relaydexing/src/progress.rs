//! Per-source scan progress and finality tracking.
//!
//! Every source owns one [`ScanProgress`] row. The row only moves forward:
//! `latest_scanned_block` and `last_finalized_block` never decrease, and
//! `last_finalized_block <= latest_scanned_block` holds after every update.
//! Regressions are rejected as fatal errors rather than retried.

use std::cmp::min;

use chrono::{DateTime, Utc};
use diesel::{Insertable, Queryable};
use serde::{Deserialize, Serialize};

use crate::diesel::schema::relaydexing_scan_progress;
use crate::{Repo, RepoError, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = relaydexing_scan_progress)]
pub struct ScanProgress {
    pub source_id: String,
    pub latest_scanned_block: i64,
    pub last_finalized_block: i64,
    pub is_backfilling: bool,
    pub updated_at: DateTime<Utc>,
}

impl ScanProgress {
    pub fn new(source_id: &str, latest_scanned_block: u64, is_backfilling: bool) -> Self {
        Self {
            source_id: source_id.to_string(),
            latest_scanned_block: latest_scanned_block as i64,
            last_finalized_block: 0,
            is_backfilling,
            updated_at: Utc::now(),
        }
    }

    pub fn next_block_number_to_scan(&self) -> u64 {
        self.latest_scanned_block as u64 + 1
    }
}

/// Inclusive block range to scan next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanWindow {
    pub from: u64,
    pub to: u64,
    /// Whether the window still sits far behind the chain's head
    pub is_backfilling: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("source {source_id} cannot regress latest scanned block from {current} to {requested}")]
    Regression {
        source_id: String,
        current: u64,
        requested: u64,
    },

    #[error(
        "source {source_id} cannot finalize block {requested} beyond latest scanned block \
         {latest_scanned}"
    )]
    FinalizedAheadOfScanned {
        source_id: String,
        latest_scanned: u64,
        requested: u64,
    },

    #[error("source {source_id} cannot regress last finalized block from {current} to {requested}")]
    FinalizedRegression {
        source_id: String,
        current: u64,
        requested: u64,
    },

    #[error("source {0} has no scan progress yet")]
    UnknownSource(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl ProgressError {
    /// Everything except storage I/O is an invariant violation
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ProgressError::Repo(_))
    }
}

/// Computes the next window for a source.
///
/// The window starts right after the latest scanned block (or at the source's
/// start block) and ends at most `blocks_per_batch` blocks later, bounded by the
/// chain's head minus the source's safety lag.
pub fn get_window(
    source: &Source,
    progress: Option<&ScanProgress>,
    current_block_number: u64,
    blocks_per_batch: u64,
    backfill_threshold: u64,
) -> Option<ScanWindow> {
    let safe_head = source.safe_head(current_block_number)?;
    let from = progress
        .map(ScanProgress::next_block_number_to_scan)
        .unwrap_or(source.start_block_number);

    if from > safe_head || blocks_per_batch == 0 {
        return None;
    }

    let to = min(from + blocks_per_batch - 1, safe_head);

    Some(ScanWindow {
        from,
        to,
        is_backfilling: safe_head - to > backfill_threshold,
    })
}

#[derive(Clone, Debug)]
pub struct ProgressTracker<R: Repo> {
    repo: R,
    blocks_per_batch: u64,
    backfill_threshold: u64,
}

impl<R: Repo> ProgressTracker<R> {
    pub fn new(repo: R, blocks_per_batch: u64, backfill_threshold: u64) -> Self {
        Self {
            repo,
            blocks_per_batch,
            backfill_threshold,
        }
    }

    pub async fn get_progress(
        &self,
        source_id: &str,
    ) -> Result<Option<ScanProgress>, ProgressError> {
        Ok(self.repo.get_scan_progress(source_id).await?)
    }

    pub async fn get_window(
        &self,
        source: &Source,
        current_block_number: u64,
    ) -> Result<Option<ScanWindow>, ProgressError> {
        let progress = self.repo.get_scan_progress(&source.id).await?;

        Ok(get_window(
            source,
            progress.as_ref(),
            current_block_number,
            self.blocks_per_batch,
            self.backfill_threshold,
        ))
    }

    pub async fn mark_scanned(
        &self,
        source_id: &str,
        to: u64,
        is_backfilling: bool,
    ) -> Result<ScanProgress, ProgressError> {
        if self.repo.advance_latest_scanned_block(source_id, to as i64, is_backfilling).await? {
            return self.require_progress(source_id).await;
        }

        let current = self.require_progress(source_id).await?;

        Err(ProgressError::Regression {
            source_id: source_id.to_string(),
            current: current.latest_scanned_block as u64,
            requested: to,
        })
    }

    pub async fn mark_finalized(
        &self,
        source_id: &str,
        block_number: u64,
    ) -> Result<ScanProgress, ProgressError> {
        if self.repo.advance_last_finalized_block(source_id, block_number as i64).await? {
            return self.require_progress(source_id).await;
        }

        let current = self.require_progress(source_id).await?;

        if block_number as i64 > current.latest_scanned_block {
            Err(ProgressError::FinalizedAheadOfScanned {
                source_id: source_id.to_string(),
                latest_scanned: current.latest_scanned_block as u64,
                requested: block_number,
            })
        } else {
            Err(ProgressError::FinalizedRegression {
                source_id: source_id.to_string(),
                current: current.last_finalized_block as u64,
                requested: block_number,
            })
        }
    }

    async fn require_progress(&self, source_id: &str) -> Result<ScanProgress, ProgressError> {
        self.repo
            .get_scan_progress(source_id)
            .await?
            .ok_or_else(|| ProgressError::UnknownSource(source_id.to_string()))
    }
}
