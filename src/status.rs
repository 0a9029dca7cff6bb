//! Observable sync state and cache health for host applications.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
   config::SyncPolicy,
   decision::{self, SyncStrategy},
   model::CacheEnvelope,
   store::CacheState,
   util::format_age,
};

/// Phase of a sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
   #[default]
   Idle,
   Deciding,
   Fetching,
   Merging,
   Persisting,
   Done,
   Failed,
}

impl SyncPhase {
   /// Human-readable phase label for progress displays.
   pub const fn label(self) -> &'static str {
      match self {
         Self::Idle => "Idle",
         Self::Deciding => "Checking cache",
         Self::Fetching => "Fetching changes",
         Self::Merging => "Merging records",
         Self::Persisting => "Saving to cache",
         Self::Done => "Up to date",
         Self::Failed => "Sync failed",
      }
   }
}

/// Validation state of the shared cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheHealth {
   #[default]
   Unknown,
   Healthy,
   Missing,
   Corrupted { detail: String },
   /// Record count has shrunk far below the historical peak.
   Suspect { count: usize, peak: usize },
   /// Readable, but the next sync will do a full resync.
   Stale { reason: String },
}

impl CacheHealth {
   /// Classifies the on-disk state without touching the remote.
   pub fn assess(state: &CacheState, policy: &SyncPolicy, now: DateTime<Utc>) -> Self {
      match state {
         CacheState::Missing => Self::Missing,
         CacheState::Corrupted(err) => Self::Corrupted { detail: err.to_string() },
         CacheState::Loaded(envelope) => Self::of_envelope(envelope, policy, now),
      }
   }

   /// Health of a readable envelope, consistent with the next sync decision.
   pub fn of_envelope(envelope: &CacheEnvelope, policy: &SyncPolicy, now: DateTime<Utc>) -> Self {
      let count = envelope.dockets.len();
      let integrity = &envelope.integrity;
      if integrity.appears_incomplete(count, policy.shrinkage_threshold) {
         return Self::Suspect { count, peak: integrity.effective_peak() };
      }
      match decision::decide_for_envelope(envelope, policy, now) {
         SyncStrategy::Full { reason } => Self::Stale { reason: reason.to_string() },
         _ => Self::Healthy,
      }
   }
}

/// Signals published by the sync engine after every transition.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SyncStatus {
   pub syncing:      bool,
   pub phase:        SyncPhase,
   /// Fraction complete for the sync in flight, `0.0..=1.0`.
   pub progress:     f64,
   pub last_sync:    Option<DateTime<Utc>>,
   pub last_error:   Option<String>,
   pub health:       CacheHealth,
   pub docket_count: usize,
}

impl SyncStatus {
   /// One-line summary suitable for a status bar.
   pub fn summary(&self) -> String {
      self.summary_at(Utc::now())
   }

   pub fn summary_at(&self, now: DateTime<Utc>) -> String {
      if self.syncing {
         return format!("{} ({:.0}%)", self.phase.label(), self.progress * 100.0);
      }

      let age = self
         .last_sync
         .map_or_else(|| "never synced".to_string(), |at| format!("synced {}", format_age(now - at)));

      if self.last_error.is_some() {
         if self.docket_count == 0 {
            return "Sync could not complete; no cached data available".to_string();
         }
         return format!(
            "Sync could not complete; showing last known data ({} dockets, {age})",
            self.docket_count
         );
      }

      match &self.health {
         CacheHealth::Corrupted { .. } => {
            "Cache file is corrupted; delete and regenerate it".to_string()
         },
         CacheHealth::Suspect { count, peak } => {
            format!("Cache may be incomplete ({count} of {peak} dockets); full sync scheduled")
         },
         CacheHealth::Missing => "No cache yet".to_string(),
         _ => format!("{} dockets, {age}", self.docket_count),
      }
   }
}
