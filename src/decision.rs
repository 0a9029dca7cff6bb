//! Chooses between reusing the cache, an incremental merge, or a full resync.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{config::SyncPolicy, model::CacheEnvelope, store::CacheState};

/// Why a full resync was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FullSyncReason {
   NoCache,
   Corrupted(String),
   EmptyCache,
   AppearsIncomplete { count: usize, peak: usize },
   MissingDueDates { missing: usize, total: usize },
   StaleDueDates { newest: Option<NaiveDate> },
   FullSyncOverdue { last: Option<DateTime<Utc>> },
   Requested,
   IncrementalFailed(String),
}

impl fmt::Display for FullSyncReason {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::NoCache => write!(f, "no cache yet"),
         Self::Corrupted(detail) => write!(f, "cache corrupted: {detail}"),
         Self::EmptyCache => write!(f, "cache holds no dockets"),
         Self::AppearsIncomplete { count, peak } => {
            write!(f, "cache appears incomplete ({count} dockets, peak {peak})")
         },
         Self::MissingDueDates { missing, total } => {
            write!(f, "{missing} of {total} dockets lack due dates")
         },
         Self::StaleDueDates { newest: Some(newest) } => {
            write!(f, "newest due date {newest} is outside the look-back window")
         },
         Self::StaleDueDates { newest: None } => write!(f, "no due dates present"),
         Self::FullSyncOverdue { last: Some(last) } => {
            write!(f, "last full sync {} is overdue", last.to_rfc3339())
         },
         Self::FullSyncOverdue { last: None } => write!(f, "no full sync on record"),
         Self::Requested => write!(f, "full refresh requested"),
         Self::IncrementalFailed(detail) => write!(f, "incremental sync failed: {detail}"),
      }
   }
}

/// Strategy for one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStrategy {
   /// Cache is fresh and healthy; no remote call.
   UseCacheAsIs,
   /// Fetch records modified since `modified_since` and merge by key.
   Incremental {
      modified_since:  DateTime<Utc>,
      /// Known docket-bearing containers; `None` means discover.
      scope:           Option<Vec<String>>,
      force_discovery: bool,
   },
   /// Fetch everything with full discovery and replace the cache.
   Full { reason: FullSyncReason },
}

impl SyncStrategy {
   pub const fn label(&self) -> &'static str {
      match self {
         Self::UseCacheAsIs => "cached",
         Self::Incremental { .. } => "incremental",
         Self::Full { .. } => "full",
      }
   }

   pub const fn is_full(&self) -> bool {
      matches!(self, Self::Full { .. })
   }
}

/// Applies the decision rules in order; the first match wins.
pub fn decide(state: &CacheState, policy: &SyncPolicy, now: DateTime<Utc>) -> SyncStrategy {
   let envelope = match state {
      CacheState::Missing => return full(FullSyncReason::NoCache),
      CacheState::Corrupted(err) => return full(FullSyncReason::Corrupted(err.to_string())),
      CacheState::Loaded(envelope) => envelope,
   };
   decide_for_envelope(envelope, policy, now)
}

pub fn decide_for_envelope(
   envelope: &CacheEnvelope,
   policy: &SyncPolicy,
   now: DateTime<Utc>,
) -> SyncStrategy {
   if envelope.is_empty() {
      return full(FullSyncReason::EmptyCache);
   }

   let integrity = &envelope.integrity;
   let count = envelope.dockets.len();
   if integrity.appears_incomplete(count, policy.shrinkage_threshold) {
      let reason = FullSyncReason::AppearsIncomplete { count, peak: integrity.effective_peak() };
      tracing::warn!("forcing full sync: {reason}");
      return full(reason);
   }

   if let Some(reason) = due_date_defect(envelope, policy, now) {
      tracing::info!("forcing full sync: {reason}");
      return full(reason);
   }

   if integrity.needs_full_sync(now, policy.full_sync_max_age_days) {
      return full(FullSyncReason::FullSyncOverdue { last: integrity.last_full_sync_date });
   }

   let age = envelope.age(now);
   if age >= Duration::zero() && age < policy.freshness_window {
      tracing::debug!(age_secs = age.num_seconds(), "cache is fresh; skipping remote fetch");
      return SyncStrategy::UseCacheAsIs;
   }

   let force_discovery = integrity.needs_discovery(now, policy.discovery_max_age_days);
   let scope = if force_discovery {
      None
   } else {
      integrity.scope_hint().map(<[String]>::to_vec)
   };
   SyncStrategy::Incremental {
      modified_since: envelope.last_sync.min(now),
      force_discovery: scope.is_none(),
      scope,
   }
}

/// Detects caches that predate due-date support or carry implausibly old data.
fn due_date_defect(
   envelope: &CacheEnvelope,
   policy: &SyncPolicy,
   now: DateTime<Utc>,
) -> Option<FullSyncReason> {
   let total = envelope.dockets.len();
   let missing = envelope
      .dockets
      .iter()
      .filter(|d| d.due_date.is_none())
      .count();
   if (missing as f64) > (total as f64) * policy.missing_due_date_ratio {
      return Some(FullSyncReason::MissingDueDates { missing, total });
   }

   let newest = envelope.dockets.iter().filter_map(|d| d.due_date).max();
   let cutoff = (now - Duration::days(i64::from(policy.due_date_lookback_days))).date_naive();
   match newest {
      Some(newest) if newest >= cutoff => None,
      newest => Some(FullSyncReason::StaleDueDates { newest }),
   }
}

const fn full(reason: FullSyncReason) -> SyncStrategy {
   SyncStrategy::Full { reason }
}
