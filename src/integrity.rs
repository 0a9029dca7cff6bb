//! High-water marks and sync-recency metadata carried in the envelope.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::model::{Docket, Integrity};

/// Scope provenance reported by the remote fetcher for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeReport {
   /// Containers that were queried (or, for discovery, found to hold dockets).
   pub queried_scope_ids: Vec<String>,
   pub was_discovery:     bool,
}

/// Builds the integrity block for a freshly produced record set.
pub fn stamp(
   new_dockets: &[Docket],
   previous: Option<&Integrity>,
   was_full_sync: bool,
   scope: Option<&ScopeReport>,
   now: DateTime<Utc>,
) -> Integrity {
   let count = new_dockets.len();
   let previous_peak = previous.map_or(0, Integrity::effective_peak);
   let was_discovery = scope.is_some_and(|s| s.was_discovery);

   Integrity {
      docket_count:               count,
      peak_docket_count:          Some(previous_peak.max(count)),
      last_full_sync_date:        if was_full_sync {
         Some(now)
      } else {
         previous.and_then(|p| p.last_full_sync_date)
      },
      last_discovery_date:        if was_discovery {
         Some(now)
      } else {
         previous.and_then(|p| p.last_discovery_date)
      },
      docket_bearing_project_ids: merge_scope(
         previous.and_then(|p| p.docket_bearing_project_ids.as_deref()),
         scope,
      ),
   }
}

/// Discovery replaces the hint wholesale; any other run only adds to it.
fn merge_scope(previous: Option<&[String]>, scope: Option<&ScopeReport>) -> Option<Vec<String>> {
   let Some(scope) = scope else {
      return previous.map(<[String]>::to_vec);
   };
   if scope.was_discovery {
      let ids: BTreeSet<&String> = scope.queried_scope_ids.iter().collect();
      return Some(ids.into_iter().cloned().collect());
   }
   if previous.is_none() && scope.queried_scope_ids.is_empty() {
      return None;
   }
   let ids: BTreeSet<&String> = previous
      .unwrap_or_default()
      .iter()
      .chain(scope.queried_scope_ids.iter())
      .collect();
   Some(ids.into_iter().cloned().collect())
}

impl Integrity {
   /// Peak count, falling back to the current count for legacy envelopes.
   pub fn effective_peak(&self) -> usize {
      self
         .peak_docket_count
         .unwrap_or(self.docket_count)
         .max(self.docket_count)
   }

   /// Whether `current_count` has shrunk suspiciously far below the peak.
   pub fn appears_incomplete(&self, current_count: usize, shrinkage_threshold: f64) -> bool {
      let peak = self.effective_peak();
      if peak == 0 {
         return false;
      }
      (current_count as f64) < (peak as f64) * shrinkage_threshold
   }

   pub fn needs_full_sync(&self, now: DateTime<Utc>, max_age_days: u32) -> bool {
      older_than(self.last_full_sync_date, now, max_age_days)
   }

   /// Whether the docket-bearing scope hint must be rebuilt by discovery.
   pub fn needs_discovery(&self, now: DateTime<Utc>, max_age_days: u32) -> bool {
      let has_scope = self
         .docket_bearing_project_ids
         .as_ref()
         .is_some_and(|ids| !ids.is_empty());
      !has_scope || older_than(self.last_discovery_date, now, max_age_days)
   }

   /// Known scope hint, if any.
   pub fn scope_hint(&self) -> Option<&[String]> {
      self
         .docket_bearing_project_ids
         .as_deref()
         .filter(|ids| !ids.is_empty())
   }
}

fn older_than(at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age_days: u32) -> bool {
   at.is_none_or(|at| now.signed_duration_since(at) > Duration::days(i64::from(max_age_days)))
}
