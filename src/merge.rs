//! Key-based reconciliation of cached and freshly fetched dockets.

use std::collections::HashMap;

use crate::model::Docket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
   /// Overlay fetched records on the existing set.
   Incremental,
   /// Fetched records are authoritative and replace the existing set.
   Full,
}

/// Merges `incoming` into `existing`, keyed by `full_name`.
///
/// Incremental merges keep every untouched record in its original position,
/// overwrite matching keys in place, and append new keys in fetch order.
/// Duplicate keys within `incoming` collapse to the last one seen. Applying
/// the same incremental batch twice yields the same result as applying it
/// once.
pub fn merge(existing: &[Docket], incoming: &[Docket], mode: MergeMode) -> Vec<Docket> {
   match mode {
      MergeMode::Full => dedup_last_wins(incoming.iter()),
      MergeMode::Incremental => dedup_last_wins(existing.iter().chain(incoming.iter())),
   }
}

/// Collapses duplicate keys, keeping the first position and the last value.
fn dedup_last_wins<'a>(dockets: impl Iterator<Item = &'a Docket>) -> Vec<Docket> {
   let mut out: Vec<Docket> = Vec::new();
   let mut index: HashMap<&'a str, usize> = HashMap::new();
   for docket in dockets {
      match index.get(docket.full_name.as_str()) {
         Some(&pos) => out[pos] = docket.clone(),
         None => {
            index.insert(docket.full_name.as_str(), out.len());
            out.push(docket.clone());
         },
      }
   }
   out
}

/// Counts of what a merge changed, for logging and sync outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
   pub added:     usize,
   pub updated:   usize,
   pub removed:   usize,
   pub unchanged: usize,
}

impl MergeStats {
   pub fn between(before: &[Docket], after: &[Docket]) -> Self {
      let previous: HashMap<&str, &Docket> =
         before.iter().map(|d| (d.full_name.as_str(), d)).collect();
      let mut stats = Self::default();
      let mut seen = 0usize;
      for docket in after {
         match previous.get(docket.full_name.as_str()) {
            Some(old) => {
               seen += 1;
               if *old == docket {
                  stats.unchanged += 1;
               } else {
                  stats.updated += 1;
               }
            },
            None => stats.added += 1,
         }
      }
      stats.removed = previous.len().saturating_sub(seen);
      stats
   }
}
