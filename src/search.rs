//! In-memory filtering and ordering over the materialized docket set.

use std::{cmp::Ordering, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::model::Docket;

/// Result orderings offered to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
   /// Newest `createdAt` first; records without one sort last.
   #[default]
   RecentlyCreated,
   NumberAsc,
   NumberDesc,
   NameAsc,
   NameDesc,
}

impl FromStr for SortOrder {
   type Err = String;

   fn from_str(s: &str) -> Result<Self, Self::Err> {
      match s.to_ascii_lowercase().as_str() {
         "recent" | "recently-created" | "created" => Ok(Self::RecentlyCreated),
         "number" | "number-asc" => Ok(Self::NumberAsc),
         "number-desc" => Ok(Self::NumberDesc),
         "name" | "name-asc" => Ok(Self::NameAsc),
         "name-desc" => Ok(Self::NameDesc),
         other => Err(format!(
            "unknown sort order '{other}' (expected recent, number-asc, number-desc, name-asc, \
             name-desc)"
         )),
      }
   }
}

/// Returns the dockets matching `query`, ordered by `order`.
///
/// The query is split on whitespace; every term must appear, case-insensitively,
/// in the docket's full name, number, job name, or one of its tags. An empty
/// query matches everything.
pub fn search(dockets: &[Docket], query: &str, order: SortOrder) -> Vec<Docket> {
   let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
   let mut hits: Vec<Docket> = dockets
      .iter()
      .filter(|d| terms.iter().all(|t| matches_term(d, t)))
      .cloned()
      .collect();
   hits.sort_by(|a, b| compare(a, b, order));
   hits
}

fn matches_term(docket: &Docket, term: &str) -> bool {
   docket.full_name.to_lowercase().contains(term)
      || docket.number.to_lowercase().contains(term)
      || docket.job_name.to_lowercase().contains(term)
      || docket.tags.iter().any(|t| t.to_lowercase().contains(term))
}

fn compare(a: &Docket, b: &Docket, order: SortOrder) -> Ordering {
   let primary = match order {
      SortOrder::RecentlyCreated => match (a.created_at, b.created_at) {
         (Some(x), Some(y)) => y.cmp(&x),
         (Some(_), None) => Ordering::Less,
         (None, Some(_)) => Ordering::Greater,
         (None, None) => Ordering::Equal,
      },
      SortOrder::NumberAsc => by_number(a, b),
      SortOrder::NumberDesc => match (a.numeric_key(), b.numeric_key()) {
         (Some(x), Some(y)) => y.cmp(&x),
         _ => by_number(a, b),
      },
      SortOrder::NameAsc => by_job_name(a, b),
      SortOrder::NameDesc => by_job_name(b, a),
   };
   primary
      .then_with(|| by_number(a, b))
      .then_with(|| a.full_name.cmp(&b.full_name))
}

/// Numeric key order; records without a numeric key sort after those with one.
fn by_number(a: &Docket, b: &Docket) -> Ordering {
   match (a.numeric_key(), b.numeric_key()) {
      (Some(x), Some(y)) => x.cmp(&y),
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => Ordering::Equal,
   }
}

fn by_job_name(a: &Docket, b: &Docket) -> Ordering {
   a.job_name.to_lowercase().cmp(&b.job_name.to_lowercase())
}
