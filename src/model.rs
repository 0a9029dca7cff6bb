//! Docket records and the persisted cache envelope.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const ENVELOPE_SCHEMA_VERSION: u32 = 1;

/// One cached job record, keyed by `full_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Docket {
   pub full_name:  String,
   pub number:     String,
   pub job_name:   String,
   #[serde(default, deserialize_with = "de_due_date")]
   pub due_date:   Option<NaiveDate>,
   #[serde(default)]
   pub created_at: Option<DateTime<Utc>>,
   #[serde(default)]
   pub updated_at: Option<DateTime<Utc>>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub tags:       Vec<String>,
}

impl Docket {
   pub fn new(number: impl Into<String>, job_name: impl Into<String>) -> Self {
      let number = number.into();
      let job_name = job_name.into();
      Self {
         full_name: format!("{number}_{job_name}"),
         number,
         job_name,
         due_date: None,
         created_at: None,
         updated_at: None,
         tags: Vec::new(),
      }
   }

   pub const fn with_due_date(mut self, due: NaiveDate) -> Self {
      self.due_date = Some(due);
      self
   }

   pub const fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
      self.created_at = Some(at);
      self
   }

   pub const fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
      self.updated_at = Some(at);
      self
   }

   pub fn with_tags<I, S>(mut self, tags: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.tags = tags.into_iter().map(Into::into).collect();
      self
   }

   /// Leading digits of the docket number, used for numeric ordering.
   pub fn numeric_key(&self) -> Option<u64> {
      let digits: String = self
         .number
         .trim()
         .chars()
         .take_while(char::is_ascii_digit)
         .collect();
      digits.parse().ok()
   }
}

/// Integrity metadata embedded in every envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integrity {
   #[serde(default)]
   pub docket_count:               usize,
   #[serde(default)]
   pub peak_docket_count:          Option<usize>,
   #[serde(default)]
   pub last_full_sync_date:        Option<DateTime<Utc>>,
   #[serde(default)]
   pub last_discovery_date:        Option<DateTime<Utc>>,
   #[serde(default, rename = "docketBearingProjectIDs")]
   pub docket_bearing_project_ids: Option<Vec<String>>,
}

/// The unit of persistence: records plus integrity metadata.
///
/// Envelopes are never edited in place; every sync builds a replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
   #[serde(default = "legacy_schema_version")]
   pub schema_version: u32,
   pub dockets:        Vec<Docket>,
   pub last_sync:      DateTime<Utc>,
   #[serde(default)]
   pub integrity:      Integrity,
}

const fn legacy_schema_version() -> u32 {
   ENVELOPE_SCHEMA_VERSION
}

impl CacheEnvelope {
   pub fn new(dockets: Vec<Docket>, last_sync: DateTime<Utc>, integrity: Integrity) -> Self {
      Self { schema_version: ENVELOPE_SCHEMA_VERSION, dockets, last_sync, integrity }
   }

   /// Builds an envelope from a pre-envelope legacy file (bare record array).
   pub fn from_legacy(dockets: Vec<Docket>, last_sync: DateTime<Utc>) -> Self {
      let count = dockets.len();
      Self::new(dockets, last_sync, Integrity {
         docket_count: count,
         peak_docket_count: Some(count),
         ..Integrity::default()
      })
   }

   /// Fills defaults for fields older writers left out.
   ///
   /// `docket_count` always reflects the records actually present, and the
   /// peak never sits below it.
   pub fn migrate(mut self) -> Self {
      self.schema_version = ENVELOPE_SCHEMA_VERSION;
      self.integrity.docket_count = self.dockets.len();
      let peak = self
         .integrity
         .peak_docket_count
         .unwrap_or(0)
         .max(self.dockets.len());
      self.integrity.peak_docket_count = Some(peak);
      self
   }

   pub fn is_empty(&self) -> bool {
      self.dockets.is_empty()
   }

   pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
      now.signed_duration_since(self.last_sync)
   }
}

fn de_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
   D: Deserializer<'de>,
{
   let raw: Option<String> = Option::deserialize(deserializer)?;
   let Some(raw) = raw else {
      return Ok(None);
   };
   let raw = raw.trim();
   if raw.is_empty() {
      return Ok(None);
   }
   if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
      return Ok(Some(date));
   }
   DateTime::parse_from_rfc3339(raw)
      .map(|dt| Some(dt.with_timezone(&Utc).date_naive()))
      .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn numeric_key_reads_leading_digits() {
      assert_eq!(Docket::new("25104", "Spot").numeric_key(), Some(25104));
      assert_eq!(Docket::new("25104-A", "Spot").numeric_key(), Some(25104));
      assert_eq!(Docket::new("TBD", "Spot").numeric_key(), None);
   }

   #[test]
   fn due_date_accepts_date_and_timestamp() {
      let a: Docket = serde_json::from_str(
         r#"{"fullName":"1_A","number":"1","jobName":"A","dueDate":"2026-03-01"}"#,
      )
      .expect("date");
      let b: Docket = serde_json::from_str(
         r#"{"fullName":"1_A","number":"1","jobName":"A","dueDate":"2026-03-01T17:00:00Z"}"#,
      )
      .expect("timestamp");
      assert_eq!(a.due_date, b.due_date);

      let c: Docket = serde_json::from_str(
         r#"{"fullName":"1_A","number":"1","jobName":"A","dueDate":null}"#,
      )
      .expect("null");
      assert!(c.due_date.is_none());
   }

   #[test]
   fn migrate_repairs_counts() {
      let now = Utc::now();
      let envelope = CacheEnvelope {
         schema_version: 0,
         dockets:        vec![Docket::new("1", "A"), Docket::new("2", "B")],
         last_sync:      now,
         integrity:      Integrity::default(),
      }
      .migrate();
      assert_eq!(envelope.schema_version, ENVELOPE_SCHEMA_VERSION);
      assert_eq!(envelope.integrity.docket_count, 2);
      assert_eq!(envelope.integrity.peak_docket_count, Some(2));
   }

   #[test]
   fn envelope_uses_wire_field_names() {
      let envelope = CacheEnvelope::from_legacy(vec![Docket::new("7", "G")], Utc::now());
      let value = serde_json::to_value(&envelope).expect("serialize");
      assert!(value.get("dockets").is_some());
      assert!(value.get("lastSync").is_some());
      let integrity = value.get("integrity").expect("integrity");
      assert!(integrity.get("docketCount").is_some());
      assert!(integrity.get("docketBearingProjectIDs").is_some());
   }
}
