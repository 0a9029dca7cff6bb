mod support;

use std::fs;

use chrono::{Duration, Utc};
use docketsync::{
   error::CacheError,
   model::ENVELOPE_SCHEMA_VERSION,
   store::{CACHE_FILE_NAME, CacheState},
};
use support::{dated_dockets, due_today, healthy_envelope, store_in};
use tempfile::TempDir;

#[test]
fn missing_file_is_not_found() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   assert_eq!(store.path(), dir.path().join(CACHE_FILE_NAME));
   assert!(store.load().expect("load").is_none());
   assert!(matches!(store.inspect().expect("inspect"), CacheState::Missing));
}

#[test]
fn zero_byte_file_is_corruption_not_absence() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::write(store.path(), b"").expect("write empty");

   let err = store.load().expect_err("empty file must not load");
   assert!(matches!(err, CacheError::Empty { .. }));
   assert!(err.is_corruption());
   assert!(err.to_string().contains(&store.path().display().to_string()));
   assert!(matches!(store.inspect().expect("inspect"), CacheState::Corrupted(_)));
}

#[test]
fn directory_at_cache_path_is_reported() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::create_dir(store.path()).expect("create dir in the way");

   assert!(matches!(store.load(), Err(CacheError::IsDirectory { .. })));
   let envelope = healthy_envelope(dated_dockets(3, 25000, due_today()), Utc::now());
   assert!(matches!(store.save(&envelope), Err(CacheError::IsDirectory { .. })));
   assert!(store.path().is_dir(), "save must not remove the directory");
}

#[test]
fn invalid_json_reports_size_and_path() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::write(store.path(), "{not json").expect("write");

   match store.load() {
      Err(CacheError::InvalidJson { size, path, .. }) => {
         assert_eq!(size, 9);
         assert_eq!(path, store.path());
      },
      other => panic!("expected invalid json, got {other:?}"),
   }
}

#[test]
fn other_cache_type_is_detected() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::write(store.path(), r#"{"projects": [], "metadata": {"v": 2}}"#).expect("write");

   match store.load() {
      Err(CacheError::ForeignCache { keys, .. }) => {
         assert_eq!(keys, vec!["projects".to_string(), "metadata".to_string()]);
      },
      other => panic!("expected foreign cache, got {other:?}"),
   }
}

#[test]
fn unknown_object_is_wrong_schema() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::write(store.path(), r#"{"hello": "world"}"#).expect("write");
   let err = store.load().expect_err("not an envelope");
   assert!(matches!(err, CacheError::WrongSchema { .. }));
   assert!(err.to_string().contains("dockets"), "{err}");
}

#[test]
fn newer_schema_version_is_refused() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let raw = format!(
      r#"{{"schemaVersion": {}, "dockets": [], "lastSync": "2025-01-01T00:00:00Z"}}"#,
      ENVELOPE_SCHEMA_VERSION + 1
   );
   fs::write(store.path(), raw).expect("write");
   assert!(matches!(store.load(), Err(CacheError::UnsupportedVersion { .. })));
}

#[test]
fn legacy_array_is_migrated() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let raw = r#"[
      {"fullName": "25001_Spot", "number": "25001", "jobName": "Spot", "dueDate": "2025-03-01"},
      {"fullName": "25002_Promo", "number": "25002", "jobName": "Promo"}
   ]"#;
   fs::write(store.path(), raw).expect("write");

   let envelope = store.load().expect("load").expect("legacy envelope");
   assert_eq!(envelope.schema_version, ENVELOPE_SCHEMA_VERSION);
   assert_eq!(envelope.dockets.len(), 2);
   assert_eq!(envelope.integrity.docket_count, 2);
   assert_eq!(envelope.integrity.peak_docket_count, Some(2));
   assert!(envelope.integrity.last_full_sync_date.is_none());
}

#[test]
fn envelope_without_integrity_gets_defaults() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let raw = r#"{
      "dockets": [{"fullName": "25001_Spot", "number": "25001", "jobName": "Spot"}],
      "lastSync": "2025-01-01T00:00:00Z"
   }"#;
   fs::write(store.path(), raw).expect("write");

   let envelope = store.load().expect("load").expect("envelope");
   assert_eq!(envelope.integrity.docket_count, 1);
   assert_eq!(envelope.integrity.peak_docket_count, Some(1));
   assert!(envelope.integrity.docket_bearing_project_ids.is_none());
}

#[test]
fn save_then_load_preserves_envelope() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let now = Utc::now();
   let mut dockets = dated_dockets(4, 25000, due_today());
   dockets[0].tags = vec!["rush".to_string()];
   dockets[1].created_at = Some(now - Duration::days(3));
   let envelope = healthy_envelope(dockets, now);

   let report = store.save(&envelope).expect("save");
   assert!(report.atomic);
   assert_eq!(report.path, store.path());
   assert!(report.bytes > 0);

   let loaded = store.load().expect("load").expect("envelope");
   assert_eq!(loaded, envelope);

   store.save(&loaded).expect("save again");
   assert_eq!(store.load().expect("reload").expect("envelope"), envelope);
}

#[test]
fn save_creates_missing_parents() {
   let dir = TempDir::new().expect("temp dir");
   let store = docketsync::CacheStore::new(dir.path().join("studio").join("shared"));
   let envelope = healthy_envelope(dated_dockets(1, 25000, due_today()), Utc::now());
   store.save(&envelope).expect("save");
   assert!(dir.path().join("studio/shared").join(CACHE_FILE_NAME).is_file());
}

#[test]
fn save_leaves_no_temp_files() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let envelope = healthy_envelope(dated_dockets(2, 25000, due_today()), Utc::now());
   store.save(&envelope).expect("save");
   store.save(&envelope).expect("save twice");

   let names: Vec<String> = fs::read_dir(dir.path())
      .expect("read dir")
      .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
      .collect();
   assert_eq!(names, vec![CACHE_FILE_NAME.to_string()]);
}

#[test]
fn remove_deletes_file_once() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let envelope = healthy_envelope(dated_dockets(2, 25000, due_today()), Utc::now());
   store.save(&envelope).expect("save");

   assert!(store.remove().expect("remove"));
   assert!(!store.remove().expect("remove again"));
   assert!(store.load().expect("load").is_none());
}
