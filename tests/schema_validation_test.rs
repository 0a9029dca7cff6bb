mod support;

use std::{fs, path::Path};

use chrono::{Duration, Utc};
use docketsync::SyncOptions;
use jsonschema::JSONSchema;
use serde_json::Value;
use support::{ScriptedFetcher, dated_dockets, due_today, engine, healthy_envelope, store_in};
use tempfile::TempDir;

fn envelope_schema() -> JSONSchema {
   let path = Path::new(env!("CARGO_MANIFEST_DIR"))
      .join("tests/fixtures/schemas/cache_envelope.schema.json");
   let raw = fs::read_to_string(path).expect("schema read");
   let json: Value = serde_json::from_str(&raw).expect("schema json");
   JSONSchema::compile(&json).expect("schema compile")
}

fn validate_instance(schema: &JSONSchema, instance: &Value, label: &str) {
   if let Err(errors) = schema.validate(instance) {
      let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
      panic!("schema validation failed for {label}: {}", messages.join("; "));
   }
}

fn read_json(path: &Path) -> Value {
   let raw = fs::read_to_string(path).expect("cache read");
   serde_json::from_str(&raw).expect("cache json")
}

#[test]
fn saved_envelope_matches_schema() {
   let schema = envelope_schema();
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   let mut dockets = dated_dockets(3, 25000, due_today());
   dockets[0].tags = vec!["rush".to_string()];
   dockets[1].created_at = Some(Utc::now() - Duration::days(4));
   store
      .save(&healthy_envelope(dockets, Utc::now()))
      .expect("save");

   validate_instance(&schema, &read_json(store.path()), "saved envelope");
}

#[test]
fn migrated_legacy_cache_matches_schema() {
   let schema = envelope_schema();
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   fs::write(
      store.path(),
      r#"[{"fullName": "25001_Spot", "number": "25001", "jobName": "Spot"}]"#,
   )
   .expect("write legacy");

   let envelope = store.load().expect("load").expect("legacy envelope");
   store.save(&envelope).expect("save migrated");
   let value = read_json(store.path());
   validate_instance(&schema, &value, "migrated legacy envelope");
   assert!(value["integrity"]["docketBearingProjectIDs"].is_null());
}

#[tokio::test]
async fn synced_envelope_matches_schema() {
   let schema = envelope_schema();
   let dir = TempDir::new().expect("temp dir");
   let fetcher = ScriptedFetcher::new()
      .reply(dated_dockets(5, 25000, due_today()))
      .shared();
   let engine = engine(&dir, &fetcher);
   engine.sync(&SyncOptions::default(), &mut ()).await.expect("sync");

   validate_instance(&schema, &read_json(store_in(&dir).path()), "synced envelope");
}

#[test]
fn foreign_cache_shape_is_rejected_by_schema() {
   let schema = envelope_schema();
   let foreign = serde_json::json!({ "projects": [], "metadata": {} });
   assert!(!schema.is_valid(&foreign));
}
