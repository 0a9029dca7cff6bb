#![cfg(feature = "failpoints")]

mod support;

use std::{fs, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use docketsync::SyncOptions;
use fail::FailScenario;
use support::{ScriptedFetcher, dated_dockets, due_today, engine, healthy_envelope, store_in};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[test]
fn rename_failpoint_preserves_previous_cache() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   store
      .save(&healthy_envelope(dated_dockets(3, 25000, due_today()), Utc::now()))
      .expect("seed");
   let before = fs::read(store.path()).expect("read seed");

   let scenario = FailScenario::setup();
   fail::cfg("store.before_rename", "return").unwrap();

   let err = store
      .save(&healthy_envelope(dated_dockets(9, 26000, due_today()), Utc::now()))
      .expect_err("expected failpoint error");
   assert!(err.to_string().contains("failpoint"), "{err}");
   scenario.teardown();

   assert_eq!(fs::read(store.path()).expect("read after"), before);
   let leftovers: Vec<_> = fs::read_dir(dir.path())
      .expect("read dir")
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .collect();
   assert!(leftovers.is_empty(), "temp file left behind");
}

#[tokio::test]
async fn interrupted_persist_keeps_last_good_envelope() {
   let dir = TempDir::new().expect("temp dir");
   let seed = healthy_envelope(dated_dockets(4, 25000, due_today()), Utc::now() - Duration::hours(3));
   let store = store_in(&dir);
   store.save(&seed).expect("seed");

   let fetcher = ScriptedFetcher::new()
      .reply(dated_dockets(2, 27000, due_today()))
      .shared();
   let engine = engine(&dir, &fetcher);

   let scenario = FailScenario::setup();
   fail::cfg("store.before_rename", "return").unwrap();
   let err = engine
      .sync(&SyncOptions::default(), &mut ())
      .await
      .expect_err("persist must fail");
   scenario.teardown();

   assert!(matches!(err, docketsync::Error::Cache(_)), "{err}");
   assert_eq!(store.load().expect("load").expect("envelope"), seed);
   assert!(engine.status().last_error.is_some());
   // The fetched records are still served from memory.
   assert_eq!(engine.snapshot().expect("snapshot").dockets.len(), 6);
}

#[test]
fn unsupported_rename_falls_back_to_direct_write() {
   let dir = TempDir::new().expect("temp dir");
   let store = store_in(&dir);
   store
      .save(&healthy_envelope(dated_dockets(3, 25000, due_today()), Utc::now()))
      .expect("seed");

   let scenario = FailScenario::setup();
   fail::cfg("store.before_rename", "return(unsupported)").unwrap();
   let next = healthy_envelope(dated_dockets(9, 26000, due_today()), Utc::now());
   let report = store.save(&next).expect("direct write succeeds");
   scenario.teardown();

   assert!(!report.atomic);
   assert_eq!(store.load().expect("load").expect("envelope"), next);
   let leftovers: Vec<_> = fs::read_dir(dir.path())
      .expect("read dir")
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
      .collect();
   assert!(leftovers.is_empty(), "temp file left behind");
}

#[tokio::test]
async fn sync_succeeds_on_volume_without_atomic_rename() {
   let dir = TempDir::new().expect("temp dir");
   let fetcher = ScriptedFetcher::new()
      .reply(dated_dockets(5, 25000, due_today()))
      .shared();
   let engine = engine(&dir, &fetcher);

   let scenario = FailScenario::setup();
   fail::cfg("store.before_rename", "return(cross_device)").unwrap();
   let outcome = engine.sync(&SyncOptions::default(), &mut ()).await.expect("sync");
   scenario.teardown();

   assert!(outcome.saved.as_ref().is_some_and(|s| !s.atomic));
   let on_disk = store_in(&dir).load().expect("load").expect("envelope");
   assert_eq!(on_disk.dockets.len(), 5);
   assert!(engine.status().last_error.is_none());
}

#[tokio::test]
async fn cancel_during_slow_write_completes_the_sync() {
   let dir = TempDir::new().expect("temp dir");
   let seed = healthy_envelope(dated_dockets(4, 25000, due_today()), Utc::now() - Duration::hours(3));
   let store = store_in(&dir);
   store.save(&seed).expect("seed");

   let fetcher = ScriptedFetcher::new()
      .reply(dated_dockets(2, 27000, due_today()))
      .shared();
   let engine = engine(&dir, &fetcher);

   let scenario = FailScenario::setup();
   fail::cfg("store.before_rename", "sleep(400)").unwrap();
   let cancel = CancellationToken::new();
   let trigger = cancel.clone();
   tokio::spawn(async move {
      tokio::time::sleep(StdDuration::from_millis(100)).await;
      trigger.cancel();
   });
   let result = engine.sync_with_cancel(&SyncOptions::default(), &cancel, &mut ()).await;
   scenario.teardown();

   let outcome = result.expect("a started write is not abandoned");
   assert!(cancel.is_cancelled());
   assert_eq!(outcome.dockets().len(), 6);

   // Nothing is left running that could change the file afterwards.
   let on_disk = store.load().expect("load").expect("envelope");
   assert_eq!(on_disk, *engine.snapshot().expect("snapshot"));
   tokio::time::sleep(StdDuration::from_millis(500)).await;
   assert_eq!(store.load().expect("load").expect("envelope"), on_disk);

   let status = engine.status();
   assert!(!status.syncing);
   assert_eq!(status.last_sync, Some(on_disk.last_sync));
   assert!(status.last_error.is_none());
}
