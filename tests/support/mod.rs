#![allow(dead_code)]

use std::{
   collections::VecDeque,
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
   time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use docketsync::{
   CacheEnvelope, CacheStore, Docket, Integrity, SyncEngine,
   config::SyncPolicy,
   error::RemoteError,
   remote::{FetchProgress, FetchRequest, FetchResult, RemoteFetcher},
};
use parking_lot::Mutex;
use tempfile::TempDir;

/// One scripted answer from the fake remote.
pub enum Reply {
   Dockets(Vec<Docket>),
   Fail(&'static str),
}

/// Remote stand-in that answers from a queue and records every request.
pub struct ScriptedFetcher {
   replies:  Mutex<VecDeque<Reply>>,
   projects: Vec<String>,
   delay:    Option<StdDuration>,
   calls:    AtomicUsize,
   requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
   pub fn new() -> Self {
      Self {
         replies:  Mutex::new(VecDeque::new()),
         projects: vec!["p1".to_string(), "p2".to_string()],
         delay:    None,
         calls:    AtomicUsize::new(0),
         requests: Mutex::new(Vec::new()),
      }
   }

   pub fn reply(self, dockets: Vec<Docket>) -> Self {
      self.replies.lock().push_back(Reply::Dockets(dockets));
      self
   }

   pub fn fail(self, message: &'static str) -> Self {
      self.replies.lock().push_back(Reply::Fail(message));
      self
   }

   pub fn with_delay(mut self, delay: StdDuration) -> Self {
      self.delay = Some(delay);
      self
   }

   pub fn shared(self) -> Arc<Self> {
      Arc::new(self)
   }

   pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
   }

   pub fn requests(&self) -> Vec<FetchRequest> {
      self.requests.lock().clone()
   }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
   async fn fetch(
      &self,
      request: &FetchRequest,
      on_progress: &mut FetchProgress<'_>,
   ) -> Result<FetchResult, RemoteError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.requests.lock().push(request.clone());
      on_progress(0.0, "Fetching changes");
      if let Some(delay) = self.delay {
         tokio::time::sleep(delay).await;
      }
      on_progress(0.5, "Fetching changes");

      let reply = self.replies.lock().pop_front();
      let dockets = match reply {
         Some(Reply::Dockets(dockets)) => dockets,
         Some(Reply::Fail(message)) => return Err(RemoteError::Unavailable(message.to_string())),
         None => return Err(RemoteError::Unavailable("no scripted reply".to_string())),
      };
      on_progress(1.0, "Fetched");

      let was_discovery = request.discovers();
      let queried_scope_ids = if was_discovery {
         self.projects.clone()
      } else {
         request.scope.clone().unwrap_or_default()
      };
      Ok(FetchResult {
         dockets,
         scopes_queried: queried_scope_ids.len(),
         queried_scope_ids,
         was_discovery,
      })
   }
}

pub fn due_today() -> NaiveDate {
   Utc::now().date_naive()
}

pub fn dated_dockets(n: usize, start: u32, due: NaiveDate) -> Vec<Docket> {
   (0..n)
      .map(|i| Docket::new(format!("{}", start as usize + i), "Job").with_due_date(due))
      .collect()
}

pub fn undated_dockets(n: usize, start: u32) -> Vec<Docket> {
   (0..n)
      .map(|i| Docket::new(format!("{}", start as usize + i), "Job"))
      .collect()
}

/// Envelope whose integrity block looks like a recent, healthy full sync.
pub fn healthy_envelope(dockets: Vec<Docket>, last_sync: DateTime<Utc>) -> CacheEnvelope {
   let now = Utc::now();
   let count = dockets.len();
   CacheEnvelope::new(dockets, last_sync, Integrity {
      docket_count:               count,
      peak_docket_count:          Some(count),
      last_full_sync_date:        Some(now - Duration::days(1)),
      last_discovery_date:        Some(now - Duration::days(1)),
      docket_bearing_project_ids: Some(vec!["p1".to_string()]),
   })
}

pub fn store_in(dir: &TempDir) -> CacheStore {
   CacheStore::new(dir.path())
}

pub fn engine(dir: &TempDir, fetcher: &Arc<ScriptedFetcher>) -> SyncEngine<Arc<ScriptedFetcher>> {
   SyncEngine::new(store_in(dir), Arc::clone(fetcher), SyncPolicy::default())
}

pub fn numbers(dockets: &[Docket]) -> Vec<String> {
   dockets.iter().map(|d| d.number.clone()).collect()
}
