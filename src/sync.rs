//! Sync orchestration: decide, fetch, merge, stamp, persist, publish.
//!
//! One sync runs at a time per engine. A request that arrives while another
//! is in flight waits for it to finish and then runs its own decision, which
//! normally finds the cache fresh and skips the remote entirely.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use indicatif::ProgressBar;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
   Error, Result,
   config::SyncPolicy,
   decision::{self, FullSyncReason, SyncStrategy},
   error::RemoteError,
   integrity,
   merge::{self, MergeMode, MergeStats},
   model::{CacheEnvelope, Docket, Integrity},
   remote::{FetchRequest, FetchResult, RemoteFetcher},
   search::{self, SortOrder},
   status::{CacheHealth, SyncPhase, SyncStatus},
   store::{CacheState, CacheStore, SaveReport},
};

const FETCH_START: f64 = 0.1;
const FETCH_END: f64 = 0.8;
const MERGE_AT: f64 = 0.85;
const PERSIST_AT: f64 = 0.9;

/// Progress update delivered to callers during a sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
   /// Never decreases within one sync.
   pub fraction: f64,
   pub phase:    SyncPhase,
   pub message:  String,
}

/// Trait for receiving sync progress updates
pub trait SyncProgressCallback: Send {
   fn progress(&mut self, progress: SyncProgress);
}

impl<F: FnMut(SyncProgress) + Send> SyncProgressCallback for F {
   fn progress(&mut self, progress: SyncProgress) {
      self(progress);
   }
}

impl SyncProgressCallback for () {
   fn progress(&mut self, _progress: SyncProgress) {}
}

impl SyncProgressCallback for ProgressBar {
   fn progress(&mut self, progress: SyncProgress) {
      self.update(|state| {
         state.set_len(1000);
         state.set_pos((progress.fraction * 1000.0) as u64);
      });
      self.set_message(progress.message);
   }
}

/// Per-call knobs for [`SyncEngine::sync`].
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
   /// Extra containers to include in an incremental fetch's scope.
   pub scope_hints: Vec<String>,
   /// Overrides the engine's policy for this call.
   pub policy:      Option<SyncPolicy>,
   /// Skip the decision engine and run a full discovery sync.
   pub force_full:  bool,
}

/// Result of a completed sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
   pub strategy:       SyncStrategy,
   pub envelope:       Arc<CacheEnvelope>,
   pub stats:          MergeStats,
   pub fetched:        usize,
   pub scopes_queried: usize,
   /// An incremental fetch failed and a full discovery fetch replaced it.
   pub fell_back:      bool,
   /// `None` when the cache was reused without a write.
   pub saved:          Option<SaveReport>,
   /// Cache health observed before this sync ran.
   pub prior_health:   CacheHealth,
}

impl SyncOutcome {
   pub fn dockets(&self) -> &[Docket] {
      &self.envelope.dockets
   }

   pub fn integrity(&self) -> &Integrity {
      &self.envelope.integrity
   }
}

type ShareProbe = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Engine keeping the shared docket cache in step with the remote system.
pub struct SyncEngine<R: RemoteFetcher> {
   store:         CacheStore,
   remote:        R,
   policy:        SyncPolicy,
   fetch_timeout: Option<Duration>,
   share_probe:   ShareProbe,
   snapshot:      RwLock<Option<Arc<CacheEnvelope>>>,
   status:        watch::Sender<SyncStatus>,
}

impl<R: RemoteFetcher> SyncEngine<R> {
   pub fn new(store: CacheStore, remote: R, policy: SyncPolicy) -> Self {
      let (status, _) = watch::channel(SyncStatus::default());
      Self {
         store,
         remote,
         policy,
         fetch_timeout: None,
         share_probe: Box::new(share_reachable),
         snapshot: RwLock::new(None),
         status,
      }
   }

   /// Bounds each remote fetch; an expired fetch counts as a remote failure.
   #[must_use]
   pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
      self.fetch_timeout = Some(timeout);
      self
   }

   /// Replaces the check that the shared volume is mounted.
   ///
   /// The default requires the cache file's parent directory to exist.
   #[must_use]
   pub fn with_share_probe(mut self, probe: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
      self.share_probe = Box::new(probe);
      self
   }

   pub const fn store(&self) -> &CacheStore {
      &self.store
   }

   pub const fn policy(&self) -> &SyncPolicy {
      &self.policy
   }

   /// Receiver that observes every status transition.
   pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
      self.status.subscribe()
   }

   pub fn status(&self) -> SyncStatus {
      self.status.borrow().clone()
   }

   /// Envelope currently materialized in memory.
   pub fn snapshot(&self) -> Option<Arc<CacheEnvelope>> {
      self.snapshot.read().clone()
   }

   /// Filters and orders the in-memory records; never touches disk or network.
   pub fn search(&self, query: &str, order: SortOrder) -> Vec<Docket> {
      self
         .snapshot
         .read()
         .as_ref()
         .map_or_else(Vec::new, |envelope| search::search(&envelope.dockets, query, order))
   }

   /// Materializes the on-disk envelope without contacting the remote.
   ///
   /// Corruption is reported through the published health rather than as an
   /// error, so a host can start with an empty view and sync later.
   pub async fn load_cached(&self) -> Result<Option<Arc<CacheEnvelope>>> {
      let state = self.read_state().await?;
      let health = CacheHealth::assess(&state, &self.policy, Utc::now());
      let envelope = match state {
         CacheState::Loaded(envelope) => Some(Arc::new(envelope)),
         CacheState::Missing | CacheState::Corrupted(_) => None,
      };
      if let Some(envelope) = &envelope {
         self.install(Arc::clone(envelope));
      }
      self.status.send_modify(|s| {
         s.health = health;
         if let Some(envelope) = &envelope {
            s.last_sync = Some(envelope.last_sync);
            s.docket_count = envelope.dockets.len();
         }
      });
      Ok(envelope)
   }

   pub async fn sync(
      &self,
      options: &SyncOptions,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncOutcome> {
      self
         .sync_with_cancel(options, &CancellationToken::new(), callback)
         .await
   }

   /// Bypasses the decision engine and refetches everything.
   pub async fn force_full_sync(
      &self,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncOutcome> {
      let options = SyncOptions { force_full: true, ..SyncOptions::default() };
      self.sync(&options, callback).await
   }

   /// Runs one sync, abandoning it when `cancel` fires.
   ///
   /// Cancellation is honoured up to the start of the cache write; an
   /// abandoned sync leaves the previous cache file in place. A write that has
   /// already started completes and the sync finishes normally.
   pub async fn sync_with_cancel(
      &self,
      options: &SyncOptions,
      cancel: &CancellationToken,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncOutcome> {
      loop {
         if let Some(_flight) = self.begin() {
            return match self.run(options, cancel, callback).await {
               Ok(outcome) => Ok(outcome),
               Err(err) => Err(self.fail(err)),
            };
         }

         tracing::debug!("sync already in flight; waiting for it to finish");
         let mut rx = self.status.subscribe();
         tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled("queued sync")),
            idle = rx.wait_for(|s| !s.syncing) => {
               drop(idle.map_err(|e| Error::Server { op: "sync", reason: e.to_string() })?);
            },
         }
      }
   }

   /// Marks a sync as in flight; `None` if one already is.
   fn begin(&self) -> Option<InFlight<'_>> {
      let won = self.status.send_if_modified(|s| {
         if s.syncing {
            return false;
         }
         s.syncing = true;
         s.phase = SyncPhase::Deciding;
         s.progress = 0.0;
         true
      });
      won.then(|| InFlight { status: &self.status })
   }

   async fn run(
      &self,
      options: &SyncOptions,
      cancel: &CancellationToken,
      callback: &mut dyn SyncProgressCallback,
   ) -> Result<SyncOutcome> {
      let policy = options.policy.unwrap_or(self.policy);
      let mut progress = ProgressTracker::new(&self.status, callback);
      progress.report(0.0, SyncPhase::Deciding, None);

      let path = self.store.path();
      if !(self.share_probe)(path) {
         return Err(Error::Server {
            op:     "sync",
            reason: format!("shared cache location is unreachable: {}", path.display()),
         });
      }

      let state = tokio::select! {
         biased;
         () = cancel.cancelled() => return Err(Error::Cancelled("cache load")),
         state = self.read_state() => state?,
      };

      let started_at = Utc::now();
      let prior_health = CacheHealth::assess(&state, &policy, started_at);
      self.status.send_modify(|s| s.health = prior_health.clone());

      let mut strategy = if options.force_full {
         SyncStrategy::Full { reason: FullSyncReason::Requested }
      } else {
         decision::decide(&state, &policy, started_at)
      };
      tracing::debug!(strategy = strategy.label(), "sync decision");

      let corrupted = matches!(state, CacheState::Corrupted(_));
      let previous = match state {
         CacheState::Loaded(envelope) => Some(Arc::new(envelope)),
         CacheState::Missing | CacheState::Corrupted(_) => None,
      };

      // Cold start: make the last good envelope visible before any fetch.
      if let Some(envelope) = &previous {
         if self.snapshot.read().is_none() {
            self.install(Arc::clone(envelope));
         }
      }

      if strategy == SyncStrategy::UseCacheAsIs {
         if let Some(envelope) = previous {
            return Ok(self.finish_cached(envelope, prior_health, &policy, &mut progress));
         }
         strategy = SyncStrategy::Full { reason: FullSyncReason::NoCache };
      }

      progress.begin_fetch();
      let (fetch, strategy, fell_back) =
         match self.fetch(&strategy, options, cancel, &mut progress).await {
            Ok(fetch) => (fetch, strategy, false),
            Err(err) if !strategy.is_full() && !matches!(err, Error::Cancelled(_)) => {
               tracing::warn!("incremental sync failed; retrying as full discovery: {err}");
               let strategy =
                  SyncStrategy::Full { reason: FullSyncReason::IncrementalFailed(err.to_string()) };
               progress.begin_fetch();
               let fetch = self.fetch(&strategy, options, cancel, &mut progress).await?;
               (fetch, strategy, true)
            },
            Err(err) => return Err(err),
         };

      progress.report(MERGE_AT, SyncPhase::Merging, None);
      let existing = previous.as_deref().map_or(&[][..], |e| e.dockets.as_slice());
      let mode = if strategy.is_full() { MergeMode::Full } else { MergeMode::Incremental };
      let merged = merge::merge(existing, &fetch.dockets, mode);
      let stats = MergeStats::between(existing, &merged);

      // A corrupted file lost its history; the in-memory copy still has it.
      let remembered = if corrupted { self.snapshot() } else { None };
      let prior_integrity = previous
         .as_deref()
         .or(remembered.as_deref())
         .map(|e| &e.integrity);
      let integrity = integrity::stamp(
         &merged,
         prior_integrity,
         strategy.is_full(),
         Some(&fetch.scope_report()),
         started_at,
      );
      let envelope = Arc::new(CacheEnvelope::new(merged, started_at, integrity));

      if cancel.is_cancelled() {
         return Err(Error::Cancelled("persist"));
      }
      progress.report(PERSIST_AT, SyncPhase::Persisting, None);
      let store = self.store.clone();
      let to_write = Arc::clone(&envelope);
      // A started write always completes, so the file never changes after a
      // cancelled sync has returned.
      let saved = tokio::task::spawn_blocking(move || store.save(&to_write))
         .await
         .map_err(|e| Error::Server { op: "save cache", reason: e.to_string() })?;
      if cancel.is_cancelled() {
         tracing::debug!("cancellation arrived during persist; completing the sync");
      }

      // The fetched data is good even if the shared file could not be written.
      self.install(Arc::clone(&envelope));
      let saved = saved?;

      let health = CacheHealth::of_envelope(&envelope, &policy, Utc::now());
      progress.report(1.0, SyncPhase::Done, None);
      self.publish_success(&envelope, health);

      tracing::info!(
         strategy = strategy.label(),
         dockets = envelope.dockets.len(),
         added = stats.added,
         updated = stats.updated,
         removed = stats.removed,
         fell_back,
         atomic = saved.atomic,
         "sync complete"
      );

      Ok(SyncOutcome {
         strategy,
         envelope,
         stats,
         fetched: fetch.dockets.len(),
         scopes_queried: fetch.scopes_queried,
         fell_back,
         saved: Some(saved),
         prior_health,
      })
   }

   async fn fetch(
      &self,
      strategy: &SyncStrategy,
      options: &SyncOptions,
      cancel: &CancellationToken,
      progress: &mut ProgressTracker<'_>,
   ) -> Result<FetchResult> {
      let request = fetch_request(strategy, &options.scope_hints);
      tracing::debug!(
         discovery = request.discovers(),
         scopes = request.scope.as_ref().map_or(0, Vec::len),
         "fetching from remote"
      );

      let mut on_progress = |fraction: f64, label: &str| progress.fetch(fraction, label);
      let pending = self.remote.fetch(&request, &mut on_progress);
      let bounded = async {
         match self.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
               Ok(result) => result,
               Err(_) => Err(RemoteError::Timeout { ms: limit.as_millis() as u64 }),
            },
            None => pending.await,
         }
      };

      tokio::select! {
         biased;
         () = cancel.cancelled() => Err(Error::Cancelled("fetch")),
         result = bounded => result.map_err(Error::from),
      }
   }

   fn finish_cached(
      &self,
      envelope: Arc<CacheEnvelope>,
      prior_health: CacheHealth,
      policy: &SyncPolicy,
      progress: &mut ProgressTracker<'_>,
   ) -> SyncOutcome {
      self.install(Arc::clone(&envelope));
      progress.report(1.0, SyncPhase::Done, None);
      self.publish_success(&envelope, CacheHealth::of_envelope(&envelope, policy, Utc::now()));
      tracing::debug!(dockets = envelope.dockets.len(), "cache reused without remote fetch");
      SyncOutcome {
         strategy: SyncStrategy::UseCacheAsIs,
         envelope,
         stats: MergeStats::default(),
         fetched: 0,
         scopes_queried: 0,
         fell_back: false,
         saved: None,
         prior_health,
      }
   }

   async fn read_state(&self) -> Result<CacheState> {
      let store = self.store.clone();
      let state = tokio::task::spawn_blocking(move || store.inspect())
         .await
         .map_err(|e| Error::Server { op: "load cache", reason: e.to_string() })??;
      if let CacheState::Corrupted(err) = &state {
         tracing::warn!("docket cache unusable, will regenerate: {err}");
      }
      Ok(state)
   }

   fn install(&self, envelope: Arc<CacheEnvelope>) {
      *self.snapshot.write() = Some(envelope);
   }

   fn publish_success(&self, envelope: &CacheEnvelope, health: CacheHealth) {
      self.status.send_modify(|s| {
         s.syncing = false;
         s.phase = SyncPhase::Done;
         s.progress = 1.0;
         s.last_sync = Some(envelope.last_sync);
         s.last_error = None;
         s.health = health;
         s.docket_count = envelope.dockets.len();
      });
   }

   /// Publishes a failed sync, keeping whatever envelope is already in memory.
   fn fail(&self, err: Error) -> Error {
      let count = self.snapshot.read().as_ref().map_or(0, |e| e.dockets.len());
      let cancelled = matches!(err, Error::Cancelled(_));
      if cancelled {
         tracing::debug!("{err}");
      } else {
         tracing::warn!("sync failed: {err}");
      }
      self.status.send_modify(|s| {
         s.syncing = false;
         s.docket_count = count;
         if cancelled {
            s.phase = SyncPhase::Idle;
         } else {
            s.phase = SyncPhase::Failed;
            s.last_error = Some(err.to_string());
         }
      });
      err
   }
}

fn fetch_request(strategy: &SyncStrategy, hints: &[String]) -> FetchRequest {
   match strategy {
      SyncStrategy::Incremental { modified_since, scope, force_discovery } => {
         let scope = scope.as_ref().map(|known| {
            let mut ids = known.clone();
            for hint in hints {
               if !ids.contains(hint) {
                  ids.push(hint.clone());
               }
            }
            ids
         });
         FetchRequest {
            scope,
            modified_since: Some(*modified_since),
            force_discovery: *force_discovery,
         }
      },
      SyncStrategy::Full { .. } | SyncStrategy::UseCacheAsIs => FetchRequest::full(),
   }
}

fn share_reachable(path: &Path) -> bool {
   path
      .parent()
      .is_none_or(|p| p.as_os_str().is_empty() || p.is_dir())
}

/// Clears the in-flight flag if a sync future is dropped mid-way.
struct InFlight<'a> {
   status: &'a watch::Sender<SyncStatus>,
}

impl Drop for InFlight<'_> {
   fn drop(&mut self) {
      self.status.send_if_modified(|s| {
         if !s.syncing {
            return false;
         }
         s.syncing = false;
         s.phase = SyncPhase::Idle;
         true
      });
   }
}

/// Forwards progress to the caller and the status channel, never going backwards.
struct ProgressTracker<'a> {
   status:     &'a watch::Sender<SyncStatus>,
   callback:   &'a mut dyn SyncProgressCallback,
   fraction:   f64,
   fetch_base: f64,
}

impl<'a> ProgressTracker<'a> {
   fn new(status: &'a watch::Sender<SyncStatus>, callback: &'a mut dyn SyncProgressCallback) -> Self {
      Self { status, callback, fraction: 0.0, fetch_base: FETCH_START }
   }

   fn report(&mut self, fraction: f64, phase: SyncPhase, message: Option<&str>) {
      let fraction = fraction.clamp(0.0, 1.0).max(self.fraction);
      self.fraction = fraction;
      self.status.send_modify(|s| {
         s.phase = phase;
         s.progress = fraction;
      });
      self.callback.progress(SyncProgress {
         fraction,
         phase,
         message: message.unwrap_or(phase.label()).to_string(),
      });
   }

   /// Starts a fetch window; a retried fetch continues from where the last stopped.
   fn begin_fetch(&mut self) {
      self.fetch_base = self.fraction.max(FETCH_START);
      self.report(self.fetch_base, SyncPhase::Fetching, None);
   }

   fn fetch(&mut self, fraction: f64, label: &str) {
      let span = (FETCH_END - self.fetch_base).max(0.0);
      let at = span.mul_add(fraction.clamp(0.0, 1.0), self.fetch_base);
      self.report(at, SyncPhase::Fetching, Some(label));
   }
}
