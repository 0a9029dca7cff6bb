//! Remote project-management fetch capability.
//!
//! The sync engine only depends on [`RemoteFetcher`]; authentication and
//! transport live behind it.

pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use self::http::HttpFetcher;
use crate::{error::RemoteError, integrity::ScopeReport, model::Docket};

/// What to fetch for one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
   /// Containers known to hold dockets; ignored when discovering.
   pub scope:           Option<Vec<String>>,
   /// Only return records modified after this instant.
   pub modified_since:  Option<DateTime<Utc>>,
   pub force_discovery: bool,
}

impl FetchRequest {
   /// Full fetch across every container.
   pub const fn full() -> Self {
      Self { scope: None, modified_since: None, force_discovery: true }
   }

   /// Whether this request must scan every container.
   pub fn discovers(&self) -> bool {
      self.force_discovery || self.scope.as_ref().is_none_or(Vec::is_empty)
   }
}

/// Records returned by a fetch plus where they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
   pub dockets:           Vec<Docket>,
   /// Containers queried, or for discovery, the containers found to hold dockets.
   pub queried_scope_ids: Vec<String>,
   pub scopes_queried:    usize,
   pub was_discovery:     bool,
}

impl FetchResult {
   pub fn scope_report(&self) -> ScopeReport {
      ScopeReport {
         queried_scope_ids: self.queried_scope_ids.clone(),
         was_discovery:     self.was_discovery,
      }
   }
}

/// Progress sink for a fetch: fraction in `0.0..=1.0` and a phase label.
pub type FetchProgress<'a> = dyn FnMut(f64, &str) + Send + 'a;

/// Executes incremental or full queries against the remote system.
///
/// Implementations must be safe to retry: the orchestrator re-issues a failed
/// incremental fetch as a full discovery fetch.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
   async fn fetch(
      &self,
      request: &FetchRequest,
      on_progress: &mut FetchProgress<'_>,
   ) -> Result<FetchResult, RemoteError>;
}

#[async_trait]
impl<T: RemoteFetcher + ?Sized> RemoteFetcher for std::sync::Arc<T> {
   async fn fetch(
      &self,
      request: &FetchRequest,
      on_progress: &mut FetchProgress<'_>,
   ) -> Result<FetchResult, RemoteError> {
      (**self).fetch(request, on_progress).await
   }
}
