//! CLI command implementations for docketsync.
//!
//! Each module corresponds to a subcommand of the `docketsync` binary.

pub mod path;
pub mod repair;
pub mod search;
pub mod status;
pub mod sync;

use std::{fs, path::PathBuf};

use crate::{Result, config, remote::HttpFetcher, store::CacheStore, sync::SyncEngine};

/// Cache store for `--cache`, or the configured location when absent.
pub(crate) fn open_store(cache: Option<PathBuf>) -> CacheStore {
   if let Some(location) = cache {
      return CacheStore::new(location);
   }
   let cfg = config::get();
   if cfg.cache_path.is_none() {
      // Only the local default is created here; a shared volume must already be mounted.
      let _ = fs::create_dir_all(config::data_dir());
   }
   CacheStore::new(cfg.effective_cache_path())
}

/// Sync engine wired to the configured remote endpoint.
pub(crate) fn build_engine(cache: Option<PathBuf>) -> Result<SyncEngine<HttpFetcher>> {
   let cfg = config::get();
   cfg.validate()?;
   let fetcher = HttpFetcher::from_config(cfg)?;
   Ok(SyncEngine::new(open_store(cache), fetcher, cfg.policy()).with_fetch_timeout(cfg.sync_timeout()))
}
