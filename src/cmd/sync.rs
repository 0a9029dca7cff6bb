//! Sync command: bring the shared docket cache up to date.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
   Error, Result,
   decision::SyncStrategy,
   status::CacheHealth,
   sync::{SyncOptions, SyncOutcome},
   util::format_age,
};

#[derive(Serialize)]
struct SyncJson {
   schema_version: u32,
   ok:             bool,
   strategy:       Option<&'static str>,
   reason:         Option<String>,
   dockets:        usize,
   fetched:        usize,
   added:          usize,
   updated:        usize,
   removed:        usize,
   scopes_queried: usize,
   fell_back:      bool,
   atomic_write:   Option<bool>,
   last_sync:      Option<DateTime<Utc>>,
   cache_path:     String,
   error:          Option<String>,
}

pub async fn execute(full: bool, json: bool, cache: Option<PathBuf>) -> Result<()> {
   let engine = super::build_engine(cache)?;
   let cache_path = engine.store().path().display().to_string();
   let options = SyncOptions { force_full: full, ..SyncOptions::default() };

   let cancel = CancellationToken::new();
   let interrupt = {
      let cancel = cancel.clone();
      tokio::spawn(async move {
         if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
         }
      })
   };

   let result = if json {
      engine.sync_with_cancel(&options, &cancel, &mut ()).await
   } else {
      let mut pb = ProgressBar::new(1000);
      pb.set_style(
         ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent}%")
            .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("█▓░")),
      );
      pb.set_message("Checking cache");
      let result = engine.sync_with_cancel(&options, &cancel, &mut pb).await;
      pb.finish_and_clear();
      result
   };
   interrupt.abort();

   match result {
      Ok(outcome) if json => {
         let payload = success_json(&outcome, cache_path);
         println!("{}", serde_json::to_string_pretty(&payload)?);
         Ok(())
      },
      Ok(outcome) => {
         print_outcome(&outcome);
         Ok(())
      },
      Err(err) if json => {
         let status = engine.status();
         let payload = SyncJson {
            schema_version: 1,
            ok: false,
            strategy: None,
            reason: None,
            dockets: status.docket_count,
            fetched: 0,
            added: 0,
            updated: 0,
            removed: 0,
            scopes_queried: 0,
            fell_back: false,
            atomic_write: None,
            last_sync: status.last_sync,
            cache_path,
            error: Some(err.to_string()),
         };
         println!("{}", serde_json::to_string_pretty(&payload)?);
         Err(Error::Reported { message: err.to_string(), exit_code: err.exit_code() })
      },
      Err(err) => Err(err),
   }
}

fn full_reason(strategy: &SyncStrategy) -> Option<String> {
   match strategy {
      SyncStrategy::Full { reason } => Some(reason.to_string()),
      _ => None,
   }
}

fn success_json(outcome: &SyncOutcome, cache_path: String) -> SyncJson {
   SyncJson {
      schema_version: 1,
      ok: true,
      strategy: Some(outcome.strategy.label()),
      reason: full_reason(&outcome.strategy),
      dockets: outcome.dockets().len(),
      fetched: outcome.fetched,
      added: outcome.stats.added,
      updated: outcome.stats.updated,
      removed: outcome.stats.removed,
      scopes_queried: outcome.scopes_queried,
      fell_back: outcome.fell_back,
      atomic_write: outcome.saved.as_ref().map(|s| s.atomic),
      last_sync: Some(outcome.envelope.last_sync),
      cache_path,
      error: None,
   }
}

fn print_outcome(outcome: &SyncOutcome) {
   let count = outcome.dockets().len();
   if outcome.strategy == SyncStrategy::UseCacheAsIs {
      let age = format_age(Utc::now() - outcome.envelope.last_sync);
      println!("{}", style(format!("✓ Cache is fresh ({count} dockets, synced {age})")).green());
      return;
   }

   let stats = &outcome.stats;
   println!(
      "{}",
      style(format!(
         "✓ {} sync complete: {count} dockets (+{} ~{} -{})",
         outcome.strategy.label(),
         stats.added,
         stats.updated,
         stats.removed
      ))
      .green()
   );
   if let Some(reason) = full_reason(&outcome.strategy) {
      println!("  {}", style(format!("reason: {reason}")).dim());
   }
   if outcome.fell_back {
      println!("  {}", style("incremental fetch failed; recovered with full discovery").yellow());
   }
   if matches!(outcome.prior_health, CacheHealth::Corrupted { .. }) {
      println!("  {}", style("previous cache file was unreadable and has been regenerated").yellow());
   }
   if outcome.saved.as_ref().is_some_and(|s| !s.atomic) {
      println!(
         "  {}",
         style("volume does not support atomic replace; cache written directly").yellow()
      );
   }
   let integrity = outcome.integrity();
   if integrity.appears_incomplete(count, crate::config::get().shrinkage_threshold) {
      println!(
         "  {}",
         style(format!(
            "only {count} of {} previously seen dockets returned; next sync will be full \
             (run `docketsync repair --force` if the deletions are genuine)",
            integrity.effective_peak()
         ))
         .yellow()
      );
   }
}
