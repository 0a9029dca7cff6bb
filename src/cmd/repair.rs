//! Repair command: discard an unusable cache so the next sync regenerates it.

use std::path::PathBuf;

use chrono::Utc;
use console::style;

use crate::{Result, config, status::CacheHealth, store::CacheState};

/// Executes the repair command.
///
/// Without `force` only a corrupted file is removed. `force` also discards a
/// suspect or healthy file, resetting the peak count and scope hint after a
/// genuine mass deletion on the remote.
pub fn execute(force: bool, cache: Option<PathBuf>) -> Result<()> {
   let store = super::open_store(cache);
   let state = store.inspect()?;
   let health = CacheHealth::assess(&state, &config::get().policy(), Utc::now());
   let path = store.path().display();

   let remove = match (&state, &health) {
      (CacheState::Missing, _) => {
         println!("{}", style(format!("No cache at {path}; nothing to repair.")).green());
         return Ok(());
      },
      (CacheState::Corrupted(err), _) => {
         println!("{}", style(format!("Cache is unreadable: {err}")).yellow());
         true
      },
      (_, CacheHealth::Suspect { count, peak }) if !force => {
         println!(
            "{}",
            style(format!(
               "Cache holds {count} dockets against a peak of {peak}. If the remote really lost \
                these records, rerun with --force to reset the cache history."
            ))
            .yellow()
         );
         false
      },
      _ if force => true,
      _ => {
         println!("{}", style("Cache is healthy; nothing to repair.").green());
         false
      },
   };

   if remove && store.remove()? {
      println!(
         "{}",
         style(format!("Removed {path}; the next sync will rebuild it from the remote.")).green()
      );
   }
   Ok(())
}
