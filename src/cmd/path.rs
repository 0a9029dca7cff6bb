//! Prints the resolved cache and config locations.

use std::path::PathBuf;

use crate::{Result, config};

pub fn execute(cache: Option<PathBuf>) -> Result<()> {
   let store = super::open_store(cache);
   println!("cache:  {}", store.path().display());
   println!("config: {}", config::config_file_path().display());
   Ok(())
}
