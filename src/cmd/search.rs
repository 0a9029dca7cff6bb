//! Search command over the cached docket set.

use std::path::PathBuf;

use console::style;

use crate::{
   Result,
   model::Docket,
   search::{self, SortOrder},
   sync::SyncOptions,
};

pub async fn execute(
   query: String,
   sort: SortOrder,
   limit: usize,
   sync: bool,
   json: bool,
   cache: Option<PathBuf>,
) -> Result<()> {
   let mut hits = if sync {
      let engine = super::build_engine(cache)?;
      engine.sync(&SyncOptions::default(), &mut ()).await?;
      engine.search(&query, sort)
   } else {
      let store = super::open_store(cache);
      let Some(envelope) = store.load()? else {
         if json {
            println!("[]");
         } else {
            eprintln!(
               "{}",
               style(format!("No cache at {}; run `docketsync sync` first.", store.path().display()))
                  .yellow()
            );
         }
         return Ok(());
      };
      search::search(&envelope.dockets, &query, sort)
   };

   let total = hits.len();
   if limit > 0 {
      hits.truncate(limit);
   }

   if json {
      println!("{}", serde_json::to_string_pretty(&hits)?);
      return Ok(());
   }

   if hits.is_empty() {
      println!("{}", style("No matching dockets.").dim());
      return Ok(());
   }
   for docket in &hits {
      print_docket(docket);
   }
   if total > hits.len() {
      println!("{}", style(format!("… {} more", total - hits.len())).dim());
   }
   Ok(())
}

fn print_docket(docket: &Docket) {
   let due = docket
      .due_date
      .map_or_else(|| "no due date".to_string(), |d| format!("due {d}"));
   let tags = if docket.tags.is_empty() {
      String::new()
   } else {
      format!(" [{}]", docket.tags.join(", "))
   };
   println!(
      "{}  {}  {}{}",
      style(&docket.number).cyan().bold(),
      docket.job_name,
      style(due).dim(),
      style(tags).dim()
   );
}
