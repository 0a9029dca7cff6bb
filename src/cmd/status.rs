//! Status command.
//!
//! Reports on cache health using structured checks, without contacting the remote.

use std::path::PathBuf;

use chrono::Utc;
use console::style;
use serde::Serialize;

use crate::{
   Result, config,
   decision::{self, SyncStrategy},
   status::CacheHealth,
   store::{CacheState, CacheStore},
   util::{file_size, format_age, format_size},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
   Ok,
   Warn,
   Fail,
}

impl Severity {
   const fn as_str(self) -> &'static str {
      match self {
         Self::Ok => "ok",
         Self::Warn => "warn",
         Self::Fail => "fail",
      }
   }
}

#[derive(Serialize)]
struct HealthCheck {
   code:     String,
   severity: String,
   message:  String,
}

#[derive(Serialize)]
struct StatusJson {
   schema_version: u32,
   cache_path:     String,
   ok:             bool,
   health:         CacheHealth,
   next_sync:      String,
   checks:         Vec<HealthCheck>,
}

pub fn execute(json: bool, cache: Option<PathBuf>) -> Result<()> {
   let store = super::open_store(cache);
   let payload = collect_status(&store);

   if json {
      println!("{}", serde_json::to_string_pretty(&payload)?);
      return Ok(());
   }

   println!("{}", style("docketsync Status").bold());
   println!("{}", style(&payload.cache_path).dim());
   for check in &payload.checks {
      let symbol = match check.severity.as_str() {
         "ok" => style("✓").green(),
         "warn" => style("○").yellow(),
         _ => style("✗").red(),
      };
      println!("{} {} - {}", symbol, check.code, check.message);
   }
   println!("\nNext sync: {}", payload.next_sync);

   if payload.ok {
      println!("\n{}", style("✓ Cache is usable.").green().bold());
   } else {
      println!("\n{}", style("✗ Cache needs attention.").red().bold());
   }
   Ok(())
}

fn collect_status(store: &CacheStore) -> StatusJson {
   let cfg = config::get();
   let policy = cfg.policy();
   let now = Utc::now();
   let path = store.path();

   let mut checks = Vec::new();
   let mut ok = true;

   match cfg.validate() {
      Ok(()) => push_check(&mut checks, &mut ok, "config", Severity::Ok, "configuration valid"),
      Err(e) => push_check(&mut checks, &mut ok, "config", Severity::Fail, e.to_string()),
   }

   if cfg.remote_base_url.as_deref().is_some_and(|u| !u.trim().is_empty()) {
      push_check(&mut checks, &mut ok, "remote", Severity::Ok, "remote endpoint configured");
   } else {
      push_check(&mut checks, &mut ok, "remote", Severity::Warn, "no remote endpoint configured");
   }

   match path.parent().filter(|p| !p.as_os_str().is_empty()) {
      Some(parent) if !parent.is_dir() => push_check(
         &mut checks,
         &mut ok,
         "cache_location",
         Severity::Fail,
         format!("folder {} is not reachable", parent.display()),
      ),
      _ => push_check(&mut checks, &mut ok, "cache_location", Severity::Ok, "cache folder reachable"),
   }

   let state = match store.inspect() {
      Ok(state) => Some(state),
      Err(e) => {
         let message = if e.is_permission_denied() {
            format!("permission denied: {e}")
         } else {
            e.to_string()
         };
         push_check(&mut checks, &mut ok, "cache_file", Severity::Fail, message);
         None
      },
   };

   let Some(state) = state else {
      return StatusJson {
         schema_version: 1,
         cache_path: path.display().to_string(),
         ok,
         health: CacheHealth::Unknown,
         next_sync: "unknown (cache unreadable)".to_string(),
         checks,
      };
   };

   match &state {
      CacheState::Missing => {
         push_check(&mut checks, &mut ok, "cache_file", Severity::Warn, "no cache yet");
      },
      CacheState::Corrupted(err) => push_check(
         &mut checks,
         &mut ok,
         "cache_file",
         Severity::Fail,
         format!("{err}; run `docketsync repair` or sync to regenerate"),
      ),
      CacheState::Loaded(envelope) => {
         push_check(
            &mut checks,
            &mut ok,
            "cache_file",
            Severity::Ok,
            format!(
               "{} dockets, {}, synced {}",
               envelope.dockets.len(),
               format_size(file_size(path)),
               format_age(envelope.age(now))
            ),
         );
         let integrity = &envelope.integrity;
         let count = envelope.dockets.len();
         if integrity.appears_incomplete(count, policy.shrinkage_threshold) {
            push_check(
               &mut checks,
               &mut ok,
               "integrity",
               Severity::Warn,
               format!("{count} dockets against a peak of {}", integrity.effective_peak()),
            );
         } else {
            push_check(&mut checks, &mut ok, "integrity", Severity::Ok, "record count consistent");
         }
         let scope = integrity.scope_hint().map_or(0, <[String]>::len);
         push_check(
            &mut checks,
            &mut ok,
            "scope_hint",
            if scope == 0 { Severity::Warn } else { Severity::Ok },
            format!("{scope} docket-bearing projects known"),
         );
      },
   }

   let next_sync = match decision::decide(&state, &policy, now) {
      SyncStrategy::UseCacheAsIs => "none needed (cache fresh)".to_string(),
      SyncStrategy::Incremental { scope: Some(scope), .. } => {
         format!("incremental across {} projects", scope.len())
      },
      SyncStrategy::Incremental { scope: None, .. } => "incremental with discovery".to_string(),
      SyncStrategy::Full { reason } => format!("full ({reason})"),
   };

   StatusJson {
      schema_version: 1,
      cache_path: path.display().to_string(),
      ok,
      health: CacheHealth::assess(&state, &policy, now),
      next_sync,
      checks,
   }
}

fn push_check(
   checks: &mut Vec<HealthCheck>,
   ok: &mut bool,
   code: &str,
   severity: Severity,
   message: impl Into<String>,
) {
   if severity == Severity::Fail {
      *ok = false;
   }
   checks.push(HealthCheck {
      code:     code.to_string(),
      severity: severity.as_str().to_string(),
      message:  message.into(),
   });
}
