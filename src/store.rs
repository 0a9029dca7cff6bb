//! Shared cache file: location resolution, corruption-aware load, atomic save.
//!
//! The file lives on a volume shared by every user's instance with no lock
//! service, so writers only ever replace the whole file. Readers see either
//! the previous envelope or the new one, never a partial write.

use std::{
   fs::{self, File},
   io::{self, Write},
   path::{Path, PathBuf},
   time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
   error::CacheError,
   model::{CacheEnvelope, Docket, ENVELOPE_SCHEMA_VERSION},
   util::{fail_point, fsync_dir},
};

/// Well-known cache file name appended to directory-like locations.
pub const CACHE_FILE_NAME: &str = "docket_cache.json";

/// Top-level keys of other caches that are known to share the same folder.
const FOREIGN_CACHE_KEYS: &[&str] = &["projects", "files", "metadata", "sessions", "media"];

/// Temp files older than this are leftovers from crashed writers.
const STALE_TEMP_TTL: Duration = Duration::from_secs(60 * 60);

/// Resolves a user-supplied location to the cache file path.
///
/// A folder (or anything without an extension) gets the well-known name
/// appended; a path already naming that file is kept; any other file is
/// replaced by the well-known name in its parent folder.
pub fn resolve_cache_path(configured: &Path) -> PathBuf {
   if configured.is_dir() || configured.extension().is_none() {
      return configured.join(CACHE_FILE_NAME);
   }
   if configured.file_name().and_then(|n| n.to_str()) == Some(CACHE_FILE_NAME) {
      return configured.to_path_buf();
   }
   configured
      .parent()
      .map_or_else(|| PathBuf::from(CACHE_FILE_NAME), |p| p.join(CACHE_FILE_NAME))
}

/// Outcome of reading the cache location, for health reporting.
#[derive(Debug)]
pub enum CacheState {
   Missing,
   Corrupted(CacheError),
   Loaded(CacheEnvelope),
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
   pub path:   PathBuf,
   pub bytes:  u64,
   /// False when the volume refused the rename and a direct write was used.
   pub atomic: bool,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
   path: PathBuf,
}

impl CacheStore {
   /// Creates a store for the given location, applying the resolution rule.
   pub fn new(location: impl AsRef<Path>) -> Self {
      Self { path: resolve_cache_path(location.as_ref()) }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   /// Reads the envelope; `Ok(None)` means no cache has been written yet.
   pub fn load(&self) -> Result<Option<CacheEnvelope>, CacheError> {
      let path = &self.path;
      let metadata = match fs::metadata(path) {
         Ok(m) => m,
         Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
         Err(source) => return Err(CacheError::Read { path: path.clone(), source }),
      };
      if metadata.is_dir() {
         return Err(CacheError::IsDirectory { path: path.clone() });
      }

      let raw = fs::read(path).map_err(|source| CacheError::Read { path: path.clone(), source })?;
      let size = raw.len() as u64;
      if raw.iter().all(u8::is_ascii_whitespace) {
         return Err(CacheError::Empty { path: path.clone() });
      }

      let value: Value = serde_json::from_slice(&raw)
         .map_err(|source| CacheError::InvalidJson { path: path.clone(), size, source })?;
      let mtime = metadata.modified().map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
      let envelope = decode_envelope(path, size, value, mtime)?;

      tracing::debug!(
         path = %path.display(),
         size,
         dockets = envelope.dockets.len(),
         "loaded docket cache"
      );
      Ok(Some(envelope))
   }

   /// Reads the location and folds corruption into a [`CacheState`].
   ///
   /// Plain I/O faults (permission denied and the like) stay errors.
   pub fn inspect(&self) -> Result<CacheState, CacheError> {
      match self.load() {
         Ok(Some(envelope)) => Ok(CacheState::Loaded(envelope)),
         Ok(None) => Ok(CacheState::Missing),
         Err(err) if err.is_corruption() => Ok(CacheState::Corrupted(err)),
         Err(err) => Err(err),
      }
   }

   /// Writes the envelope, replacing any previous file in one step.
   pub fn save(&self, envelope: &CacheEnvelope) -> Result<SaveReport, CacheError> {
      let path = &self.path;
      if path.is_dir() {
         return Err(CacheError::IsDirectory { path: path.clone() });
      }
      let write_err = |source: io::Error| CacheError::Write { path: path.clone(), source };

      let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
      if let Some(parent) = parent {
         fs::create_dir_all(parent).map_err(write_err)?;
      }

      let data = serde_json::to_vec_pretty(envelope)
         .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
      let bytes = data.len() as u64;

      let atomic = match self.write_via_rename(&data) {
         Ok(()) => true,
         Err(e) if atomic_replace_unsupported(&e) => {
            tracing::warn!(
               path = %path.display(),
               "atomic replace unsupported on this volume ({e}); falling back to direct write"
            );
            write_direct(path, &data).map_err(write_err)?;
            false
         },
         Err(e) => return Err(write_err(e)),
      };

      if let Some(parent) = parent {
         if let Err(e) = fsync_dir(parent) {
            tracing::debug!("directory fsync skipped for {}: {e}", parent.display());
         }
         self.sweep_stale_temps(parent);
      }

      tracing::debug!(path = %path.display(), bytes, atomic, "saved docket cache");
      Ok(SaveReport { path: path.clone(), bytes, atomic })
   }

   /// Deletes the cache file so the next sync regenerates it.
   ///
   /// Returns whether a file was removed.
   pub fn remove(&self) -> Result<bool, CacheError> {
      let path = &self.path;
      if path.is_dir() {
         return Err(CacheError::IsDirectory { path: path.clone() });
      }
      match fs::remove_file(path) {
         Ok(()) => {
            tracing::info!(path = %path.display(), "removed docket cache");
            Ok(true)
         },
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
         Err(source) => Err(CacheError::Write { path: path.clone(), source }),
      }
   }

   fn write_via_rename(&self, data: &[u8]) -> io::Result<()> {
      let tmp_path = self.temp_path();
      let result = (|| {
         {
            let mut file = File::create(&tmp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
         }
         fail_point("store.before_rename")?;
         fs::rename(&tmp_path, &self.path)
      })();
      if result.is_err() {
         let _ = fs::remove_file(&tmp_path);
      }
      result
   }

   /// Per-writer temp file so concurrent processes never share one.
   fn temp_path(&self) -> PathBuf {
      let name = self
         .path
         .file_name()
         .and_then(|n| n.to_str())
         .unwrap_or(CACHE_FILE_NAME);
      self
         .path
         .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
   }

   fn sweep_stale_temps(&self, dir: &Path) {
      let Some(name) = self.path.file_name().and_then(|n| n.to_str()) else {
         return;
      };
      let prefix = format!(".{name}.");
      let Ok(entries) = fs::read_dir(dir) else {
         return;
      };
      let now = SystemTime::now();
      for entry in entries.flatten() {
         let file_name = entry.file_name();
         let Some(file_name) = file_name.to_str() else {
            continue;
         };
         if !file_name.starts_with(&prefix) || !file_name.ends_with(".tmp") {
            continue;
         }
         let mtime = entry.metadata().and_then(|m| m.modified()).unwrap_or(now);
         if now.duration_since(mtime).unwrap_or_default() > STALE_TEMP_TTL {
            let _ = fs::remove_file(entry.path());
         }
      }
   }
}

fn atomic_replace_unsupported(err: &io::Error) -> bool {
   matches!(
      err.kind(),
      io::ErrorKind::CrossesDevices
         | io::ErrorKind::Unsupported
         | io::ErrorKind::PermissionDenied
         | io::ErrorKind::ResourceBusy
   )
}

fn write_direct(path: &Path, data: &[u8]) -> io::Result<()> {
   let mut file = File::create(path)?;
   file.write_all(data)?;
   file.sync_all()
}

fn decode_envelope(
   path: &Path,
   size: u64,
   value: Value,
   mtime: DateTime<Utc>,
) -> Result<CacheEnvelope, CacheError> {
   let wrong_schema = |reason: String| CacheError::WrongSchema { path: path.to_path_buf(), size, reason };

   match value {
      Value::Array(_) => {
         let dockets: Vec<Docket> =
            serde_json::from_value(value).map_err(|e| wrong_schema(e.to_string()))?;
         tracing::info!(
            path = %path.display(),
            "migrating legacy docket array ({} records) into envelope",
            dockets.len()
         );
         Ok(CacheEnvelope::from_legacy(dockets, mtime))
      },
      Value::Object(ref map) => {
         if !map.contains_key("dockets") {
            let keys: Vec<String> = FOREIGN_CACHE_KEYS
               .iter()
               .filter(|k| map.contains_key(**k))
               .map(|k| (*k).to_string())
               .collect();
            if !keys.is_empty() {
               return Err(CacheError::ForeignCache { path: path.to_path_buf(), size, keys });
            }
            return Err(wrong_schema("missing top-level key `dockets`".to_string()));
         }
         if let Some(found) = map.get("schemaVersion").and_then(Value::as_u64) {
            if found > u64::from(ENVELOPE_SCHEMA_VERSION) {
               return Err(CacheError::UnsupportedVersion {
                  path: path.to_path_buf(),
                  found: found.min(u64::from(u32::MAX)) as u32,
                  supported: ENVELOPE_SCHEMA_VERSION,
               });
            }
         }
         let envelope: CacheEnvelope =
            serde_json::from_value(value).map_err(|e| wrong_schema(e.to_string()))?;
         Ok(envelope.migrate())
      },
      other => Err(wrong_schema(format!("expected a JSON object, found {}", json_kind(&other)))),
   }
}

const fn json_kind(value: &Value) -> &'static str {
   match value {
      Value::Null => "null",
      Value::Bool(_) => "a boolean",
      Value::Number(_) => "a number",
      Value::String(_) => "a string",
      Value::Array(_) => "an array",
      Value::Object(_) => "an object",
   }
}
