use std::{io, path::PathBuf};

use thiserror::Error;

/// Main error type for docketsync.
///
/// Covers cache I/O and corruption, remote fetch failures, configuration
/// problems, and operational failures raised by the sync orchestrator.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file or network operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// The shared cache file could not be read, written, or decoded.
   #[error("cache error: {0}")]
   Cache(#[from] CacheError),

   /// The remote project-management API could not satisfy a fetch.
   #[error("remote error: {0}")]
   Remote(#[from] RemoteError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// Operational failure during a specific operation.
   #[error("server error during {op}: {reason}")]
   Server { op: &'static str, reason: String },

   /// The sync was abandoned by its caller before completing.
   #[error("sync cancelled during {0}")]
   Cancelled(&'static str),

   /// Error already reported to the user (e.g., JSON output emitted).
   #[error("{message}")]
   Reported { message: String, exit_code: i32 },
}

impl Error {
   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Reported { exit_code, .. } => *exit_code,
         Self::Remote(RemoteError::Timeout { .. }) => 11,
         Self::Cancelled(_) => 12,
         Self::Cache(err) if err.is_corruption() => 14,
         Self::Remote(_) => 15,
         _ => 1,
      }
   }

   /// Whether the failure came from the remote fetch rather than local state.
   pub const fn is_remote(&self) -> bool {
      matches!(self, Self::Remote(_))
   }
}

/// Errors raised while reading or writing the shared cache envelope.
///
/// Every variant carries the resolved path so an operator can tell "not yet
/// created" apart from "corrupted" apart from "permission denied".
#[derive(Debug, Error)]
pub enum CacheError {
   /// A directory exists where the cache file is expected.
   #[error("cache path is a directory: {path}", path = .path.display())]
   IsDirectory { path: PathBuf },

   /// The cache file exists but holds zero bytes.
   #[error("cache file is empty (0 bytes): {path}", path = .path.display())]
   Empty { path: PathBuf },

   /// The cache file is not valid JSON.
   #[error("cache file is not valid JSON ({size} bytes) at {path}: {source}", path = .path.display())]
   InvalidJson {
      path:   PathBuf,
      size:   u64,
      #[source]
      source: serde_json::Error,
   },

   /// The cache file is JSON but does not match the envelope schema.
   #[error("cache file has wrong schema ({size} bytes) at {path}: {reason}", path = .path.display())]
   WrongSchema { path: PathBuf, size: u64, reason: String },

   /// Another application's cache occupies the location.
   #[error(
      "cache file at {path} looks like a different cache type (keys: {keys:?}, {size} bytes)",
      path = .path.display()
   )]
   ForeignCache { path: PathBuf, size: u64, keys: Vec<String> },

   /// The envelope was written by a newer schema than this build understands.
   #[error("cache schema version {found} at {path} is newer than supported {supported}", path = .path.display())]
   UnsupportedVersion { path: PathBuf, found: u32, supported: u32 },

   /// Reading the cache file failed.
   #[error("failed to read cache {path}: {source}", path = .path.display())]
   Read {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },

   /// Writing the cache file failed.
   #[error("failed to write cache {path}: {source}", path = .path.display())]
   Write {
      path:   PathBuf,
      #[source]
      source: io::Error,
   },
}

impl CacheError {
   /// Whether the file is present but unusable, as opposed to an I/O fault.
   pub const fn is_corruption(&self) -> bool {
      matches!(
         self,
         Self::IsDirectory { .. }
            | Self::Empty { .. }
            | Self::InvalidJson { .. }
            | Self::WrongSchema { .. }
            | Self::ForeignCache { .. }
            | Self::UnsupportedVersion { .. }
      )
   }

   /// Whether the underlying I/O error was a permission problem.
   pub fn is_permission_denied(&self) -> bool {
      match self {
         Self::Read { source, .. } | Self::Write { source, .. } => {
            source.kind() == io::ErrorKind::PermissionDenied
         },
         _ => false,
      }
   }
}

/// Errors reported by the remote fetch collaborator.
#[derive(Debug, Error)]
pub enum RemoteError {
   /// The remote is unreachable (network share or API down).
   #[error("remote unavailable: {0}")]
   Unavailable(String),

   /// The credential was rejected.
   #[error("remote rejected credentials")]
   Unauthorized,

   /// Received an unexpected HTTP status code.
   #[error("remote returned HTTP {status} for {url}")]
   HttpStatus { status: u16, url: String },

   /// HTTP request failed (network error, connection reset, etc.).
   #[error("request failed: {0}")]
   Request(#[from] reqwest::Error),

   /// The remote payload could not be decoded.
   #[error("failed to decode remote payload: {0}")]
   Decode(String),

   /// The fetch exceeded its time bound.
   #[error("remote fetch timed out after {ms} ms")]
   Timeout { ms: u64 },
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// A tunable is out of its allowed range.
   #[error("invalid config value for {field}: {reason}")]
   Invalid { field: &'static str, reason: String },

   /// No remote endpoint is configured.
   #[error("no remote endpoint configured; set remote_base_url or DOCKETSYNC_REMOTE_BASE_URL")]
   MissingRemote,
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
