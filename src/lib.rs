//! Shared-cache docket sync engine.
//!
//! Keeps a JSON cache of job records on a shared volume in step with a remote
//! project-management system, deciding per sync whether to reuse the cache,
//! merge an incremental fetch, or rebuild from a full discovery fetch.

pub mod cmd;
pub mod config;
pub mod decision;
pub mod error;
pub mod integrity;
pub mod merge;
pub mod model;
pub mod remote;
pub mod search;
pub mod status;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use model::{CacheEnvelope, Docket, Integrity};
pub use store::CacheStore;
pub use sync::{SyncEngine, SyncOptions, SyncOutcome};
