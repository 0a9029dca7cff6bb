//! Utility functions for filesystem operations

use std::{fs, io, path::Path};

use crate::Result;

/// Flushes directory metadata so a completed rename survives a crash.
#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> Result<()> {
   let file = fs::File::open(dir)?;
   file.sync_all()?;
   Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> Result<()> {
   Ok(())
}

/// Named crash-injection hook; a no-op unless built with `failpoints`.
///
/// `return` injects a generic failure. `return(unsupported)`,
/// `return(cross_device)` and `return(denied)` inject the matching I/O error
/// kind.
#[cfg(feature = "failpoints")]
pub fn fail_point(name: &str) -> io::Result<()> {
   fail::fail_point!(name, |arg: Option<String>| {
      let kind = match arg.as_deref() {
         Some("unsupported") => io::ErrorKind::Unsupported,
         Some("cross_device") => io::ErrorKind::CrossesDevices,
         Some("denied") => io::ErrorKind::PermissionDenied,
         _ => io::ErrorKind::Other,
      };
      Err(io::Error::new(kind, format!("failpoint {name} triggered")))
   });
   Ok(())
}

#[cfg(not(feature = "failpoints"))]
#[inline]
pub fn fail_point(_name: &str) -> io::Result<()> {
   Ok(())
}

/// Size of a file in bytes, or zero if it cannot be stat'ed.
pub fn file_size(path: &Path) -> u64 {
   fs::metadata(path).map_or(0, |m| m.len())
}

/// Formats a byte count as a human-readable size string
pub fn format_size(bytes: u64) -> String {
   const KB: u64 = 1024;
   const MB: u64 = KB * 1024;
   const GB: u64 = MB * 1024;

   if bytes < KB {
      format!("{bytes} B")
   } else if bytes < MB {
      format!("{:.1} KB", bytes as f64 / KB as f64)
   } else if bytes < GB {
      format!("{:.1} MB", bytes as f64 / MB as f64)
   } else {
      format!("{:.1} GB", bytes as f64 / GB as f64)
   }
}

/// Formats a duration as a coarse "N units ago" string.
pub fn format_age(age: chrono::Duration) -> String {
   let secs = age.num_seconds().max(0);
   if secs < 60 {
      "just now".to_string()
   } else if secs < 3600 {
      format!("{} min ago", secs / 60)
   } else if secs < 86_400 {
      format!("{} h ago", secs / 3600)
   } else {
      format!("{} d ago", secs / 86_400)
   }
}
