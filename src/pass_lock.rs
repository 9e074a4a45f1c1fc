//! Reconciliation-pass mutual exclusion.
//!
//! A lock file under the data directory ensures a single pass per index at
//! a time. A second pass is rejected outright rather than queued:
//! interleaving two passes could violate the one-upload-per-fingerprint
//! guarantee. Locks left behind by a dead process are detected via pid
//! liveness plus a TTL and reclaimed.

use std::{
   fs::{self, File, OpenOptions},
   io::Write,
   path::{Path, PathBuf},
   time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{Result, config, error::Error};

#[derive(Debug)]
pub struct PassLock {
   path: PathBuf,
}

impl PassLock {
   /// Acquires the pass lock, or fails with [`Error::PassLocked`] when a
   /// live pass already holds it.
   pub fn acquire() -> Result<Self> {
      Self::acquire_at(&config::locks_dir(), Duration::from_millis(config::get().pass_lock_ttl_ms))
   }

   pub fn acquire_at(lock_dir: &Path, ttl: Duration) -> Result<Self> {
      fs::create_dir_all(lock_dir).map_err(Error::PassLockAcquire)?;
      let path = lock_dir.join("reconcile.lock");

      loop {
         match OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(mut file) => {
               let _ = write_lock_metadata(&mut file);
               let _ = file.sync_all();
               return Ok(Self { path });
            },
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
               if is_stale_lock(&path, ttl) {
                  let _ = fs::remove_file(&path);
                  continue;
               }
               return Err(Error::PassLocked { holder: read_pid(&path).unwrap_or(0) });
            },
            Err(e) => return Err(Error::PassLockAcquire(e)),
         }
      }
   }
}

impl Drop for PassLock {
   fn drop(&mut self) {
      let _ = fs::remove_file(&self.path);
   }
}

fn write_lock_metadata(file: &mut File) -> std::io::Result<()> {
   let pid = std::process::id();
   let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_millis();
   writeln!(file, "pid={pid}")?;
   writeln!(file, "started_at_ms={now}")?;
   Ok(())
}

fn is_stale_lock(path: &Path, ttl: Duration) -> bool {
   let age = match fs::metadata(path).and_then(|m| m.modified()) {
      Ok(mtime) => SystemTime::now()
         .duration_since(mtime)
         .unwrap_or(Duration::MAX),
      Err(_) => Duration::MAX,
   };

   let pid = read_pid(path);
   if let Some(pid) = pid {
      if pid_is_alive(pid) {
         return false;
      }
   }

   age > ttl
}

fn read_pid(path: &Path) -> Option<u32> {
   let content = fs::read_to_string(path).ok()?;
   for line in content.lines() {
      if let Some(rest) = line.strip_prefix("pid=") {
         if let Ok(pid) = rest.trim().parse::<u32>() {
            return Some(pid);
         }
      }
   }
   None
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
   let pid = pid as libc::pid_t;
   let rc = unsafe { libc::kill(pid, 0) };
   rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
   false
}
