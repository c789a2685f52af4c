//! Cross-process mutual exclusion through lock files.
//!
//! A lock is a file created with `O_EXCL` semantics under the temp
//! directory. Whoever creates it owns the lock until the guard drops and the
//! file is removed. Everyone else polls with a short random back-off.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::Error;

/// Polling and staleness parameters.
#[derive(Clone, Copy, Debug)]
pub struct LockPolicy {
    /// Age after which an existing lock file is deleted.
    pub stale_after: Duration,
    /// Upper bound of the random sleep between attempts.
    pub max_backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self { stale_after: Duration::from_secs(30), max_backoff: Duration::from_micros(100) }
    }
}

/// A named lock file.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Lock `id` within `scope` (usually root directory plus base path).
    pub fn new(dir: impl AsRef<Path>, scope: &str, id: &str) -> Self {
        let name = format!("{}.{}.lock", hash(scope), hash(id));
        Self { path: dir.as_ref().join(name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the lock is held. Returns `None` if `aborted` reports a
    /// client disconnect first.
    pub fn acquire(
        &self,
        policy: &LockPolicy,
        aborted: impl Fn() -> bool,
    ) -> Result<Option<LockGuard>, Error> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(file) => {
                    debug!(lock = %self.path.display(), "lock acquired");
                    return Ok(Some(LockGuard { path: self.path.clone(), _file: file }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
            if aborted() {
                debug!(lock = %self.path.display(), "client gone while waiting for lock");
                return Ok(None);
            }
            if self.is_stale(policy.stale_after) {
                warn!(lock = %self.path.display(), "removing stale lock");
                let _ = fs::remove_file(&self.path);
                continue;
            }
            let ceiling = policy.max_backoff.as_micros().max(1) as u64;
            std::thread::sleep(Duration::from_micros(fastrand::u64(0..ceiling)));
        }
    }

    fn is_stale(&self, limit: Duration) -> bool {
        fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .is_some_and(|age| age > limit)
    }
}

/// Holds a lock; dropping it deletes the lock file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    _file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), "could not release lock: {e}");
        }
    }
}

/// Short, filename-safe digest: the low 64 bits of SHA-1 in base 36,
/// zero-padded to 11 characters.
pub fn hash(s: &str) -> String {
    let digest = Sha1::digest(s.as_bytes());
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[12..20]);
    let mut n = u64::from_be_bytes(low);

    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::with_capacity(13);
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    while out.len() < 11 {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn hash_is_stable_and_padded() {
        let a = hash("/srv/app");
        assert_eq!(a, hash("/srv/app"));
        assert_ne!(a, hash("/srv/other"));
        assert!(a.len() >= 11);
        assert!(a.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
    }

    #[test]
    fn guard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "scope", "job");
        let guard = lock.acquire(&LockPolicy::default(), || false).unwrap().unwrap();
        assert!(lock.path().exists());
        drop(guard);
        assert!(!lock.path().exists());
    }

    #[test]
    fn holders_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let dir = dir.path().to_owned();
                let (inside, peak) = (Arc::clone(&inside), Arc::clone(&peak));
                std::thread::spawn(move || {
                    let lock = FileLock::new(&dir, "scope", "counter");
                    for _ in 0..5 {
                        let _guard = lock.acquire(&LockPolicy::default(), || false).unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "scope", "stuck");
        fs::write(lock.path(), b"").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let policy = LockPolicy { stale_after: Duration::from_millis(10), ..LockPolicy::default() };
        assert!(lock.acquire(&policy, || false).unwrap().is_some());
    }

    #[test]
    fn gives_up_when_client_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLock::new(dir.path(), "scope", "busy");
        let _held = lock.acquire(&LockPolicy::default(), || false).unwrap();
        assert!(lock.acquire(&LockPolicy::default(), || true).unwrap().is_none());
    }
}
