//! Process-local replay-protection cache with a fixed TTL. Insertion is
//! atomic (check-and-set) so no two concurrent verifications can admit
//! the same nonce.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct NonceCache {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl NonceCache {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: Mutex::new(HashMap::new()), ttl }
    }

    /// Returns `true` if the nonce was newly admitted (not a replay).
    /// Performs the expiry check and the insertion under a single lock
    /// acquisition so there is no window for a concurrent duplicate.
    pub fn admit(&self, nonce: &str) -> bool {
        let mut seen = self.seen.lock();
        if let Some(seen_at) = seen.get(nonce) {
            if seen_at.elapsed() < self.ttl {
                return false;
            }
        }
        seen.insert(nonce.to_string(), Instant::now());
        true
    }

    /// Sweeps expired entries. Intended to be run periodically by a
    /// background task, never on the request path.
    pub fn sweep(&self) {
        let ttl = self.ttl;
        self.seen.lock().retain(|_, seen_at| seen_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_admission_succeeds_replay_is_rejected() {
        let cache = NonceCache::new(Duration::from_secs(300));
        assert!(cache.admit("n1"));
        assert!(!cache.admit("n1"));
    }

    #[test]
    fn expired_nonce_is_admitted_again() {
        let cache = NonceCache::new(Duration::from_millis(1));
        assert!(cache.admit("n1"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.admit("n1"));
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = NonceCache::new(Duration::from_millis(1));
        cache.admit("n1");
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert!(cache.is_empty());
    }
}
