//! TTL-bounded cache of evaluated module access.
//!
//! # Invariants
//! - Entries older than the TTL are never returned.
//! - `invalidate_principal` drops every entry of that principal.
//! - `clear` drops everything; callers use it after group, permission or
//!   schema mutations.

use crate::model::principal::{ModuleAccess, UserId};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_PERMISSION_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_PERMISSION_CAPACITY: usize = 1024;

type CacheKey = (UserId, String);

struct CachedAccess {
    access: ModuleAccess,
    stored_at: Instant,
}

/// Per `(principal id, module name)` access cache shared across requests.
pub struct PermissionCache {
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CachedAccess>>,
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_PERMISSION_TTL, DEFAULT_PERMISSION_CAPACITY)
    }
}

impl PermissionCache {
    /// A zero capacity is raised to one entry.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, user_id: UserId, module_name: &str) -> Option<ModuleAccess> {
        self.get_at(user_id, module_name, Instant::now())
    }

    pub fn put(&self, user_id: UserId, module_name: &str, access: ModuleAccess) {
        self.put_at(user_id, module_name, access, Instant::now());
    }

    pub fn invalidate_principal(&self, user_id: UserId) {
        let mut entries = self.lock();
        let doomed: Vec<CacheKey> = entries
            .iter()
            .filter(|((cached_user, _), _)| *cached_user == user_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        log::debug!(
            "event=permission_cache_invalidate module=access status=ok user_id={} dropped={}",
            user_id,
            doomed.len()
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
        log::debug!("event=permission_cache_clear module=access status=ok");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, user_id: UserId, module_name: &str, now: Instant) -> Option<ModuleAccess> {
        let key = (user_id, module_name.to_string());
        let mut entries = self.lock();
        let fresh = entries
            .get(&key)
            .map(|cached| (cached.access, now.saturating_duration_since(cached.stored_at) < self.ttl));
        match fresh {
            Some((access, true)) => Some(access),
            Some((_, false)) => {
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    fn put_at(&self, user_id: UserId, module_name: &str, access: ModuleAccess, now: Instant) {
        self.lock().put(
            (user_id, module_name.to_string()),
            CachedAccess {
                access,
                stored_at: now,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CachedAccess>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::PermissionCache;
    use crate::model::principal::ModuleAccess;
    use std::time::{Duration, Instant};

    #[test]
    fn entries_expire_after_ttl() {
        let cache = PermissionCache::new(Duration::from_secs(60), 16);
        let start = Instant::now();
        cache.put_at(7, "tickets", ModuleAccess::FULL, start);

        assert_eq!(
            cache.get_at(7, "tickets", start + Duration::from_secs(59)),
            Some(ModuleAccess::FULL)
        );
        assert_eq!(cache.get_at(7, "tickets", start + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_principal_keeps_other_principals() {
        let cache = PermissionCache::default();
        cache.put(1, "tickets", ModuleAccess::FULL);
        cache.put(1, "assets", ModuleAccess::NONE);
        cache.put(2, "tickets", ModuleAccess::FULL);

        cache.invalidate_principal(1);
        assert_eq!(cache.get(1, "tickets"), None);
        assert_eq!(cache.get(1, "assets"), None);
        assert_eq!(cache.get(2, "tickets"), Some(ModuleAccess::FULL));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = PermissionCache::new(Duration::from_secs(60), 2);
        cache.put(1, "a", ModuleAccess::FULL);
        cache.put(1, "b", ModuleAccess::FULL);
        let _ = cache.get(1, "a");
        cache.put(1, "c", ModuleAccess::FULL);

        assert!(cache.get(1, "a").is_some());
        assert!(cache.get(1, "b").is_none());
        assert_eq!(cache.len(), 2);
    }
}
