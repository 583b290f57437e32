use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

/// Slow-changing reference data kept in memory.
///
/// An entry is served while it is younger than the ttl and was loaded under
/// the current version. Bumping the version forces the next read to reload.
pub struct ReferenceCache<T> {
    ttl: Duration,
    version: AtomicU64,
    entry: RwLock<Option<Cached<T>>>,
}

struct Cached<T> {
    items: Arc<Vec<T>>,
    fetched_at: DateTime<Utc>,
    version: u64,
}

impl<T> Cached<T> {
    fn is_fresh(&self, now: DateTime<Utc>, version: u64, ttl: Duration) -> bool {
        if self.version != version {
            return false;
        }
        match (now - self.fetched_at).to_std() {
            Ok(age) => age < ttl,
            // clock stepped backwards
            Err(_) => true,
        }
    }
}

impl<T: Send + Sync> ReferenceCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            version: AtomicU64::new(1),
            entry: RwLock::new(None),
        }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Returns the new version.
    pub fn invalidate(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn get_or_load<F, Fut, E>(
        &self,
        now: DateTime<Utc>,
        load: F,
    ) -> Result<(u64, Arc<Vec<T>>), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        let version = self.version();
        if let Some(cached) = self.entry.read().await.as_ref() {
            if cached.is_fresh(now, version, self.ttl) {
                return Ok((cached.version, Arc::clone(&cached.items)));
            }
        }

        let mut entry = self.entry.write().await;
        // another reader may have refreshed it while we waited
        if let Some(cached) = entry.as_ref() {
            if cached.is_fresh(now, version, self.ttl) {
                return Ok((cached.version, Arc::clone(&cached.items)));
            }
        }

        let items = Arc::new(load().await?);
        debug!(version, count = items.len(), "reference data reloaded");
        *entry = Some(Cached {
            items: Arc::clone(&items),
            fetched_at: now,
            version,
        });
        Ok((version, items))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    async fn read(
        cache: &ReferenceCache<&'static str>,
        now: DateTime<Utc>,
        loads: &AtomicUsize,
    ) -> (u64, Vec<&'static str>) {
        let (version, items) = cache
            .get_or_load(now, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(vec!["OSG", "Nachi"])
            })
            .await
            .unwrap();
        (version, items.to_vec())
    }

    #[tokio::test]
    async fn fresh_entry_is_reused_until_ttl() {
        let cache = ReferenceCache::new(Duration::from_secs(60));
        let loads = AtomicUsize::new(0);
        let start = Utc::now();

        assert_eq!(read(&cache, start, &loads).await, (1, vec!["OSG", "Nachi"]));
        read(&cache, start + chrono::Duration::seconds(59), &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        read(&cache, start + chrono::Duration::seconds(61), &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_busts_a_fresh_entry() {
        let cache = ReferenceCache::new(Duration::from_secs(3600));
        let loads = AtomicUsize::new(0);
        let now = Utc::now();

        read(&cache, now, &loads).await;
        assert_eq!(cache.invalidate(), 2);

        let (version, _) = read(&cache, now, &loads).await;
        assert_eq!(version, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let cache: ReferenceCache<&'static str> = ReferenceCache::new(Duration::from_secs(60));
        let now = Utc::now();

        let err = cache
            .get_or_load(now, || async { Err::<Vec<&'static str>, _>("offline") })
            .await
            .unwrap_err();
        assert_eq!(err, "offline");

        let loads = AtomicUsize::new(0);
        read(&cache, now, &loads).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
