use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use catalog_proto::{Product, SessionKind};
use chrono::{DateTime, Utc};
use tokio::sync::MutexGuard;
use tracing::{debug, info};
use ulid::Ulid;

use crate::{
    collection::SledCollection,
    paginator::{Paginator, PaginatorError},
};

pub type ProductPaginator = Paginator<Product, Arc<SledCollection<Product>>>;

/// One browsing session: a paginator that at most one request drives at a
/// time.
pub struct Session {
    pub id: Ulid,
    pub kind: SessionKind,
    paginator: tokio::sync::Mutex<ProductPaginator>,
    touched_ms: AtomicI64,
}

impl Session {
    /// Fails with [`PaginatorError::Busy`] while another request holds it.
    pub fn lock(&self) -> Result<MutexGuard<'_, ProductPaginator>, PaginatorError> {
        self.paginator.try_lock().map_err(|_| {
            debug!(session = %self.id, "rejected overlapping request");
            PaginatorError::Busy
        })
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.touched_ms
            .store(now.timestamp_millis(), Ordering::Relaxed);
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let idle = now.timestamp_millis() - self.touched_ms.load(Ordering::Relaxed);
        Duration::from_millis(idle.max(0) as u64)
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<Ulid, Arc<Session>>>,
    idle: Duration,
}

impl SessionStore {
    pub fn new(idle: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle,
        }
    }

    pub fn open(
        &self,
        kind: SessionKind,
        paginator: ProductPaginator,
        now: DateTime<Utc>,
    ) -> Arc<Session> {
        self.prune(now);

        let session = Arc::new(Session {
            id: Ulid::new(),
            kind,
            paginator: tokio::sync::Mutex::new(paginator),
            touched_ms: AtomicI64::new(now.timestamp_millis()),
        });
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.id, Arc::clone(&session));
        info!(session = %session.id, ?kind, open = self.len(), "session opened");
        session
    }

    pub fn get(&self, id: &Ulid, now: DateTime<Utc>) -> Option<Arc<Session>> {
        let session = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()?;
        session.touch(now);
        Some(session)
    }

    pub fn close(&self, id: &Ulid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops sessions idle for longer than the configured limit, unless a
    /// request is still running on them.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.idle_for(now) <= self.idle || session.paginator.try_lock().is_err()
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "idle sessions dropped");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use catalog_proto::record::Direction;

    use super::*;
    use crate::{paginator::PaginatorConfig, storage::StorageEngine};

    fn paginator(storage: &StorageEngine) -> ProductPaginator {
        let products = SledCollection::<Product>::open(storage, "products").unwrap();
        Paginator::new(
            Arc::new(products),
            PaginatorConfig {
                page_size: 10,
                scan_batch_size: 100,
                direction: Direction::Ascending,
            },
        )
    }

    #[tokio::test]
    async fn second_request_is_rejected_while_first_runs() {
        let storage = StorageEngine::new_test().unwrap();
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.open(SessionKind::Catalog, paginator(&storage), Utc::now());

        let guard = session.lock().unwrap();
        assert!(matches!(session.lock(), Err(PaginatorError::Busy)));
        drop(guard);
        assert!(session.lock().is_ok());
    }

    #[tokio::test]
    async fn idle_sessions_are_pruned_unless_busy() {
        let storage = StorageEngine::new_test().unwrap();
        let store = SessionStore::new(Duration::from_secs(60));
        let start = Utc::now();

        let idle = store.open(SessionKind::Catalog, paginator(&storage), start);
        let busy = store.open(SessionKind::Admin, paginator(&storage), start);
        let _guard = busy.lock().unwrap();

        let later = start + chrono::Duration::seconds(30);
        let fresh = store.open(SessionKind::Catalog, paginator(&storage), later);
        assert_eq!(store.len(), 3);

        let much_later = start + chrono::Duration::seconds(120);
        assert!(store.get(&fresh.id, much_later - chrono::Duration::seconds(10)).is_some());
        assert_eq!(store.prune(much_later), 1);
        assert!(store.get(&idle.id, much_later).is_none());
        assert!(store.get(&busy.id, much_later).is_some());
        assert!(store.get(&fresh.id, much_later).is_some());

        assert!(store.close(&fresh.id));
        assert!(!store.close(&fresh.id));
    }
}
