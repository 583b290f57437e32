use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use catalog_proto::{
    record::{Direction, Record},
    BatchReport,
};
use ulid::{Generator, Ulid};

use crate::{
    query::{fetch_records, FetchRecordQuery, FetchRecordResult, Key},
    storage::{BatchError, StorageEngine, WriteOp},
};

#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("cursor was taken {cursor:?} but the query scans {query:?}")]
    CursorMismatch { cursor: Direction, query: Direction },

    #[error("id generator exhausted for this millisecond")]
    IdExhausted,

    #[error("collection unavailable: {0}")]
    Unavailable(String),
}

/// An ordered document collection that only supports forward cursor scans
/// and single-document writes.
#[async_trait]
pub trait Collection<T: Record>: Send + Sync {
    async fn fetch(&self, query: FetchRecordQuery)
        -> Result<FetchRecordResult<T>, CollectionError>;

    async fn get(&self, id: &T::ID) -> Result<Option<T>, CollectionError>;

    /// Inserts or replaces the record with the same id.
    async fn put(&self, record: &T) -> Result<(), CollectionError>;

    /// Returns whether the record existed.
    async fn remove(&self, id: &T::ID) -> Result<bool, CollectionError>;
}

#[async_trait]
impl<T: Record, C: Collection<T> + ?Sized> Collection<T> for Arc<C> {
    async fn fetch(
        &self,
        query: FetchRecordQuery,
    ) -> Result<FetchRecordResult<T>, CollectionError> {
        (**self).fetch(query).await
    }

    async fn get(&self, id: &T::ID) -> Result<Option<T>, CollectionError> {
        (**self).get(id).await
    }

    async fn put(&self, record: &T) -> Result<(), CollectionError> {
        (**self).put(record).await
    }

    async fn remove(&self, id: &T::ID) -> Result<bool, CollectionError> {
        (**self).remove(id).await
    }
}

/// Reads the whole collection in `batch` sized scans.
pub async fn collect_all<T: Record, C: Collection<T> + ?Sized>(
    collection: &C,
    order: Direction,
    batch: usize,
) -> Result<Vec<T>, CollectionError> {
    let mut records = Vec::new();
    let mut cursor = None;
    loop {
        let query = FetchRecordQuery::new()
            .cursor(cursor)
            .limit(batch)
            .order(order);
        let result = collection.fetch(query).await?;
        let more = result.more_records && !result.items.is_empty();
        cursor = result.last_cursor();
        records.extend(result.into_records());
        if !more {
            return Ok(records);
        }
    }
}

/// A collection stored in one sled tree, keyed by ULID.
pub struct SledCollection<T> {
    tree: sled::Tree,
    ids: Mutex<Generator>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record<ID = Ulid>> SledCollection<T> {
    pub fn open(storage: &StorageEngine, name: &str) -> anyhow::Result<Self> {
        Ok(Self {
            tree: storage.subtree(name)?,
            ids: Mutex::new(Generator::new()),
            _record: PhantomData,
        })
    }

    /// Mints an id that sorts after every id minted before it.
    pub fn next_id(&self) -> Result<Ulid, CollectionError> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()
            .map_err(|_| CollectionError::IdExhausted)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn insert_many(&self, records: &[T]) -> anyhow::Result<BatchReport> {
        let ops = records
            .iter()
            .map(|record| {
                Ok(WriteOp::Insert(
                    record.id().as_bytes().to_vec(),
                    bincode::serialize(record)?,
                ))
            })
            .collect::<Result<Vec<_>, bincode::Error>>()?;
        Ok(StorageEngine::apply_batched(&self.tree, ops)?)
    }

    pub fn remove_many(&self, ids: &[Ulid]) -> Result<BatchReport, BatchError> {
        let ops = ids.iter().map(|id| WriteOp::Remove(id.as_bytes().to_vec()));
        StorageEngine::apply_batched(&self.tree, ops)
    }
}

#[async_trait]
impl<T: Record<ID = Ulid>> Collection<T> for SledCollection<T> {
    async fn fetch(
        &self,
        query: FetchRecordQuery,
    ) -> Result<FetchRecordResult<T>, CollectionError> {
        fetch_records(&self.tree, query)
    }

    async fn get(&self, id: &Ulid) -> Result<Option<T>, CollectionError> {
        match self.tree.get(id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &T) -> Result<(), CollectionError> {
        self.tree
            .insert(record.id().as_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    async fn remove(&self, id: &Ulid) -> Result<bool, CollectionError> {
        Ok(self.tree.remove(id.as_bytes())?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use catalog_proto::{Brand, BrandInput};
    use chrono::Utc;

    use super::*;

    fn brand(collection: &SledCollection<Brand>, name: &str) -> Brand {
        BrandInput { name: name.into() }
            .into_brand(collection.next_id().unwrap(), Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn single_document_writes() {
        let storage = StorageEngine::new_test().unwrap();
        let brands = SledCollection::<Brand>::open(&storage, "brands").unwrap();

        let osg = brand(&brands, "OSG");
        brands.put(&osg).await.unwrap();
        assert_eq!(brands.get(&osg.id).await.unwrap(), Some(osg.clone()));

        let mut renamed = osg.clone();
        renamed.name = "OSG Corporation".into();
        brands.put(&renamed).await.unwrap();
        assert_eq!(brands.len(), 1);
        assert_eq!(brands.get(&osg.id).await.unwrap().unwrap().name, "OSG Corporation");

        assert!(brands.remove(&osg.id).await.unwrap());
        assert!(!brands.remove(&osg.id).await.unwrap());
        assert_eq!(brands.get(&osg.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn ids_follow_insertion_order() {
        let storage = StorageEngine::new_test().unwrap();
        let brands = SledCollection::<Brand>::open(&storage, "brands").unwrap();

        let names = ["Sandvik", "Kennametal", "Mitsubishi", "Iscar"];
        let records: Vec<_> = names.iter().map(|n| brand(&brands, n)).collect();
        brands.insert_many(&records).unwrap();

        let all = collect_all(&brands, Direction::Ascending, 3).await.unwrap();
        let seen: Vec<_> = all.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(seen, names);

        let all = collect_all(&brands, Direction::Descending, 2).await.unwrap();
        assert_eq!(all.first().unwrap().name, "Iscar");
    }

    #[tokio::test]
    async fn remove_many_spans_batches() {
        let storage = StorageEngine::new_test().unwrap();
        let brands = SledCollection::<Brand>::open(&storage, "brands").unwrap();

        let records: Vec<_> = (0..750).map(|i| brand(&brands, &format!("b{i}"))).collect();
        brands.insert_many(&records).unwrap();

        let ids: Vec<_> = records.iter().take(600).map(|b| b.id).collect();
        let report = brands.remove_many(&ids).unwrap();
        assert_eq!(report, BatchReport { batches: 2, operations: 600 });
        assert_eq!(brands.len(), 150);
    }
}
