use std::ops::Bound;

use catalog_proto::record::{Cursor, Direction, Record};
use ulid::Ulid;

use crate::collection::CollectionError;

pub const DEFAULT_LIMIT: usize = 10;

pub trait Key {
    type Bytes: AsRef<[u8]>;
    fn as_bytes(&self) -> Self::Bytes;
}

impl Key for Ulid {
    type Bytes = [u8; 16];
    fn as_bytes(&self) -> Self::Bytes {
        self.to_bytes()
    }
}

impl Key for Cursor {
    type Bytes = Vec<u8>;
    fn as_bytes(&self) -> Self::Bytes {
        self.key.clone()
    }
}

#[derive(Debug, Clone)]
pub struct FetchRecordQuery {
    cursor: Option<Cursor>,
    limit: Option<usize>,
    order: Direction,
}

impl Default for FetchRecordQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchRecordQuery {
    pub fn new() -> Self {
        FetchRecordQuery {
            cursor: None,
            limit: None,
            order: Direction::Ascending,
        }
    }

    /// Continue strictly after `value`.
    pub fn cursor(mut self, value: Option<Cursor>) -> Self {
        self.cursor = value;
        self
    }

    pub fn limit(mut self, value: usize) -> Self {
        self.limit = Some(value);
        self
    }

    pub fn order(mut self, order: Direction) -> Self {
        self.order = order;
        self
    }

    pub fn limit_value(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// Rejects a cursor taken in the other direction.
    pub fn validate(&self) -> Result<(), CollectionError> {
        match &self.cursor {
            Some(cursor) if cursor.direction != self.order => Err(CollectionError::CursorMismatch {
                cursor: cursor.direction,
                query: self.order,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct FetchRecordResult<T: Record> {
    pub items: Vec<(Cursor, T)>,
    pub more_records: bool,
}

impl<T: Record> FetchRecordResult<T> {
    #[cfg(test)]
    pub fn ids(&self) -> Vec<T::ID> {
        self.items.iter().map(|(_, r)| r.id().clone()).collect()
    }

    pub fn last_cursor(&self) -> Option<Cursor> {
        self.items.last().map(|(cursor, _)| cursor.clone())
    }

    pub fn into_records(self) -> Vec<T> {
        self.items.into_iter().map(|(_, r)| r).collect()
    }
}

pub fn fetch_records<T: Record>(
    tree: &sled::Tree,
    query: FetchRecordQuery,
) -> Result<FetchRecordResult<T>, CollectionError> {
    query.validate()?;

    let limit = query.limit_value();
    let fetch_limit = limit + 1; // Fetch one extra to determine if there are more records

    let bound = match &query.cursor {
        None => Bound::Unbounded,
        Some(cursor) => Bound::Excluded(cursor.as_bytes()),
    };

    let mut items = Vec::with_capacity(fetch_limit.min(1024));

    match query.order {
        Direction::Ascending => {
            let iter = tree.range::<Vec<u8>, _>((bound, Bound::Unbounded));
            for item in iter.take(fetch_limit) {
                let (key, value) = item?;
                items.push((
                    Cursor::new(key.to_vec(), query.order),
                    bincode::deserialize(&value)?,
                ));
            }
        }
        Direction::Descending => {
            let iter = tree.range::<Vec<u8>, _>((Bound::Unbounded, bound)).rev();
            for item in iter.take(fetch_limit) {
                let (key, value) = item?;
                items.push((
                    Cursor::new(key.to_vec(), query.order),
                    bincode::deserialize(&value)?,
                ));
            }
        }
    }

    let more_records = items.len() > limit;
    items.truncate(limit);

    Ok(FetchRecordResult {
        items,
        more_records,
    })
}
