//! Incremental filtered pagination over a forward-only cursor scan.
//!
//! The backing collection cannot filter, so a search scans it in large
//! batches, keeps the matches in a cache and hands them out one page at a
//! time. Pages are never duplicated or reordered relative to the scan.

use catalog_proto::{
    record::{Cursor, Direction, Record, Searchable},
    Facets, PaginatorState, ReconcileReport,
};
use tracing::{debug, info, warn};

use crate::{
    collection::{Collection, CollectionError},
    filter::Predicate,
    query::{FetchRecordQuery, FetchRecordResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginatorConfig {
    /// Records handed out per page (N).
    pub page_size: usize,
    /// Records read per scan while searching (M).
    pub scan_batch_size: usize,
    pub direction: Direction,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            scan_batch_size: 1000,
            direction: Direction::Ascending,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaginatorError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("record {0} not found")]
    NotFound(String),

    #[error("another request for this session is still running")]
    Busy,
}

/// Where a visible entry came from, and at which paginator generation. A
/// read only overrides a local patch made at an earlier generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Fetched { generation: u64 },
    /// Patched in place after a create or update, not yet confirmed by a read.
    Local { generation: u64 },
}

#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub record: T,
    pub origin: Origin,
}

impl<T> Entry<T> {
    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

struct SearchCache<T> {
    predicate: Predicate,
    matches: Vec<T>,
    offset: usize,
}

impl<T> SearchCache<T> {
    fn remaining(&self) -> usize {
        self.matches.len() - self.offset
    }
}

struct Scan<T> {
    matches: Vec<T>,
    cursor: Option<Cursor>,
    more: bool,
    facets: Facets,
    batches: usize,
}

pub struct Paginator<T, C> {
    collection: C,
    config: PaginatorConfig,
    state: PaginatorState,
    loaded: bool,
    visible: Vec<Entry<T>>,
    cursor: Option<Cursor>,
    upstream_more: bool,
    search: Option<SearchCache<T>>,
    facets: Facets,
    generation: u64,
}

impl<T, C> Paginator<T, C>
where
    T: Record + Searchable,
    C: Collection<T>,
{
    pub fn new(collection: C, config: PaginatorConfig) -> Self {
        Self {
            collection,
            config,
            state: PaginatorState::Idle,
            loaded: false,
            visible: Vec::new(),
            cursor: None,
            upstream_more: false,
            search: None,
            facets: Facets::default(),
            generation: 0,
        }
    }

    pub fn state(&self) -> PaginatorState {
        self.state
    }

    pub fn facets(&self) -> &Facets {
        &self.facets
    }

    pub fn visible(&self) -> &[Entry<T>] {
        &self.visible
    }

    pub fn search_query(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.predicate.as_str())
    }

    /// Matched records held for the active search, and how many were served.
    pub fn search_cache(&self) -> Option<(usize, usize)> {
        self.search.as_ref().map(|s| (s.matches.len(), s.offset))
    }

    pub fn has_more(&self) -> bool {
        match &self.search {
            Some(search) => search.remaining() > 0 || self.upstream_more,
            None => self.upstream_more,
        }
    }

    pub async fn load_initial_page(&mut self) -> Result<Page<T>, PaginatorError> {
        self.state = PaginatorState::LoadingInitial;

        let result = match self.fetch_batch(None, self.config.page_size).await {
            Ok(result) => result,
            Err(err) => {
                warn!("initial page fetch failed: {err}");
                self.state = PaginatorState::Error;
                return Err(err.into());
            }
        };

        self.generation += 1;
        self.loaded = true;
        self.search = None;
        self.cursor = result.last_cursor();
        self.upstream_more = result.more_records;

        let items = result.into_records();
        for record in &items {
            self.facets.observe(record);
        }
        self.visible = items
            .iter()
            .cloned()
            .map(|record| Entry {
                record,
                origin: Origin::Fetched {
                    generation: self.generation,
                },
            })
            .collect();
        self.settle();

        debug!(
            count = items.len(),
            has_more = self.has_more(),
            "initial page loaded"
        );
        Ok(Page {
            items,
            has_more: self.has_more(),
        })
    }

    pub async fn next_page(&mut self) -> Result<Page<T>, PaginatorError> {
        if !self.loaded {
            return self.load_initial_page().await;
        }
        if self.search.is_some() {
            self.next_filtered_page().await
        } else {
            self.next_unfiltered_page().await
        }
    }

    async fn next_unfiltered_page(&mut self) -> Result<Page<T>, PaginatorError> {
        if !self.upstream_more {
            self.settle();
            return Ok(self.empty_page());
        }

        let previous = self.state;
        self.state = PaginatorState::LoadingMore;

        let result = match self
            .fetch_batch(self.cursor.clone(), self.config.page_size)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!("next page fetch failed: {err}");
                self.state = previous;
                return Err(err.into());
            }
        };

        self.generation += 1;
        if let Some(cursor) = result.last_cursor() {
            self.cursor = Some(cursor);
        }
        self.upstream_more = result.more_records;

        let records = result.into_records();
        for record in &records {
            self.facets.observe(record);
        }
        let items = self.append_fetched(records);
        self.settle();
        Ok(Page {
            items,
            has_more: self.has_more(),
        })
    }

    async fn next_filtered_page(&mut self) -> Result<Page<T>, PaginatorError> {
        let Some(search) = &self.search else {
            return Ok(self.empty_page());
        };

        if search.remaining() == 0 {
            if !self.upstream_more {
                self.settle();
                return Ok(self.empty_page());
            }

            let predicate = search.predicate.clone();
            let previous = self.state;
            self.state = PaginatorState::LoadingMore;

            let scan = match self.scan_until_hit(&predicate, self.cursor.clone()).await {
                Ok(scan) => scan,
                Err(err) => {
                    warn!(query = predicate.as_str(), "search continuation failed: {err}");
                    self.state = previous;
                    return Err(err.into());
                }
            };

            self.generation += 1;
            self.facets.merge(scan.facets);
            self.cursor = scan.cursor;
            self.upstream_more = scan.more;
            if let Some(search) = self.search.as_mut() {
                search.matches.extend(scan.matches);
            }
        }

        let items = self.serve_from_cache();
        self.settle();
        Ok(Page {
            items,
            has_more: self.has_more(),
        })
    }

    /// Blank queries clear the filter and reload the first page.
    pub async fn search(&mut self, query: &str) -> Result<Page<T>, PaginatorError> {
        let Some(predicate) = Predicate::parse(query) else {
            return self.load_initial_page().await;
        };

        self.state = PaginatorState::LoadingInitial;

        let scan = match self.scan_until_hit(&predicate, None).await {
            Ok(scan) => scan,
            Err(err) => {
                warn!(query = predicate.as_str(), "search failed: {err}");
                self.state = PaginatorState::Error;
                return Err(err.into());
            }
        };

        info!(
            query = predicate.as_str(),
            matches = scan.matches.len(),
            batches = scan.batches,
            "search scanned"
        );

        self.generation += 1;
        self.loaded = true;
        self.facets.merge(scan.facets);
        self.cursor = scan.cursor;
        self.upstream_more = scan.more;
        self.visible.clear();
        self.search = Some(SearchCache {
            predicate,
            matches: scan.matches,
            offset: 0,
        });

        let items = self.serve_from_cache();
        self.settle();
        Ok(Page {
            items,
            has_more: self.has_more(),
        })
    }

    pub async fn create(&mut self, record: T) -> Result<T, PaginatorError> {
        self.collection.put(&record).await.map_err(|err| {
            warn!(id = ?record.id(), "create failed: {err}");
            err
        })?;

        self.visible.insert(
            0,
            Entry {
                record: record.clone(),
                origin: Origin::Local {
                    generation: self.generation,
                },
            },
        );
        Ok(record)
    }

    pub async fn update<F>(&mut self, id: &T::ID, apply: F) -> Result<T, PaginatorError>
    where
        F: FnOnce(&mut T) + Send,
    {
        let mut record = self
            .collection
            .get(id)
            .await?
            .ok_or_else(|| PaginatorError::NotFound(format!("{id:?}")))?;
        apply(&mut record);
        self.collection.put(&record).await.map_err(|err| {
            warn!(?id, "update failed: {err}");
            err
        })?;

        if let Some(entry) = self.visible.iter_mut().find(|e| e.record.id() == id) {
            *entry = Entry {
                record: record.clone(),
                origin: Origin::Local {
                    generation: self.generation,
                },
            };
        }
        if let Some(search) = self.search.as_mut() {
            if let Some(cached) = search.matches.iter_mut().find(|r| r.id() == id) {
                *cached = record.clone();
            }
        }
        Ok(record)
    }

    /// Returns whether the record existed upstream.
    pub async fn delete(&mut self, id: &T::ID) -> Result<bool, PaginatorError> {
        let existed = self.collection.remove(id).await.map_err(|err| {
            warn!(?id, "delete failed: {err}");
            err
        })?;

        if let Some(position) = self.visible.iter().position(|e| e.record.id() == id) {
            self.visible.remove(position);
        }
        if let Some(search) = self.search.as_mut() {
            if let Some(position) = search.matches.iter().position(|r| r.id() == id) {
                search.matches.remove(position);
                if position < search.offset {
                    search.offset -= 1;
                }
            }
        }
        Ok(existed)
    }

    /// Re-reads every locally patched entry and trusts the collection over
    /// the optimistic copy.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport, PaginatorError>
    where
        T: PartialEq,
    {
        let local: Vec<T::ID> = self
            .visible
            .iter()
            .filter(|e| e.is_local())
            .map(|e| e.record.id().clone())
            .collect();

        let mut fresh = Vec::with_capacity(local.len());
        for id in local {
            let current = self.collection.get(&id).await?;
            fresh.push((id, current));
        }

        self.generation += 1;
        let generation = self.generation;
        let mut report = ReconcileReport::default();

        for (id, current) in fresh {
            let Some(position) = self.visible.iter().position(|e| e.record.id() == &id) else {
                continue;
            };
            match current {
                None => {
                    self.visible.remove(position);
                    report.removed += 1;
                }
                Some(record) => {
                    let entry = &mut self.visible[position];
                    if entry.record == record {
                        report.confirmed += 1;
                    } else {
                        entry.record = record;
                        report.replaced += 1;
                    }
                    entry.origin = Origin::Fetched { generation };
                }
            }
        }

        info!(
            confirmed = report.confirmed,
            replaced = report.replaced,
            removed = report.removed,
            "reconciled local entries"
        );
        Ok(report)
    }

    async fn fetch_batch(
        &self,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<FetchRecordResult<T>, CollectionError> {
        let query = FetchRecordQuery::new()
            .cursor(cursor)
            .limit(limit)
            .order(self.config.direction);
        self.collection.fetch(query).await
    }

    /// Scans forward from `cursor` until a batch yields a match or the
    /// collection runs out. Nothing is committed here.
    async fn scan_until_hit(
        &self,
        predicate: &Predicate,
        mut cursor: Option<Cursor>,
    ) -> Result<Scan<T>, CollectionError> {
        let mut scan = Scan {
            matches: Vec::new(),
            cursor: cursor.clone(),
            more: false,
            facets: Facets::default(),
            batches: 0,
        };

        loop {
            let result = self
                .fetch_batch(cursor.take(), self.config.scan_batch_size)
                .await?;
            scan.batches += 1;
            scan.more = result.more_records && !result.items.is_empty();
            if let Some(last) = result.last_cursor() {
                scan.cursor = Some(last);
            }

            for record in result.into_records() {
                scan.facets.observe(&record);
                if predicate.matches(&record) {
                    scan.matches.push(record);
                }
            }

            debug!(
                query = predicate.as_str(),
                batch = scan.batches,
                matches = scan.matches.len(),
                "scan batch"
            );

            if !scan.matches.is_empty() || !scan.more {
                return Ok(scan);
            }
            cursor = scan.cursor.clone();
        }
    }

    /// Hands out up to a page of cached matches, topping the page up when
    /// some of them were already on show.
    fn serve_from_cache(&mut self) -> Vec<T> {
        let page_size = self.config.page_size;
        let mut page = Vec::new();
        while page.len() < page_size {
            let Some(search) = self.search.as_mut() else {
                break;
            };
            if search.remaining() == 0 {
                break;
            }
            let end = (search.offset + page_size - page.len()).min(search.matches.len());
            let served = search.matches[search.offset..end].to_vec();
            search.offset = end;
            page.extend(self.append_fetched(served));
        }
        page
    }

    /// Appends fetched records to the visible list and returns the ones that
    /// were not already on show. A local patch older than the current read is
    /// replaced in place by the upstream copy.
    fn append_fetched(&mut self, records: Vec<T>) -> Vec<T> {
        let generation = self.generation;
        let mut appended = Vec::with_capacity(records.len());
        for record in records {
            match self.visible.iter_mut().find(|e| e.record.id() == record.id()) {
                Some(entry) => {
                    if let Origin::Local { generation: patched } = entry.origin {
                        if patched < generation {
                            debug!(
                                id = ?record.id(),
                                patched,
                                generation,
                                "upstream copy supersedes local patch"
                            );
                            entry.record = record;
                            entry.origin = Origin::Fetched { generation };
                        }
                    }
                }
                None => {
                    self.visible.push(Entry {
                        record: record.clone(),
                        origin: Origin::Fetched { generation },
                    });
                    appended.push(record);
                }
            }
        }
        appended
    }

    fn settle(&mut self) {
        self.state = if self.has_more() {
            PaginatorState::Ready
        } else {
            PaginatorState::Exhausted
        };
    }

    fn empty_page(&self) -> Page<T> {
        Page {
            items: Vec::new(),
            has_more: self.has_more(),
        }
    }
}
