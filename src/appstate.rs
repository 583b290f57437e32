use std::{ops::Deref, sync::Arc};

use anyhow::Result;
use catalog_proto::{record::Direction, Brand, Product, SessionKind};

use crate::{
    brands::BrandCache,
    collection::SledCollection,
    config::Config,
    paginator::Paginator,
    session::{ProductPaginator, SessionStore},
    storage::StorageEngine,
};

#[derive(Clone)]
pub struct AppState(Arc<AppStateInner>);
pub struct AppStateInner {
    pub config: Config,
    pub storage: StorageEngine,
    pub products: Arc<SledCollection<Product>>,
    pub brands: Arc<SledCollection<Brand>>,
    pub brand_cache: BrandCache,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let storage = StorageEngine::new(&config.data_dir()?)?;
        Self::with_storage(config, storage)
    }

    #[cfg(test)]
    pub fn new_test(config: Config) -> Result<Self> {
        Self::with_storage(config, StorageEngine::new_test()?)
    }

    fn with_storage(config: Config, storage: StorageEngine) -> Result<Self> {
        let products = Arc::new(SledCollection::open(&storage, "products")?);
        let brands = Arc::new(SledCollection::open(&storage, "brands")?);
        let brand_cache = BrandCache::new(config.brand_cache_ttl());
        let sessions = SessionStore::new(config.session_idle());
        Ok(Self(Arc::new(AppStateInner {
            config,
            storage,
            products,
            brands,
            brand_cache,
            sessions,
        })))
    }

    pub fn paginator(&self, kind: SessionKind, direction: Option<Direction>) -> ProductPaginator {
        let mut config = match kind {
            SessionKind::Catalog => self.config.catalog_paginator(),
            SessionKind::Admin => self.config.admin_paginator(),
        };
        if let Some(direction) = direction {
            config.direction = direction;
        }
        Paginator::new(Arc::clone(&self.products), config)
    }
}

impl Deref for AppState {
    type Target = Arc<AppStateInner>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
