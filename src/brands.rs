use std::collections::HashSet;

use anyhow::Result;
use catalog_proto::{
    record::{Direction, Searchable},
    Brand, BrandInput, MigrationReport, Product,
};
use chrono::Utc;
use tracing::info;

use crate::{
    cache::ReferenceCache,
    collection::{collect_all, Collection, CollectionError, SledCollection},
    query::FetchRecordQuery,
};

pub type BrandCache = ReferenceCache<Brand>;

/// Every brand, sorted by name for display.
pub async fn load_brands(
    brands: &SledCollection<Brand>,
    batch: usize,
) -> Result<Vec<Brand>, CollectionError> {
    let mut all = collect_all(brands, Direction::Ascending, batch).await?;
    all.sort_by_cached_key(|b| b.name.to_lowercase());
    Ok(all)
}

fn brand_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Creates a brand for every distinct product brand not on file yet, then
/// busts the brand cache.
///
/// Writes go out in capped batches; a failure part way leaves the earlier
/// batches in place.
pub async fn migrate_brands(
    products: &SledCollection<Product>,
    brands: &SledCollection<Brand>,
    cache: &BrandCache,
    batch: usize,
) -> Result<MigrationReport> {
    let existing = collect_all(brands, Direction::Ascending, batch).await?;
    let mut known: HashSet<String> = existing.iter().map(|b| brand_key(&b.name)).collect();

    let mut report = MigrationReport {
        existing: existing.len(),
        ..Default::default()
    };
    let mut created = Vec::new();
    let mut cursor = None;

    loop {
        let query = FetchRecordQuery::new().cursor(cursor).limit(batch);
        let result = products.fetch(query).await?;
        let more = result.more_records && !result.items.is_empty();
        cursor = result.last_cursor();
        report.scanned += result.items.len();

        for product in result.into_records() {
            let Some(name) = product.brand() else {
                continue;
            };
            if !known.insert(brand_key(name)) {
                continue;
            }
            let input = BrandInput {
                name: name.to_string(),
            };
            if let Some(brand) = input.into_brand(brands.next_id()?, Utc::now()) {
                created.push(brand);
            }
        }

        if !more {
            break;
        }
    }

    let written = brands.insert_many(&created)?;
    report.created = written.operations;
    report.brand_version = cache.invalidate();

    info!(
        scanned = report.scanned,
        created = report.created,
        existing = report.existing,
        version = report.brand_version,
        "brand migration finished"
    );
    Ok(report)
}
