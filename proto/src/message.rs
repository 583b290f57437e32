use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::catalog::{Brand, Product};
use crate::record::{Direction, Searchable};

/// Distinct categories and brands seen so far. Only ever grows.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Facets {
    pub categories: BTreeSet<String>,
    pub brands: BTreeSet<String>,
}

impl Facets {
    pub fn observe<T: Searchable>(&mut self, record: &T) {
        if let Some(category) = record.category() {
            self.categories.insert(category.to_string());
        }
        if let Some(brand) = record.brand() {
            self.brands.insert(brand.to_string());
        }
    }

    pub fn merge(&mut self, other: Facets) {
        self.categories.extend(other.categories);
        self.brands.extend(other.brands);
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Catalog,
    Admin,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaginatorState {
    Idle,
    LoadingInitial,
    Ready,
    LoadingMore,
    Exhausted,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct OpenSessionRequest {
    /// Overrides the configured ordering for this session.
    pub direction: Option<Direction>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageResponse {
    pub session_id: Ulid,
    pub items: Vec<Product>,
    pub has_more: bool,
    /// Active search filter, normalised; absent when browsing unfiltered.
    pub query: Option<String>,
    pub state: PaginatorState,
    pub facets: Facets,
    /// Total entries currently held by the session's visible list.
    pub visible: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProductListing {
    pub items: Vec<Product>,
    pub has_more: bool,
    pub next: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BrandList {
    pub version: u64,
    pub brands: Vec<Brand>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Ulid>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub operations: usize,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub scanned: usize,
    pub created: usize,
    pub existing: usize,
    pub brand_version: u64,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    pub replaced: usize,
    pub removed: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::ProductInput;

    #[test]
    fn facets_skip_blank_values_and_repeats() {
        let drill = ProductInput {
            name: "Drill".into(),
            brand: "Nachi".into(),
            category: "Drilling".into(),
            ..Default::default()
        }
        .into_product(Ulid::new(), Utc::now());
        let unbranded = ProductInput {
            name: "Tap".into(),
            category: "Threading".into(),
            ..Default::default()
        }
        .into_product(Ulid::new(), Utc::now());

        let mut facets = Facets::default();
        facets.observe(&drill);
        facets.observe(&drill);
        facets.observe(&unbranded);
        assert_eq!(facets.brands.len(), 1);
        assert_eq!(facets.categories.len(), 2);

        let mut merged = Facets::default();
        merged.observe(&unbranded);
        merged.merge(facets.clone());
        assert_eq!(merged, facets);
    }
}
