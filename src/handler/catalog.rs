use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use catalog_proto::{
    record::{Cursor, Direction},
    BrandList, OpenSessionRequest, PageResponse, ProductListing, SearchRequest, SessionKind,
};
use chrono::Utc;
use serde::Deserialize;
use ulid::Ulid;

use super::{open_session, page_response, session};
use crate::{
    appstate::AppState, brands::load_brands, collection::Collection, error::AppError,
    query::FetchRecordQuery,
};

pub async fn root(State(state): State<AppState>) -> String {
    format!("catalog: {} products", state.products.len())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListingParams {
    after: Option<String>,
    limit: Option<usize>,
    order: Option<Direction>,
}

/// Stateless listing: the caller carries the cursor token between pages.
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> Result<Json<ProductListing>, AppError> {
    let cursor = params.after.as_deref().map(Cursor::decode).transpose()?;
    let order = params
        .order
        .or(cursor.as_ref().map(|c| c.direction))
        .unwrap_or(state.config.catalog_direction);
    let limit = params
        .limit
        .unwrap_or(state.config.page_size)
        .clamp(1, state.config.page_size);

    let query = FetchRecordQuery::new()
        .cursor(cursor)
        .limit(limit)
        .order(order);
    let result = state.products.fetch(query).await?;

    let has_more = result.more_records;
    let next = if has_more {
        result.last_cursor().map(|c| c.encode())
    } else {
        None
    };
    Ok(Json(ProductListing {
        items: result.into_records(),
        has_more,
        next,
    }))
}

pub async fn list_brands(State(state): State<AppState>) -> Result<Json<BrandList>, AppError> {
    let batch = state.config.scan_batch_size;
    let (version, brands) = state
        .brand_cache
        .get_or_load(Utc::now(), || load_brands(&state.brands, batch))
        .await?;
    Ok(Json(BrandList {
        version,
        brands: brands.to_vec(),
    }))
}

pub async fn open_catalog_session(
    State(state): State<AppState>,
    body: Option<Json<OpenSessionRequest>>,
) -> Result<Json<PageResponse>, AppError> {
    let direction = body.and_then(|Json(request)| request.direction);
    Ok(Json(open_session(&state, SessionKind::Catalog, direction).await?))
}

pub async fn next_page(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<PageResponse>, AppError> {
    let session = session(&state, &id)?;
    let mut paginator = session.lock()?;
    let page = paginator.next_page().await?;
    Ok(Json(page_response(&session, &paginator, page)))
}

pub async fn search(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<PageResponse>, AppError> {
    let session = session(&state, &id)?;
    let mut paginator = session.lock()?;
    let page = paginator.search(&request.query).await?;
    Ok(Json(page_response(&session, &paginator, page)))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("session {id} not found")))
    }
}
