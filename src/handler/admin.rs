use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use catalog_proto::{
    BatchReport, Brand, BrandInput, BulkDeleteRequest, MigrationReport, OpenSessionRequest,
    PageResponse, Product, ProductInput, ProductPatch, ReconcileReport, SessionKind,
};
use chrono::Utc;
use tracing::info;
use ulid::Ulid;

use super::{admin_session, open_session};
use crate::{appstate::AppState, brands, collection::Collection, error::AppError};

pub async fn open_admin_session(
    State(state): State<AppState>,
    body: Option<Json<OpenSessionRequest>>,
) -> Result<Json<PageResponse>, AppError> {
    let direction = body.and_then(|Json(request)| request.direction);
    Ok(Json(open_session(&state, SessionKind::Admin, direction).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
    Json(input): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let session = admin_session(&state, &id)?;
    let mut paginator = session.lock()?;
    let product = input.into_product(state.products.next_id()?, Utc::now());
    let product = paginator.create(product).await?;
    info!(session = %id, product = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Ulid, Ulid)>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>, AppError> {
    let session = admin_session(&state, &id)?;
    let mut paginator = session.lock()?;
    let product = paginator
        .update(&product_id, |product| patch.apply(product))
        .await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Ulid, Ulid)>,
) -> Result<StatusCode, AppError> {
    let session = admin_session(&state, &id)?;
    let mut paginator = session.lock()?;
    if paginator.delete(&product_id).await? {
        info!(session = %id, product = %product_id, "product deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(format!("product {product_id} not found")))
    }
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<Json<ReconcileReport>, AppError> {
    let session = admin_session(&state, &id)?;
    let mut paginator = session.lock()?;
    Ok(Json(paginator.reconcile().await?))
}

pub async fn create_brand(
    State(state): State<AppState>,
    Json(input): Json<BrandInput>,
) -> Result<(StatusCode, Json<Brand>), AppError> {
    let brand = input
        .into_brand(state.brands.next_id()?, Utc::now())
        .ok_or_else(|| AppError::bad_request("brand name must not be blank"))?;
    state.brands.put(&brand).await?;
    let version = state.brand_cache.invalidate();
    info!(brand = %brand.name, version, "brand created");
    Ok((StatusCode::CREATED, Json(brand)))
}

pub async fn delete_brand(
    State(state): State<AppState>,
    Path(id): Path<Ulid>,
) -> Result<StatusCode, AppError> {
    if !state.brands.remove(&id).await? {
        return Err(AppError::not_found(format!("brand {id} not found")));
    }
    let version = state.brand_cache.invalidate();
    info!(brand = %id, version, "brand deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Removes products outside any session. Open sessions keep showing them
/// until they reload.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<BatchReport>, AppError> {
    let report = state.products.remove_many(&request.ids)?;
    info!(
        batches = report.batches,
        operations = report.operations,
        "bulk delete"
    );
    Ok(Json(report))
}

pub async fn migrate_brands(
    State(state): State<AppState>,
) -> Result<Json<MigrationReport>, AppError> {
    let report = brands::migrate_brands(
        &state.products,
        &state.brands,
        &state.brand_cache,
        state.config.scan_batch_size,
    )
    .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use serde_json::json;

    use super::*;
    use crate::handler::test_support::{app, call, names};

    async fn admin(app: &axum::Router) -> String {
        let (status, page) = call(app, Method::POST, "/admin/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        page["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_update_delete_through_a_session() {
        let (state, app) = app();
        let id = admin(&app).await;
        let products = format!("/sessions/{id}/products");

        let (status, created) = call(
            &app,
            Method::POST,
            &products,
            Some(json!({"displayName": " End mill ", "brand": "OSG", "category": "Milling"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["displayName"], "End mill");
        let product_id = created["id"].as_str().unwrap().to_string();
        assert_eq!(state.products.len(), 1);

        let (status, updated) = call(
            &app,
            Method::PATCH,
            &format!("{products}/{product_id}"),
            Some(json!({"model": "EM-10"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["model"], "EM-10");
        assert_eq!(updated["brand"], "OSG");

        let (_, report) =
            call(&app, Method::POST, &format!("/sessions/{id}/reconcile"), None).await;
        assert_eq!(report, json!({"confirmed": 1, "replaced": 0, "removed": 0}));

        let (status, _) =
            call(&app, Method::DELETE, &format!("{products}/{product_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.products.is_empty());

        let (status, _) =
            call(&app, Method::DELETE, &format!("{products}/{product_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("{products}/{product_id}"),
            Some(json!({"model": "EM-12"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_session_lists_newest_first() {
        let (_, app) = app();
        let id = admin(&app).await;
        for name in ["Tap", "Drill"] {
            call(
                &app,
                Method::POST,
                &format!("/sessions/{id}/products"),
                Some(json!({ "name": name })),
            )
            .await;
        }

        let (_, page) = call(&app, Method::POST, "/admin/sessions", None).await;
        assert_eq!(names(&page), vec!["Drill", "Tap"]);
        assert_eq!(page["has_more"], false);
    }

    #[tokio::test]
    async fn catalog_sessions_cannot_write() {
        let (_, app) = app();
        let (_, page) = call(&app, Method::POST, "/catalog/sessions", None).await;
        let id = page["session_id"].as_str().unwrap();

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/sessions/{id}/products"),
            Some(json!({"name": "Reamer"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "catalog sessions are read-only");
    }

    #[tokio::test]
    async fn overlapping_requests_are_rejected() {
        let (state, app) = app();
        let id = admin(&app).await;
        let session = state
            .sessions
            .get(&id.parse().unwrap(), Utc::now())
            .unwrap();
        let guard = session.lock().unwrap();

        let (status, _) = call(&app, Method::POST, &format!("/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        drop(guard);
        let (status, _) = call(&app, Method::POST, &format!("/sessions/{id}/next"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn brand_writes_bust_the_cache() {
        let (_, app) = app();
        let (status, _) = call(&app, Method::POST, "/admin/brands", Some(json!({"name": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = call(&app, Method::GET, "/brands", None).await;
        assert_eq!(list["version"], 1);
        assert_eq!(list["brands"], json!([]));

        let (status, brand) =
            call(&app, Method::POST, "/admin/brands", Some(json!({"name": "Guhring"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, list) = call(&app, Method::GET, "/brands", None).await;
        assert_eq!(list["version"], 2);
        assert_eq!(list["brands"][0]["name"], "Guhring");

        let brand_id = brand["id"].as_str().unwrap();
        let (status, _) =
            call(&app, Method::DELETE, &format!("/admin/brands/{brand_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, list) = call(&app, Method::GET, "/brands", None).await;
        assert_eq!(list["version"], 3);
        assert_eq!(list["brands"], json!([]));

        let (status, _) =
            call(&app, Method::DELETE, &format!("/admin/brands/{brand_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn migration_and_bulk_delete() {
        let (state, app) = app();
        let id = admin(&app).await;
        let mut ids = Vec::new();
        for brand in ["OSG", "osg ", "Nachi", ""] {
            let (_, created) = call(
                &app,
                Method::POST,
                &format!("/sessions/{id}/products"),
                Some(json!({ "name": "Insert", "brand": brand })),
            )
            .await;
            ids.push(created["id"].clone());
        }

        let (status, report) =
            call(&app, Method::POST, "/admin/migrations/brands", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["scanned"], 4);
        assert_eq!(report["created"], 2);
        assert_eq!(report["existing"], 0);
        assert_eq!(report["brand_version"], 2);
        assert_eq!(state.brands.len(), 2);

        let (status, report) = call(
            &app,
            Method::POST,
            "/admin/products/bulk-delete",
            Some(json!({ "ids": ids })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report, json!({"batches": 1, "operations": 4}));
        assert!(state.products.is_empty());
    }
}
