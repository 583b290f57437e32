pub mod admin;
pub mod catalog;

use std::sync::Arc;

use catalog_proto::{record::Direction, PageResponse, Product, SessionKind};
use chrono::Utc;
use ulid::Ulid;

use crate::{
    appstate::AppState,
    error::AppError,
    paginator::Page,
    session::{ProductPaginator, Session},
};

fn page_response(
    session: &Session,
    paginator: &ProductPaginator,
    page: Page<Product>,
) -> PageResponse {
    PageResponse {
        session_id: session.id,
        items: page.items,
        has_more: page.has_more,
        query: paginator.search_query().map(str::to_string),
        state: paginator.state(),
        facets: paginator.facets().clone(),
        visible: paginator.visible().len(),
    }
}

fn session(state: &AppState, id: &Ulid) -> Result<Arc<Session>, AppError> {
    state
        .sessions
        .get(id, Utc::now())
        .ok_or_else(|| AppError::not_found(format!("session {id} not found")))
}

fn admin_session(state: &AppState, id: &Ulid) -> Result<Arc<Session>, AppError> {
    let session = session(state, id)?;
    if session.kind != SessionKind::Admin {
        return Err(AppError::forbidden("catalog sessions are read-only"));
    }
    Ok(session)
}

/// Loads the first page before registering, so a failed load leaves no
/// session behind.
async fn open_session(
    state: &AppState,
    kind: SessionKind,
    direction: Option<Direction>,
) -> Result<PageResponse, AppError> {
    let mut paginator = state.paginator(kind, direction);
    let page = paginator.load_initial_page().await?;
    let session = state.sessions.open(kind, paginator, Utc::now());
    let paginator = session.lock()?;
    Ok(page_response(&session, &paginator, page))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{appstate::AppState, config::Config};

    pub fn app() -> (AppState, Router) {
        let config = Config {
            page_size: 3,
            scan_batch_size: 5,
            ..Config::default()
        };
        let state = AppState::new_test(config).unwrap();
        (state.clone(), crate::router(state))
    }

    pub async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub fn names(page: &Value) -> Vec<String> {
        page["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["displayName"].as_str().unwrap().to_string())
            .collect()
    }
}
