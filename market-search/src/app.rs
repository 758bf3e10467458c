// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Application state, per-request caller resolution, and router construction.
//!
//! This module is `pub` so that integration tests can build a test router directly
//! without starting the full binary.

use crate::error::{ErrorResponse, SearchError};
use crate::models::analytics::{ClickEvent, ConversionEvent, ReindexResponse, SearchAnalytics};
use crate::models::history::{
    CreateSavedSearchRequest, MessageResponse, SavedSearch, SavedSearchListResponse,
    SearchHistoryItem, SearchHistoryResponse, UpdateSavedSearchRequest,
};
use crate::models::search::{
    PriceRange, ProductsResponse, SearchDocument, SearchFilters, SearchHit, SearchResult, SortBy,
    Suggestion, SuggestionsResponse,
};
use crate::models::version::VersionResponse;
use crate::routes::{admin, history, search};
use crate::services::auth::{
    ensure_visitor_id, extract_session_token, verify_admin_token, AuthContext,
};
use crate::services::history::{HistoryService, SearchCaller};
use crate::services::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::services::saved_search::SavedSearchStore;
use crate::services::unified::UnifiedSearchService;
use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_cookies::{CookieManagerLayer, Cookies};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application version extracted from `Cargo.toml` at compile time.
/// The patch segment can be overridden via `MARKET_PATCH_VERSION` (see `build.rs`).
pub const VERSION: &str = env!("MARKET_VERSION");

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared application state injected into every route handler via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<UnifiedSearchService>,
    pub history: Arc<HistoryService>,
    pub saved_searches: Arc<dyn SavedSearchStore>,
    pub auth: Arc<dyn AuthContext>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Value expected in `x-admin-token`; admin routes are closed when unset.
    pub admin_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// The caller of the current request: the signed-in user if the session
/// cookie is valid, plus the anonymous visitor id (issued on first visit).
pub struct RequestContext(pub SearchCaller);

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = SearchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| SearchError::Internal(msg.to_string()))?;

        let user_id = match extract_session_token(&cookies) {
            Some(token) => state.auth.user_id(&token).await?,
            None => None,
        };
        let visitor_id = ensure_visitor_id(&cookies);

        Ok(RequestContext(SearchCaller {
            user_id,
            visitor_id: Some(visitor_id),
        }))
    }
}

/// A signed-in user id; rejects anonymous callers with 401.
pub struct CurrentUser(pub String);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = SearchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequestContext(caller) = RequestContext::from_request_parts(parts, state).await?;
        caller
            .user_id
            .map(CurrentUser)
            .ok_or(SearchError::Unauthorized)
    }
}

/// Present on admin routes: the `x-admin-token` header matched.
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = SearchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        verify_admin_token(&parts.headers, state.admin_token.as_deref())?;
        Ok(AdminAccess)
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /version
#[utoipa::path(
    get,
    path = "/version",
    responses((status = 200, description = "Service version", body = VersionResponse)),
    tag = "meta"
)]
pub async fn version_handler(State(state): State<AppState>) -> Json<VersionResponse> {
    let engine = if state.search.engine_enabled() {
        "meilisearch"
    } else {
        "database"
    };
    Json(VersionResponse {
        service: "market-search".to_string(),
        version: VERSION.to_string(),
        search_engine: engine.to_string(),
    })
}

// ---------------------------------------------------------------------------
// OpenAPI
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        version_handler,
        search::search_handler,
        search::suggestions_handler,
        search::popular_handler,
        search::similar_handler,
        search::category_handler,
        search::track_click_handler,
        search::track_conversion_handler,
        history::get_history_handler,
        history::clear_history_handler,
        history::list_saved_searches_handler,
        history::create_saved_search_handler,
        history::update_saved_search_handler,
        history::delete_saved_search_handler,
        history::toggle_alerts_handler,
        admin::sync_product_handler,
        admin::delete_product_handler,
        admin::reindex_handler,
        admin::clear_index_handler,
        admin::analytics_handler,
    ),
    components(schemas(
        SearchResult,
        SearchHit,
        SearchDocument,
        SearchFilters,
        PriceRange,
        SortBy,
        Suggestion,
        SuggestionsResponse,
        ProductsResponse,
        SearchHistoryItem,
        SearchHistoryResponse,
        SavedSearch,
        SavedSearchListResponse,
        CreateSavedSearchRequest,
        UpdateSavedSearchRequest,
        MessageResponse,
        ClickEvent,
        ConversionEvent,
        SearchAnalytics,
        ReindexResponse,
        VersionResponse,
        ErrorResponse,
    )),
    tags(
        (name = "search", description = "Product search"),
        (name = "history", description = "Search history and saved searches"),
        (name = "admin", description = "Index maintenance"),
        (name = "meta", description = "Service metadata"),
    )
)]
pub struct SearchApiDoc;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum application router. API routes are rate limited; Swagger
/// UI is served at `/swagger-ui`. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the limiter can
/// see peer addresses.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/version", get(version_handler))
        .route("/search", get(search::search_handler))
        .route("/search/suggestions", get(search::suggestions_handler))
        .route("/search/popular", get(search::popular_handler))
        .route("/search/similar/{id}", get(search::similar_handler))
        .route("/search/category/{category}", get(search::category_handler))
        .route("/analytics/click", post(search::track_click_handler))
        .route(
            "/analytics/conversion",
            post(search::track_conversion_handler),
        )
        .route(
            "/search-history",
            get(history::get_history_handler).delete(history::clear_history_handler),
        )
        .route(
            "/saved-searches",
            get(history::list_saved_searches_handler).post(history::create_saved_search_handler),
        )
        .route(
            "/saved-searches/{id}",
            put(history::update_saved_search_handler)
                .delete(history::delete_saved_search_handler),
        )
        .route(
            "/saved-searches/{id}/toggle-alerts",
            post(history::toggle_alerts_handler),
        )
        .route(
            "/admin/products/{id}/sync",
            post(admin::sync_product_handler),
        )
        .route("/admin/products/{id}", delete(admin::delete_product_handler))
        .route("/admin/reindex", post(admin::reindex_handler))
        .route("/admin/index", delete(admin::clear_index_handler))
        .route("/admin/analytics", get(admin::analytics_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state);

    api.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", SearchApiDoc::openapi()))
        .layer(CookieManagerLayer::new())
}
