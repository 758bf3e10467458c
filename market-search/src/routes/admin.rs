// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Index maintenance. Every handler requires the admin token; failures are
//! returned to the operator instead of being degraded.

use crate::app::{AdminAccess, AppState};
use crate::error::{ErrorResponse, Result};
use crate::models::analytics::{ReindexResponse, SearchAnalytics};
use crate::models::history::MessageResponse;
use axum::{
    extract::{Path, State},
    Json,
};

/// POST /admin/products/{id}/sync
#[utoipa::path(
    post,
    path = "/admin/products/{id}/sync",
    params(("id" = String, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Index updated from the stored listing", body = MessageResponse),
        (status = 403, description = "Bad admin token", body = ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn sync_product_handler(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.search.on_product_saved(&id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Product {id} synced"),
    }))
}

/// DELETE /admin/products/{id}
#[utoipa::path(
    delete,
    path = "/admin/products/{id}",
    params(("id" = String, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Removed from the index", body = MessageResponse),
        (status = 403, description = "Bad admin token", body = ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn delete_product_handler(
    _admin: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.search.on_product_deleted(&id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: format!("Product {id} removed from index"),
    }))
}

/// POST /admin/reindex
#[utoipa::path(
    post,
    path = "/admin/reindex",
    responses(
        (status = 200, description = "Every available listing was indexed", body = ReindexResponse),
        (status = 502, description = "Search engine failure", body = ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn reindex_handler(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<ReindexResponse>> {
    let indexed = state.search.reindex_all().await?;
    Ok(Json(ReindexResponse {
        success: true,
        indexed,
    }))
}

/// DELETE /admin/index
#[utoipa::path(
    delete,
    path = "/admin/index",
    responses(
        (status = 200, description = "Index emptied", body = MessageResponse),
        (status = 502, description = "Search engine failure", body = ErrorResponse),
    ),
    tag = "admin"
)]
pub async fn clear_index_handler(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Result<Json<MessageResponse>> {
    state.search.clear_index().await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Search index cleared".to_string(),
    }))
}

/// GET /admin/analytics
#[utoipa::path(
    get,
    path = "/admin/analytics",
    responses((status = 200, description = "Index statistics", body = SearchAnalytics)),
    tag = "admin"
)]
pub async fn analytics_handler(
    _admin: AdminAccess,
    State(state): State<AppState>,
) -> Json<SearchAnalytics> {
    Json(state.search.analytics().await)
}
