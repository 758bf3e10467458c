// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Search history and saved search handlers.

use crate::app::{AppState, CurrentUser, RequestContext};
use crate::error::{ErrorResponse, Result};
use crate::models::history::{
    CreateSavedSearchRequest, MessageResponse, SavedSearch, SavedSearchListResponse,
    SearchHistoryResponse, UpdateSavedSearchRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// GET /search-history
#[utoipa::path(
    get,
    path = "/search-history",
    responses((status = 200, description = "Recent searches, newest first", body = SearchHistoryResponse)),
    tag = "history"
)]
pub async fn get_history_handler(
    State(state): State<AppState>,
    RequestContext(caller): RequestContext,
) -> Result<Json<SearchHistoryResponse>> {
    let history = state.history.list(&caller).await?;
    let count = history.len();
    Ok(Json(SearchHistoryResponse { history, count }))
}

/// DELETE /search-history
#[utoipa::path(
    delete,
    path = "/search-history",
    responses((status = 200, description = "History cleared", body = MessageResponse)),
    tag = "history"
)]
pub async fn clear_history_handler(
    State(state): State<AppState>,
    RequestContext(caller): RequestContext,
) -> Result<Json<MessageResponse>> {
    state.history.clear(&caller).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Search history cleared".to_string(),
    }))
}

/// GET /saved-searches
#[utoipa::path(
    get,
    path = "/saved-searches",
    responses(
        (status = 200, description = "Saved searches of the current user", body = SavedSearchListResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "history"
)]
pub async fn list_saved_searches_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<SavedSearchListResponse>> {
    let saved_searches = state.saved_searches.list(&user_id).await?;
    let count = saved_searches.len();
    Ok(Json(SavedSearchListResponse {
        saved_searches,
        count,
    }))
}

/// POST /saved-searches
#[utoipa::path(
    post,
    path = "/saved-searches",
    request_body = CreateSavedSearchRequest,
    responses(
        (status = 201, description = "Saved search created", body = SavedSearch),
        (status = 400, description = "Invalid body", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
    ),
    tag = "history"
)]
pub async fn create_saved_search_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateSavedSearchRequest>,
) -> Result<(StatusCode, Json<SavedSearch>)> {
    let saved = state.saved_searches.create(&user_id, payload).await?;
    tracing::info!("User {} saved search {}", user_id, saved.id);
    Ok((StatusCode::CREATED, Json(saved)))
}

/// PUT /saved-searches/{id}
#[utoipa::path(
    put,
    path = "/saved-searches/{id}",
    params(("id" = Uuid, Path, description = "Saved search id")),
    request_body = UpdateSavedSearchRequest,
    responses(
        (status = 200, description = "Updated saved search", body = SavedSearch),
        (status = 404, description = "No such saved search for this user", body = ErrorResponse),
    ),
    tag = "history"
)]
pub async fn update_saved_search_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSavedSearchRequest>,
) -> Result<Json<SavedSearch>> {
    let saved = state.saved_searches.update(id, &user_id, payload).await?;
    Ok(Json(saved))
}

/// DELETE /saved-searches/{id}
#[utoipa::path(
    delete,
    path = "/saved-searches/{id}",
    params(("id" = Uuid, Path, description = "Saved search id")),
    responses(
        (status = 200, description = "Saved search deleted", body = MessageResponse),
        (status = 404, description = "No such saved search for this user", body = ErrorResponse),
    ),
    tag = "history"
)]
pub async fn delete_saved_search_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.saved_searches.delete(id, &user_id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Saved search deleted".to_string(),
    }))
}

/// POST /saved-searches/{id}/toggle-alerts
#[utoipa::path(
    post,
    path = "/saved-searches/{id}/toggle-alerts",
    params(("id" = Uuid, Path, description = "Saved search id")),
    responses(
        (status = 200, description = "Saved search with the flipped flag", body = SavedSearch),
        (status = 404, description = "No such saved search for this user", body = ErrorResponse),
    ),
    tag = "history"
)]
pub async fn toggle_alerts_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SavedSearch>> {
    let saved = state.saved_searches.toggle_alerts(id, &user_id).await?;
    Ok(Json(saved))
}
