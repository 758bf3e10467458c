// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Search, autocomplete, listing and analytics handlers.

use crate::app::{AppState, RequestContext};
use crate::error::{ErrorResponse, Result, SearchError};
use crate::models::analytics::{ClickEvent, ConversionEvent};
use crate::models::history::MessageResponse;
use crate::models::search::{
    parse_paging, ProductsResponse, SearchQueryParams, SearchResult, SuggestionsResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

const DEFAULT_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS: usize = 20;
const DEFAULT_POPULAR: usize = 12;
const DEFAULT_SIMILAR: usize = 8;
const MAX_LIST: usize = 100;

/// `q`, `page` and `limit` of the smaller listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Parse an optional positive `limit`, clamped to `max`.
pub fn parse_limit(raw: Option<&str>, default: usize, max: usize) -> Result<usize> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(default);
    };
    let limit: usize = raw
        .parse()
        .map_err(|_| SearchError::validation("limit", "must be a positive integer"))?;
    if limit == 0 {
        return Err(SearchError::validation("limit", "must be at least 1"));
    }
    Ok(limit.min(max))
}

/// GET /search
#[utoipa::path(
    get,
    path = "/search",
    params(
        ("q" = Option<String>, Query, description = "Free text, at most 200 characters"),
        ("categories" = Option<String>, Query, description = "Comma separated category names"),
        ("brands" = Option<String>, Query, description = "Comma separated brands"),
        ("conditions" = Option<String>, Query, description = "Comma separated conditions"),
        ("sizes" = Option<String>, Query, description = "Comma separated sizes"),
        ("colors" = Option<String>, Query, description = "Comma separated colors"),
        ("minPrice" = Option<f64>, Query, description = "Inclusive lower price bound"),
        ("maxPrice" = Option<f64>, Query, description = "Inclusive upper price bound"),
        ("sellerRating" = Option<f64>, Query, description = "Minimum seller rating, 0 to 5"),
        ("availableForTrade" = Option<bool>, Query, description = "Trade flag"),
        ("sortBy" = Option<String>, Query, description = "relevance, newest, price_asc, price_desc, popular, favorites"),
        ("page" = Option<u32>, Query, description = "Zero-based page"),
        ("limit" = Option<u32>, Query, description = "Page size, at most 100"),
    ),
    responses(
        (status = 200, description = "Search results", body = SearchResult),
        (status = 400, description = "Invalid parameter", body = ErrorResponse),
    ),
    tag = "search"
)]
pub async fn search_handler(
    State(state): State<AppState>,
    RequestContext(caller): RequestContext,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<SearchResult>> {
    let request = params.into_request()?;
    let result = state
        .search
        .search(&request.filters, request.page, request.page_size, &caller)
        .await?;
    Ok(Json(result))
}

/// GET /search/suggestions
#[utoipa::path(
    get,
    path = "/search/suggestions",
    params(
        ("q" = Option<String>, Query, description = "Partial query; fewer than 2 characters yields no suggestions"),
        ("limit" = Option<usize>, Query, description = "At most 20"),
    ),
    responses((status = 200, description = "Suggestions", body = SuggestionsResponse)),
    tag = "search"
)]
pub async fn suggestions_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SuggestionsResponse>> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_SUGGESTIONS, MAX_SUGGESTIONS)?;
    let query = params.q.unwrap_or_default();
    let suggestions = state.search.suggestions(&query, limit).await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// GET /search/popular
#[utoipa::path(
    get,
    path = "/search/popular",
    params(("limit" = Option<usize>, Query, description = "At most 100")),
    responses((status = 200, description = "Most viewed listings", body = ProductsResponse)),
    tag = "search"
)]
pub async fn popular_handler(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductsResponse>> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_POPULAR, MAX_LIST)?;
    let products = state.search.popular_products(limit).await?;
    Ok(Json(ProductsResponse { products }))
}

/// GET /search/similar/{id}
#[utoipa::path(
    get,
    path = "/search/similar/{id}",
    params(
        ("id" = String, Path, description = "Source listing id"),
        ("limit" = Option<usize>, Query, description = "At most 100"),
    ),
    responses((status = 200, description = "Similar listings", body = ProductsResponse)),
    tag = "search"
)]
pub async fn similar_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductsResponse>> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_SIMILAR, MAX_LIST)?;
    let products = state.search.similar_products(&id, limit).await?;
    Ok(Json(ProductsResponse { products }))
}

/// GET /search/category/{category}
#[utoipa::path(
    get,
    path = "/search/category/{category}",
    params(
        ("category" = String, Path, description = "Category name"),
        ("page" = Option<u32>, Query, description = "Zero-based page"),
        ("limit" = Option<u32>, Query, description = "Page size, at most 100"),
    ),
    responses((status = 200, description = "Listings in the category", body = SearchResult)),
    tag = "search"
)]
pub async fn category_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<SearchResult>> {
    let (page, page_size) = parse_paging(params.page.as_deref(), params.limit.as_deref())?;
    let result = state
        .search
        .products_by_category(&category, page, page_size)
        .await?;
    Ok(Json(result))
}

/// POST /analytics/click
#[utoipa::path(
    post,
    path = "/analytics/click",
    request_body = ClickEvent,
    responses((status = 202, description = "Event accepted", body = MessageResponse)),
    tag = "search"
)]
pub async fn track_click_handler(
    State(state): State<AppState>,
    RequestContext(caller): RequestContext,
    Json(mut event): Json<ClickEvent>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    if event.product_id.trim().is_empty() {
        return Err(SearchError::validation("productId", "is required"));
    }
    if event.user_id.is_none() {
        event.user_id = caller.user_id;
    }
    state.search.track_click(event);
    Ok(accepted())
}

/// POST /analytics/conversion
#[utoipa::path(
    post,
    path = "/analytics/conversion",
    request_body = ConversionEvent,
    responses((status = 202, description = "Event accepted", body = MessageResponse)),
    tag = "search"
)]
pub async fn track_conversion_handler(
    State(state): State<AppState>,
    RequestContext(caller): RequestContext,
    Json(mut event): Json<ConversionEvent>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    if event.product_id.trim().is_empty() {
        return Err(SearchError::validation("productId", "is required"));
    }
    if event.user_id.is_none() {
        event.user_id = caller.user_id;
    }
    state.search.track_conversion(event);
    Ok(accepted())
}

fn accepted() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            success: true,
            message: "Event accepted".to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None, 5, 20).unwrap(), 5);
        assert_eq!(parse_limit(Some(" "), 5, 20).unwrap(), 5);
        assert_eq!(parse_limit(Some("7"), 5, 20).unwrap(), 7);
        assert_eq!(parse_limit(Some("500"), 5, 20).unwrap(), 20);
        assert_eq!(parse_limit(Some("0"), 5, 20).unwrap_err().field(), Some("limit"));
        assert!(parse_limit(Some("-3"), 5, 20).is_err());
    }
}
