// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::models::search::SearchFilters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Upper bound on history entries kept per visitor and per user.
pub const MAX_HISTORY_ITEMS: usize = 50;

/// A past query and what it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryItem {
    pub query: String,
    pub filters: SearchFilters,
    pub result_count: u64,
    pub searched_at: DateTime<Utc>,
}

impl SearchHistoryItem {
    pub fn new(query: impl Into<String>, filters: SearchFilters, result_count: u64) -> Self {
        Self {
            query: query.into(),
            filters,
            result_count,
            searched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchHistoryResponse {
    pub history: Vec<SearchHistoryItem>,
    pub count: usize,
}

/// A named query a user keeps around, optionally with alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub query: String,
    pub filters: SearchFilters,
    pub alerts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /saved-searches`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSavedSearchRequest {
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub alerts_enabled: bool,
}

/// Body of `PUT /saved-searches/{id}`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSavedSearchRequest {
    pub name: Option<String>,
    pub query: Option<String>,
    pub filters: Option<SearchFilters>,
    pub alerts_enabled: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedSearchListResponse {
    pub saved_searches: Vec<SavedSearch>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}
