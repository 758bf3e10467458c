// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Named searches owned by a user. Every mutation is keyed by
//! `(id, user_id)`; a record owned by someone else is reported as missing.

use crate::error::{Result, SearchError};
use crate::models::history::{CreateSavedSearchRequest, SavedSearch, UpdateSavedSearchRequest};
use crate::models::search::{SearchFilters, MAX_QUERY_LENGTH};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const MAX_NAME_LENGTH: usize = 100;

#[async_trait]
pub trait SavedSearchStore: Send + Sync {
    /// Newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<SavedSearch>>;
    async fn create(&self, user_id: &str, request: CreateSavedSearchRequest)
        -> Result<SavedSearch>;
    async fn update(
        &self,
        id: Uuid,
        user_id: &str,
        request: UpdateSavedSearchRequest,
    ) -> Result<SavedSearch>;
    async fn delete(&self, id: Uuid, user_id: &str) -> Result<()>;
    async fn toggle_alerts(&self, id: Uuid, user_id: &str) -> Result<SavedSearch>;
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SearchError::validation("name", "Name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(SearchError::validation(
            "name",
            format!("Name must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(name.to_string())
}

fn validate_query(query: &str) -> Result<String> {
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(SearchError::validation(
            "query",
            format!("Query must be at most {MAX_QUERY_LENGTH} characters"),
        ));
    }
    Ok(query.trim().to_string())
}

fn not_found(id: Uuid) -> SearchError {
    SearchError::NotFound(format!("Saved search {id} not found"))
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

const SAVED_SEARCH_COLUMNS: &str =
    "id, user_id, name, query, filters, alerts_enabled, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct SavedSearchRow {
    id: Uuid,
    user_id: String,
    name: String,
    query: String,
    filters: Json<SearchFilters>,
    alerts_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SavedSearchRow> for SavedSearch {
    fn from(row: SavedSearchRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            query: row.query,
            filters: row.filters.0,
            alerts_enabled: row.alerts_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct PgSavedSearchStore {
    pool: PgPool,
}

impl PgSavedSearchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SavedSearchStore for PgSavedSearchStore {
    async fn list(&self, user_id: &str) -> Result<Vec<SavedSearch>> {
        let rows: Vec<SavedSearchRow> = sqlx::query_as(&format!(
            "SELECT {SAVED_SEARCH_COLUMNS} FROM saved_searches
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SavedSearch::from).collect())
    }

    async fn create(
        &self,
        user_id: &str,
        request: CreateSavedSearchRequest,
    ) -> Result<SavedSearch> {
        let name = validate_name(&request.name)?;
        let query = validate_query(&request.query)?;
        let row: SavedSearchRow = sqlx::query_as(&format!(
            "INSERT INTO saved_searches (id, user_id, name, query, filters, alerts_enabled)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {SAVED_SEARCH_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(name)
        .bind(query)
        .bind(Json(&request.filters))
        .bind(request.alerts_enabled)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: &str,
        request: UpdateSavedSearchRequest,
    ) -> Result<SavedSearch> {
        let name = request.name.as_deref().map(validate_name).transpose()?;
        let query = request.query.as_deref().map(validate_query).transpose()?;
        let row: Option<SavedSearchRow> = sqlx::query_as(&format!(
            "UPDATE saved_searches
             SET name = COALESCE($3, name),
                 query = COALESCE($4, query),
                 filters = COALESCE($5, filters),
                 alerts_enabled = COALESCE($6, alerts_enabled),
                 updated_at = now()
             WHERE id = $1 AND user_id = $2
             RETURNING {SAVED_SEARCH_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(query)
        .bind(request.filters.as_ref().map(Json))
        .bind(request.alerts_enabled)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SavedSearch::from).ok_or_else(|| not_found(id))
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM saved_searches WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn toggle_alerts(&self, id: Uuid, user_id: &str) -> Result<SavedSearch> {
        let row: Option<SavedSearchRow> = sqlx::query_as(&format!(
            "UPDATE saved_searches
             SET alerts_enabled = NOT alerts_enabled, updated_at = now()
             WHERE id = $1 AND user_id = $2
             RETURNING {SAVED_SEARCH_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SavedSearch::from).ok_or_else(|| not_found(id))
    }
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySavedSearchStore {
    searches: RwLock<Vec<SavedSearch>>,
}

impl InMemorySavedSearchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SavedSearchStore for InMemorySavedSearchStore {
    async fn list(&self, user_id: &str) -> Result<Vec<SavedSearch>> {
        let searches = self.searches.read().await;
        let mut owned: Vec<SavedSearch> = searches
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned)
    }

    async fn create(
        &self,
        user_id: &str,
        request: CreateSavedSearchRequest,
    ) -> Result<SavedSearch> {
        let now = Utc::now();
        let saved = SavedSearch {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            name: validate_name(&request.name)?,
            query: validate_query(&request.query)?,
            filters: request.filters,
            alerts_enabled: request.alerts_enabled,
            created_at: now,
            updated_at: now,
        };
        self.searches.write().await.push(saved.clone());
        Ok(saved)
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: &str,
        request: UpdateSavedSearchRequest,
    ) -> Result<SavedSearch> {
        let name = request.name.as_deref().map(validate_name).transpose()?;
        let query = request.query.as_deref().map(validate_query).transpose()?;

        let mut searches = self.searches.write().await;
        let saved = searches
            .iter_mut()
            .find(|s| s.id == id && s.user_id == user_id)
            .ok_or_else(|| not_found(id))?;
        if let Some(name) = name {
            saved.name = name;
        }
        if let Some(query) = query {
            saved.query = query;
        }
        if let Some(filters) = request.filters {
            saved.filters = filters;
        }
        if let Some(alerts) = request.alerts_enabled {
            saved.alerts_enabled = alerts;
        }
        saved.updated_at = Utc::now();
        Ok(saved.clone())
    }

    async fn delete(&self, id: Uuid, user_id: &str) -> Result<()> {
        let mut searches = self.searches.write().await;
        let before = searches.len();
        searches.retain(|s| !(s.id == id && s.user_id == user_id));
        if searches.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn toggle_alerts(&self, id: Uuid, user_id: &str) -> Result<SavedSearch> {
        let mut searches = self.searches.write().await;
        let saved = searches
            .iter_mut()
            .find(|s| s.id == id && s.user_id == user_id)
            .ok_or_else(|| not_found(id))?;
        saved.alerts_enabled = !saved.alerts_enabled;
        saved.updated_at = Utc::now();
        Ok(saved.clone())
    }
}
