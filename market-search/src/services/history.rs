// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Search history in two tiers: a process-local list per anonymous visitor
//! and a persisted list per signed-in user, merged at read time.

use crate::error::Result;
use crate::models::history::{SearchHistoryItem, MAX_HISTORY_ITEMS};
use crate::models::search::SearchFilters;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Who is asking: a signed-in user, an anonymous visitor, both or neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCaller {
    pub user_id: Option<String>,
    pub visitor_id: Option<String>,
}

impl SearchCaller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            visitor_id: None,
        }
    }

    pub fn visitor(visitor_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            visitor_id: Some(visitor_id.into()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none() && self.visitor_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// Anonymous tier
// ---------------------------------------------------------------------------

/// Newest-first history per visitor id, de-duplicated by query on insert.
#[derive(Default)]
pub struct LocalHistory {
    entries: DashMap<String, VecDeque<SearchHistoryItem>>,
}

impl LocalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, visitor_id: &str, item: SearchHistoryItem) {
        let mut list = self.entries.entry(visitor_id.to_string()).or_default();
        list.retain(|existing| existing.query != item.query);
        list.push_front(item);
        list.truncate(MAX_HISTORY_ITEMS);
    }

    pub fn list(&self, visitor_id: &str) -> Vec<SearchHistoryItem> {
        self.entries
            .get(visitor_id)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, visitor_id: &str) {
        self.entries.remove(visitor_id);
    }
}

// ---------------------------------------------------------------------------
// Persisted tier
// ---------------------------------------------------------------------------

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert, or refresh the existing entry with the same query.
    async fn upsert(&self, user_id: &str, item: &SearchHistoryItem) -> Result<()>;
    /// Newest first.
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<SearchHistoryItem>>;
    /// Returns the number of entries removed.
    async fn clear(&self, user_id: &str) -> Result<u64>;
}

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn upsert(&self, user_id: &str, item: &SearchHistoryItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_history (id, user_id, query, filters, result_count, searched_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, query) DO UPDATE
             SET filters = EXCLUDED.filters,
                 result_count = EXCLUDED.result_count,
                 searched_at = EXCLUDED.searched_at",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&item.query)
        .bind(Json(&item.filters))
        .bind(item.result_count as i64)
        .bind(item.searched_at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "DELETE FROM search_history
             WHERE user_id = $1 AND id NOT IN (
                 SELECT id FROM search_history
                 WHERE user_id = $1
                 ORDER BY searched_at DESC
                 LIMIT $2
             )",
        )
        .bind(user_id)
        .bind(MAX_HISTORY_ITEMS as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<SearchHistoryItem>> {
        let rows: Vec<(String, Json<SearchFilters>, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT query, filters, result_count, searched_at
             FROM search_history
             WHERE user_id = $1
             ORDER BY searched_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(query, Json(filters), result_count, searched_at)| SearchHistoryItem {
                    query,
                    filters,
                    result_count: result_count.max(0) as u64,
                    searched_at,
                },
            )
            .collect())
    }

    async fn clear(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM search_history WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// [`HistoryStore`] with the same upsert and cap semantics, held in memory.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    users: LocalHistory,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn upsert(&self, user_id: &str, item: &SearchHistoryItem) -> Result<()> {
        self.users.push(user_id, item.clone());
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<SearchHistoryItem>> {
        let mut items = self.users.list(user_id);
        items.truncate(limit);
        Ok(items)
    }

    async fn clear(&self, user_id: &str) -> Result<u64> {
        let removed = self.users.list(user_id).len() as u64;
        self.users.clear(user_id);
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// Read facade over both tiers. Writes go to exactly one tier: the persisted
/// one for signed-in users, the local one for visitors.
pub struct HistoryService {
    local: LocalHistory,
    store: Option<Arc<dyn HistoryStore>>,
}

impl HistoryService {
    pub fn new(store: Option<Arc<dyn HistoryStore>>) -> Self {
        Self {
            local: LocalHistory::new(),
            store,
        }
    }

    pub async fn record(&self, caller: &SearchCaller, item: SearchHistoryItem) -> Result<()> {
        match (&caller.user_id, &self.store, &caller.visitor_id) {
            (Some(user_id), Some(store), _) => store.upsert(user_id, &item).await,
            (_, _, Some(visitor_id)) => {
                self.local.push(visitor_id, item);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Persisted entries first, then local ones; de-duplicated by query,
    /// keeping the first occurrence, and capped.
    pub async fn list(&self, caller: &SearchCaller) -> Result<Vec<SearchHistoryItem>> {
        let persisted = match (&caller.user_id, &self.store) {
            (Some(user_id), Some(store)) => store.list(user_id, MAX_HISTORY_ITEMS).await?,
            _ => Vec::new(),
        };
        let local = caller
            .visitor_id
            .as_deref()
            .map(|visitor_id| self.local.list(visitor_id))
            .unwrap_or_default();

        Ok(merge(persisted, local))
    }

    pub async fn clear(&self, caller: &SearchCaller) -> Result<()> {
        if let (Some(user_id), Some(store)) = (&caller.user_id, &self.store) {
            let removed = store.clear(user_id).await?;
            tracing::debug!("Cleared {} history entries for user {}", removed, user_id);
        }
        if let Some(visitor_id) = &caller.visitor_id {
            self.local.clear(visitor_id);
        }
        Ok(())
    }
}

fn merge(first: Vec<SearchHistoryItem>, second: Vec<SearchHistoryItem>) -> Vec<SearchHistoryItem> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|item| seen.insert(item.query.clone()))
        .take(MAX_HISTORY_ITEMS)
        .collect()
}
