// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Single entry point for product search. Tries the hosted engine, falls back
//! to the database, caches what it returns, and records history on the side.

use crate::error::{Result, SearchError};
use crate::models::analytics::{ClickEvent, ConversionEvent, SearchAnalytics};
use crate::models::history::SearchHistoryItem;
use crate::models::product::{ProductInclude, ProductOrder, ProductQuery, ProductStatus};
use crate::models::search::{
    SearchDocument, SearchFilters, SearchResult, Suggestion, MAX_PAGE_SIZE,
};
use crate::services::backend::{suggestion_query_ok, SearchBackend, SearchEngine};
use crate::services::cache::Cache;
use crate::services::history::{HistoryService, SearchCaller};
use crate::services::logging::truncate_for_log;
use crate::services::product_repo::ProductRepository;
use crate::services::transformer::to_search_document;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Tag carried by every cached result derived from listings.
pub const SEARCH_TAG: &str = "search";

/// Listings loaded per round trip during a full reindex.
const REINDEX_BATCH_SIZE: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchServiceConfig {
    /// Route reads through the hosted engine when one is configured.
    pub use_engine: bool,
    /// Answer from the database when the engine fails.
    pub fallback_enabled: bool,
    pub cache_enabled: bool,
    pub track_history: bool,
    pub search_ttl: Duration,
    pub suggestion_ttl: Duration,
    pub popular_ttl: Duration,
}

impl Default for SearchServiceConfig {
    fn default() -> Self {
        Self {
            use_engine: true,
            fallback_enabled: true,
            cache_enabled: true,
            track_history: true,
            search_ttl: Duration::from_secs(300),
            suggestion_ttl: Duration::from_secs(3600),
            popular_ttl: Duration::from_secs(900),
        }
    }
}

impl SearchServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            use_engine: env_flag("SEARCH_USE_ENGINE", defaults.use_engine),
            fallback_enabled: env_flag("SEARCH_FALLBACK_ENABLED", defaults.fallback_enabled),
            cache_enabled: env_flag("SEARCH_CACHE_ENABLED", defaults.cache_enabled),
            track_history: env_flag("SEARCH_TRACK_HISTORY", defaults.track_history),
            search_ttl: env_secs("SEARCH_CACHE_TTL_SECS", defaults.search_ttl),
            suggestion_ttl: env_secs("SUGGESTION_CACHE_TTL_SECS", defaults.suggestion_ttl),
            popular_ttl: env_secs("POPULAR_CACHE_TTL_SECS", defaults.popular_ttl),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name).map(|v| v.trim().to_ascii_lowercase()) {
        Ok(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Ok(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Cache key for a search call: the full `(filters, page, pageSize)` tuple.
pub fn cache_key(filters: &SearchFilters, page: u32, page_size: u32) -> String {
    keyed("search", &(filters, page, page_size))
}

fn keyed<T: Serialize + std::fmt::Debug>(prefix: &str, parts: &T) -> String {
    match serde_json::to_string(parts) {
        Ok(json) => format!("{prefix}:{json}"),
        Err(_) => format!("{prefix}:{parts:?}"),
    }
}

pub struct UnifiedSearchService {
    engine: Option<Arc<dyn SearchEngine>>,
    fallback: Arc<dyn SearchBackend>,
    products: Arc<dyn ProductRepository>,
    cache: Cache,
    history: Arc<HistoryService>,
    config: SearchServiceConfig,
}

impl UnifiedSearchService {
    pub fn new(
        engine: Option<Arc<dyn SearchEngine>>,
        fallback: Arc<dyn SearchBackend>,
        products: Arc<dyn ProductRepository>,
        cache: Cache,
        history: Arc<HistoryService>,
        config: SearchServiceConfig,
    ) -> Self {
        Self {
            engine,
            fallback,
            products,
            cache,
            history,
            config,
        }
    }

    /// The engine when reads may use it.
    fn engine(&self) -> Option<&Arc<dyn SearchEngine>> {
        self.engine.as_ref().filter(|_| self.config.use_engine)
    }

    pub fn engine_enabled(&self) -> bool {
        self.engine().is_some()
    }

    /// The engine for writes and admin calls, whatever `use_engine` says.
    fn writable_engine(&self) -> Result<&Arc<dyn SearchEngine>> {
        self.engine
            .as_ref()
            .ok_or_else(|| SearchError::Upstream("Search engine is not configured".to_string()))
    }

    /// Await `primary` and fall back to `fallback` on error when allowed.
    /// Both futures are lazy, so the database is only queried when needed.
    async fn with_fallback<T>(
        &self,
        op: &str,
        primary: Option<impl Future<Output = Result<T>>>,
        fallback: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(primary) = primary else {
            return fallback.await;
        };
        match primary.await {
            Ok(value) => Ok(value),
            Err(e) if self.config.fallback_enabled => {
                tracing::warn!(
                    "{} via search engine failed, using {}: {}",
                    op,
                    self.fallback.name(),
                    e
                );
                fallback.await
            }
            Err(e) => Err(e),
        }
    }

    async fn cached<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[&str],
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.config.cache_enabled {
            self.cache.remember(key, ttl, tags, factory).await
        } else {
            factory().await
        }
    }

    /// Search listings. The response shape does not depend on which path
    /// served it.
    pub async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
        caller: &SearchCaller,
    ) -> Result<SearchResult> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let key = cache_key(filters, page, page_size);

        let cached = if self.config.cache_enabled {
            self.cache.get::<SearchResult>(&key).await
        } else {
            None
        };

        let result = match cached {
            Some(hit) => {
                tracing::debug!("Cache hit for '{}'", truncate_for_log(&filters.query));
                hit
            }
            None => {
                let primary = self
                    .engine()
                    .map(|engine| engine.search(filters, page, page_size));
                let result = self
                    .with_fallback(
                        "Search",
                        primary,
                        self.fallback.search(filters, page, page_size),
                    )
                    .await?;
                if self.config.cache_enabled {
                    self.cache
                        .set(&key, &result, self.config.search_ttl, &[SEARCH_TAG])
                        .await;
                }
                result
            }
        };

        self.record_history(filters, result.total_hits, caller);
        Ok(result)
    }

    /// Append to the caller's history without holding up the response.
    fn record_history(&self, filters: &SearchFilters, total_hits: u64, caller: &SearchCaller) {
        if !self.config.track_history || !filters.has_query() || caller.is_anonymous() {
            return;
        }
        let history = Arc::clone(&self.history);
        let caller = caller.clone();
        let item = SearchHistoryItem::new(filters.query.trim(), filters.clone(), total_hits);
        tokio::spawn(async move {
            if let Err(e) = history.record(&caller, item).await {
                tracing::warn!("Failed to record search history: {}", e);
            }
        });
    }

    pub async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let query = query.trim();
        if !suggestion_query_ok(query) || limit == 0 {
            return Ok(Vec::new());
        }
        let key = keyed("suggestions", &(query.to_lowercase(), limit));
        self.cached(
            &key,
            self.config.suggestion_ttl,
            &[SEARCH_TAG],
            || async {
                let primary = self.engine().map(|engine| engine.suggestions(query, limit));
                self.with_fallback(
                    "Suggestions",
                    primary,
                    self.fallback.suggestions(query, limit),
                )
                .await
            },
        )
        .await
    }

    pub async fn popular_products(&self, limit: usize) -> Result<Vec<SearchDocument>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE as usize);
        let key = keyed("popular", &limit);
        self.cached(
            &key,
            self.config.popular_ttl,
            &[SEARCH_TAG],
            || async {
                let primary = self.engine().map(|engine| engine.popular_products(limit));
                self.with_fallback(
                    "Popular products",
                    primary,
                    self.fallback.popular_products(limit),
                )
                .await
            },
        )
        .await
    }

    /// Listings like `product_id`; never includes `product_id` itself.
    pub async fn similar_products(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE as usize);
        let key = keyed("similar", &(product_id, limit));
        let mut documents: Vec<SearchDocument> = self
            .cached(&key, self.config.search_ttl, &[SEARCH_TAG], || async {
                let primary = self
                    .engine()
                    .map(|engine| engine.similar_products(product_id, limit));
                self.with_fallback(
                    "Similar products",
                    primary,
                    self.fallback.similar_products(product_id, limit),
                )
                .await
            })
            .await?;
        documents.retain(|d| d.id != product_id);
        Ok(documents)
    }

    pub async fn products_by_category(
        &self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let key = keyed("category", &(category, page, page_size));
        self.cached(&key, self.config.search_ttl, &[SEARCH_TAG], || async {
            let primary = self
                .engine()
                .map(|engine| engine.products_by_category(category, page, page_size));
            self.with_fallback(
                "Category listing",
                primary,
                self.fallback.products_by_category(category, page, page_size),
            )
            .await
        })
        .await
    }

    // ----- index synchronization -------------------------------------------

    /// Bring the index in line with the stored listing: upsert when it is
    /// available, remove it otherwise.
    pub async fn on_product_saved(&self, product_id: &str) -> Result<()> {
        self.cache.invalidate_tag(SEARCH_TAG).await;
        let Some(engine) = self.engine.as_ref() else {
            return Ok(());
        };

        match self.products.find_by_id(product_id).await? {
            Some(product) if product.status.is_searchable() => {
                engine.update_product(&to_search_document(&product)).await?;
                tracing::info!("Synced product {} to search index", product_id);
            }
            Some(product) => {
                engine.delete_product(product_id).await?;
                tracing::info!(
                    "Removed product {} from search index (status {})",
                    product_id,
                    product.status
                );
            }
            None => {
                engine.delete_product(product_id).await?;
                tracing::info!("Removed missing product {} from search index", product_id);
            }
        }
        Ok(())
    }

    pub async fn on_product_deleted(&self, product_id: &str) -> Result<()> {
        self.cache.invalidate_tag(SEARCH_TAG).await;
        if let Some(engine) = self.engine.as_ref() {
            engine.delete_product(product_id).await?;
            tracing::info!("Removed product {} from search index", product_id);
        }
        Ok(())
    }

    /// Push every available listing to the engine. Returns the number indexed.
    pub async fn reindex_all(&self) -> Result<usize> {
        let engine = self.writable_engine()?;
        let mut query = ProductQuery {
            status: Some(ProductStatus::Available),
            order: ProductOrder::IdAsc,
            limit: REINDEX_BATCH_SIZE,
            ..Default::default()
        };

        let mut indexed = 0;
        loop {
            let batch = self.products.find_many(&query, ProductInclude::all()).await?;
            if batch.is_empty() {
                break;
            }
            let documents: Vec<SearchDocument> = batch.iter().map(to_search_document).collect();
            indexed += engine.index(&documents).await?;
            tracing::info!("Reindex progress: {} products", indexed);

            if (batch.len() as u64) < REINDEX_BATCH_SIZE {
                break;
            }
            query.offset += REINDEX_BATCH_SIZE;
        }

        self.cache.invalidate_tag(SEARCH_TAG).await;
        tracing::info!("Reindexed {} products", indexed);
        Ok(indexed)
    }

    pub async fn clear_index(&self) -> Result<()> {
        self.writable_engine()?.clear().await?;
        self.cache.clear().await;
        Ok(())
    }

    // ----- analytics -------------------------------------------------------

    pub fn track_click(&self, event: ClickEvent) {
        if let Some(engine) = self.engine.clone() {
            tokio::spawn(async move { engine.track_click(&event).await });
        }
    }

    pub fn track_conversion(&self, event: ConversionEvent) {
        if let Some(engine) = self.engine.clone() {
            tokio::spawn(async move { engine.track_conversion(&event).await });
        }
    }

    pub async fn analytics(&self) -> SearchAnalytics {
        match self.engine.as_ref() {
            Some(engine) => engine.analytics().await,
            None => SearchAnalytics::default(),
        }
    }
}
