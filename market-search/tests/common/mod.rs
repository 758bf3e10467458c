// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use market_search::app::AppState;
use market_search::error::{Result, SearchError};
use market_search::models::analytics::{ClickEvent, ConversionEvent, SearchAnalytics};
use market_search::models::product::{
    CategorySummary, PriceValue, ProductRecord, ProductStatus, SellerSummary,
};
use market_search::models::search::{
    total_pages, SearchDocument, SearchFilters, SearchHit, SearchResult, SortBy, Suggestion,
};
use market_search::services::auth::StaticAuthContext;
use market_search::services::backend::{similar_price_bounds, SearchBackend, SearchEngine};
use market_search::services::cache::Cache;
use market_search::services::fallback::DatabaseSearch;
use market_search::services::history::{HistoryService, InMemoryHistoryStore};
use market_search::services::product_repo::{InMemoryProductRepository, ProductRepository};
use market_search::services::rate_limit::{RateLimitConfig, RateLimiter};
use market_search::services::saved_search::InMemorySavedSearchStore;
use market_search::services::transformer::to_search_document;
use market_search::services::unified::{SearchServiceConfig, UnifiedSearchService};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const USER_ONE_TOKEN: &str = "session-u1";
pub const USER_TWO_TOKEN: &str = "session-u2";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn listing(id: &str, title: &str, category: &str, price: f64) -> ProductRecord {
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    ProductRecord {
        id: id.to_string(),
        title: title.to_string(),
        description: format!("{title} in good shape"),
        brand: Some("Acme".to_string()),
        price: PriceValue::Number(price),
        condition: "GOOD".to_string(),
        size: Some("M".to_string()),
        color: Some("black".to_string()),
        status: ProductStatus::Available,
        views: 0,
        favorites_count: 0,
        available_for_trade: false,
        created_at: created,
        updated_at: created,
        seller: Some(SellerSummary {
            id: "seller-1".to_string(),
            first_name: Some("Ana".to_string()),
            last_name: Some("Silva".to_string()),
            rating: Some(4.2),
            location: Some("Porto".to_string()),
        }),
        category: Some(CategorySummary {
            id: format!("cat-{}", category.to_lowercase()),
            name: category.to_string(),
        }),
        images: vec![format!("https://cdn.example.com/{id}.jpg")],
    }
}

pub fn with_status(mut product: ProductRecord, status: ProductStatus) -> ProductRecord {
    product.status = status;
    product
}

/// Three phones priced 450, 799 and 1200.
pub fn iphone_catalog() -> Vec<ProductRecord> {
    vec![
        listing("phone-450", "iPhone 12", "Electronics", 450.0),
        listing("phone-799", "iPhone 13", "Electronics", 799.0),
        listing("phone-1200", "iPhone 15 Pro", "Electronics", 1200.0),
    ]
}

/// A mixed catalogue with unavailable listings in every category.
pub fn mixed_catalog() -> Vec<ProductRecord> {
    let mut products = vec![
        listing("dress-1", "Red silk dress", "Dresses", 40.0),
        listing("dress-2", "Blue cotton dress", "Dresses", 55.0),
        with_status(
            listing("dress-3", "Red wool dress", "Dresses", 45.0),
            ProductStatus::Sold,
        ),
        listing("boots-1", "Leather boots", "Shoes", 90.0),
        with_status(
            listing("boots-2", "Suede boots", "Shoes", 85.0),
            ProductStatus::Reserved,
        ),
        with_status(
            listing("bag-1", "Canvas tote bag", "Bags", 20.0),
            ProductStatus::Removed,
        ),
        listing("bag-2", "Leather bag", "Bags", 120.0),
    ];
    for (n, product) in products.iter_mut().enumerate() {
        product.views = (n as i64 * 7) % 5;
        product.created_at += Duration::hours(n as i64);
        product.available_for_trade = n % 2 == 0;
    }
    products
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// Engine double holding documents in memory. Reads apply the same
/// availability rule as the hosted index and report a non-zero timing.
#[derive(Default)]
pub struct InMemorySearchEngine {
    documents: RwLock<BTreeMap<String, SearchDocument>>,
    pub search_calls: AtomicUsize,
    pub clicks: Mutex<Vec<ClickEvent>>,
    pub conversions: Mutex<Vec<ConversionEvent>>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, id: &str) -> Option<SearchDocument> {
        self.documents.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    fn matches(doc: &SearchDocument, filters: &SearchFilters) -> bool {
        let in_list = |values: &[String], value: &str| {
            values.is_empty() || values.iter().any(|v| v == value)
        };
        let query = filters.query.trim().to_lowercase();
        let text_ok = query.is_empty()
            || doc.id == query
            || doc.title.to_lowercase().contains(&query)
            || doc.description.to_lowercase().contains(&query)
            || doc.brand.to_lowercase().contains(&query);

        doc.status == ProductStatus::Available.as_str()
            && text_ok
            && in_list(&filters.categories, &doc.category)
            && in_list(&filters.brands, &doc.brand)
            && in_list(&filters.conditions, &doc.condition)
            && in_list(&filters.sizes, &doc.size)
            && (filters.colors.is_empty() || doc.colors.iter().any(|c| filters.colors.contains(c)))
            && filters.price_range.min.is_none_or(|min| doc.price >= min)
            && filters.price_range.max.is_none_or(|max| doc.price <= max)
            && filters.seller_rating.is_none_or(|r| doc.seller_rating >= r)
            && filters
                .available_for_trade
                .is_none_or(|t| doc.available_for_trade == t)
    }

    fn compare(sort_by: SortBy, a: &SearchDocument, b: &SearchDocument) -> Ordering {
        let primary = match sort_by {
            SortBy::Relevance => Ordering::Equal,
            SortBy::Newest => b.created_at.cmp(&a.created_at),
            SortBy::PriceAsc => a.price.total_cmp(&b.price),
            SortBy::PriceDesc => b.price.total_cmp(&a.price),
            SortBy::Popular => b.views.cmp(&a.views),
            SortBy::Favorites => b.favorites.cmp(&a.favorites),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

#[async_trait]
impl SearchBackend for InMemorySearchEngine {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        self.search_calls.fetch_add(1, AtomicOrdering::SeqCst);
        let mut matching: Vec<SearchDocument> = self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| Self::matches(d, filters))
            .cloned()
            .collect();
        matching.sort_by(|a, b| Self::compare(filters.sort_by, a, b));

        let total = matching.len() as u64;
        let hits = matching
            .into_iter()
            .skip(page as usize * page_size as usize)
            .take(page_size as usize)
            .map(SearchHit::from)
            .collect();
        Ok(SearchResult {
            hits,
            total_hits: total,
            page,
            total_pages: total_pages(total, page_size),
            processing_time_ms: 3,
            facets: Default::default(),
        })
    }

    async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let result = self.search(&SearchFilters::with_query(query), 0, 1).await?;
        Ok(vec![Suggestion {
            query: query.to_string(),
            category: None,
            count: result.total_hits,
        }]
        .into_iter()
        .take(limit)
        .collect())
    }

    async fn popular_products(&self, limit: usize) -> Result<Vec<SearchDocument>> {
        let filters = SearchFilters {
            sort_by: SortBy::Popular,
            ..Default::default()
        };
        let result = self.search(&filters, 0, limit as u32).await?;
        Ok(result.hits.into_iter().map(|h| h.document).collect())
    }

    async fn similar_products(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>> {
        let Some(source) = self.document(product_id) else {
            return Ok(Vec::new());
        };
        let (min, max) = similar_price_bounds(source.price);
        let filters = SearchFilters {
            categories: vec![source.category.clone()],
            price_range: market_search::models::search::PriceRange {
                min: Some(min),
                max: Some(max),
            },
            ..Default::default()
        };
        // Deliberately leaves the source in; callers must drop it.
        let result = self.search(&filters, 0, limit as u32 + 1).await?;
        Ok(result.hits.into_iter().map(|h| h.document).collect())
    }

    async fn products_by_category(
        &self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        let filters = SearchFilters {
            categories: vec![category.to_string()],
            ..Default::default()
        };
        self.search(&filters, page, page_size).await
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn index(&self, documents: &[SearchDocument]) -> Result<usize> {
        let mut stored = self.documents.write().unwrap();
        for doc in documents {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(documents.len())
    }

    async fn update_product(&self, document: &SearchDocument) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_product(&self, product_id: &str) -> Result<()> {
        self.documents.write().unwrap().remove(product_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().unwrap().clear();
        Ok(())
    }

    async fn track_click(&self, event: &ClickEvent) {
        self.clicks.lock().unwrap().push(event.clone());
    }

    async fn track_conversion(&self, event: &ConversionEvent) {
        self.conversions.lock().unwrap().push(event.clone());
    }

    async fn analytics(&self) -> SearchAnalytics {
        SearchAnalytics {
            available: true,
            number_of_documents: self.len() as u64,
            ..Default::default()
        }
    }
}

/// Engine whose every call fails, as during a vendor outage.
#[derive(Default)]
pub struct FailingEngine {
    pub calls: AtomicUsize,
}

impl FailingEngine {
    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        Err(SearchError::Upstream("simulated outage".to_string()))
    }
}

#[async_trait]
impl SearchBackend for FailingEngine {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _: &SearchFilters, _: u32, _: u32) -> Result<SearchResult> {
        self.fail()
    }

    async fn suggestions(&self, _: &str, _: usize) -> Result<Vec<Suggestion>> {
        self.fail()
    }

    async fn popular_products(&self, _: usize) -> Result<Vec<SearchDocument>> {
        self.fail()
    }

    async fn similar_products(&self, _: &str, _: usize) -> Result<Vec<SearchDocument>> {
        self.fail()
    }

    async fn products_by_category(&self, _: &str, _: u32, _: u32) -> Result<SearchResult> {
        self.fail()
    }
}

#[async_trait]
impl SearchEngine for FailingEngine {
    async fn index(&self, _: &[SearchDocument]) -> Result<usize> {
        self.fail()
    }

    async fn update_product(&self, _: &SearchDocument) -> Result<()> {
        self.fail()
    }

    async fn delete_product(&self, _: &str) -> Result<()> {
        self.fail()
    }

    async fn clear(&self) -> Result<()> {
        self.fail()
    }

    async fn track_click(&self, _: &ClickEvent) {}

    async fn track_conversion(&self, _: &ConversionEvent) {}

    async fn analytics(&self) -> SearchAnalytics {
        SearchAnalytics::default()
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub products: Arc<InMemoryProductRepository>,
    pub history: Arc<HistoryService>,
    pub service: Arc<UnifiedSearchService>,
}

pub fn harness(
    products: Vec<ProductRecord>,
    engine: Option<Arc<dyn SearchEngine>>,
    config: SearchServiceConfig,
) -> Harness {
    let repo = Arc::new(InMemoryProductRepository::new(products));
    let history = Arc::new(HistoryService::new(Some(Arc::new(
        InMemoryHistoryStore::new(),
    ))));
    let dyn_repo: Arc<dyn ProductRepository> = repo.clone();
    let service = Arc::new(UnifiedSearchService::new(
        engine,
        Arc::new(DatabaseSearch::new(dyn_repo.clone())),
        dyn_repo,
        Cache::in_memory(),
        history.clone(),
        config,
    ));
    Harness {
        products: repo,
        history,
        service,
    }
}

/// Engine pre-loaded with every listing of `products`, whatever its status.
pub async fn engine_with(products: &[ProductRecord]) -> Arc<InMemorySearchEngine> {
    let engine = Arc::new(InMemorySearchEngine::new());
    let docs: Vec<SearchDocument> = products.iter().map(to_search_document).collect();
    engine.index(&docs).await.unwrap();
    engine
}

pub fn app_state(harness: &Harness, rate_limit: RateLimitConfig) -> AppState {
    AppState {
        search: harness.service.clone(),
        history: harness.history.clone(),
        saved_searches: Arc::new(InMemorySavedSearchStore::new()),
        auth: Arc::new(
            StaticAuthContext::new()
                .with_session(USER_ONE_TOKEN, "u1")
                .with_session(USER_TWO_TOKEN, "u2"),
        ),
        rate_limiter: Arc::new(RateLimiter::new(rate_limit)),
        admin_token: Some(ADMIN_TOKEN.to_string()),
    }
}

/// Poll `check` until it holds; detached writes land shortly after the response.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    false
}
