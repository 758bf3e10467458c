// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Seams between the orchestrator and the two search paths.

use crate::error::Result;
use crate::models::analytics::{ClickEvent, ConversionEvent, SearchAnalytics};
use crate::models::search::{SearchDocument, SearchFilters, SearchResult, Suggestion};
use async_trait::async_trait;

/// Shortest query that produces autocomplete suggestions.
pub const MIN_SUGGESTION_QUERY_LEN: usize = 2;

/// Read side shared by the hosted engine and the database fallback. Both
/// return only available listings and the same response shapes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult>;

    async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<Suggestion>>;

    async fn popular_products(&self, limit: usize) -> Result<Vec<SearchDocument>>;

    /// Listings in the same category priced within half to double the source
    /// listing's price. Never contains `product_id` itself.
    async fn similar_products(&self, product_id: &str, limit: usize)
        -> Result<Vec<SearchDocument>>;

    async fn products_by_category(
        &self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult>;
}

/// Write side and telemetry of the hosted index.
#[async_trait]
pub trait SearchEngine: SearchBackend {
    /// Bulk upsert. Returns the number of documents sent.
    async fn index(&self, documents: &[SearchDocument]) -> Result<usize>;

    async fn update_product(&self, document: &SearchDocument) -> Result<()>;

    async fn delete_product(&self, product_id: &str) -> Result<()>;

    /// Remove every document from the index.
    async fn clear(&self) -> Result<()>;

    /// Best effort; never fails.
    async fn track_click(&self, event: &ClickEvent);

    /// Best effort; never fails.
    async fn track_conversion(&self, event: &ConversionEvent);

    /// Best effort; returns an empty snapshot when the engine cannot be reached.
    async fn analytics(&self) -> SearchAnalytics;
}

/// True when `query` is long enough to ask for suggestions.
pub fn suggestion_query_ok(query: &str) -> bool {
    query.trim().chars().count() >= MIN_SUGGESTION_QUERY_LEN
}

/// Price window used for "similar" listings.
pub fn similar_price_bounds(price: f64) -> (f64, f64) {
    (price * 0.5, price * 2.0)
}
