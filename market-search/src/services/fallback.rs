// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Relational search used when the hosted index is unavailable. Ranking is
//! plain sorting; there is no typo tolerance, no facets and no timing.

use crate::error::Result;
use crate::models::product::{ProductInclude, ProductOrder, ProductQuery, ProductStatus};
use crate::models::search::{
    total_pages, SearchDocument, SearchFilters, SearchHit, SearchResult, SortBy, Suggestion,
    MAX_PAGE_SIZE,
};
use crate::services::backend::{similar_price_bounds, suggestion_query_ok, SearchBackend};
use crate::services::product_repo::ProductRepository;
use crate::services::transformer::to_search_document;
use async_trait::async_trait;
use std::sync::Arc;

/// Sort order used by the database path. Every order ends with `id ASC`.
pub fn product_order(sort_by: SortBy) -> ProductOrder {
    match sort_by {
        SortBy::Relevance | SortBy::Newest => ProductOrder::CreatedAtDesc,
        SortBy::PriceAsc => ProductOrder::PriceAsc,
        SortBy::PriceDesc => ProductOrder::PriceDesc,
        SortBy::Popular => ProductOrder::ViewsDesc,
        SortBy::Favorites => ProductOrder::FavoritesDesc,
    }
}

/// Translate search filters into a repository query over available listings.
pub fn to_product_query(filters: &SearchFilters, page: u32, page_size: u32) -> ProductQuery {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    ProductQuery {
        text: filters.has_query().then(|| filters.query.trim().to_string()),
        categories: filters.categories.clone(),
        brands: filters.brands.clone(),
        conditions: filters.conditions.clone(),
        sizes: filters.sizes.clone(),
        colors: filters.colors.clone(),
        min_price: filters.price_range.min,
        max_price: filters.price_range.max,
        min_seller_rating: filters.seller_rating,
        available_for_trade: filters.available_for_trade,
        status: Some(ProductStatus::Available),
        exclude_id: None,
        order: product_order(filters.sort_by),
        offset: page as u64 * page_size as u64,
        limit: page_size as u64,
    }
}

pub struct DatabaseSearch {
    products: Arc<dyn ProductRepository>,
}

impl DatabaseSearch {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    async fn documents(&self, query: &ProductQuery) -> Result<Vec<SearchDocument>> {
        let records = self.products.find_many(query, ProductInclude::all()).await?;
        Ok(records.iter().map(to_search_document).collect())
    }
}

#[async_trait]
impl SearchBackend for DatabaseSearch {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        let query = to_product_query(filters, page, page_size);
        let total = self.products.count(&query).await?;
        let hits = self
            .documents(&query)
            .await?
            .into_iter()
            .map(SearchHit::from)
            .collect();

        Ok(SearchResult {
            hits,
            total_hits: total,
            page,
            total_pages: total_pages(total, query.limit as u32),
            processing_time_ms: 0,
            facets: Default::default(),
        })
    }

    async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let query = query.trim();
        if !suggestion_query_ok(query) || limit == 0 {
            return Ok(Vec::new());
        }
        let titles = self.products.title_counts(query, limit as u64).await?;
        Ok(titles
            .into_iter()
            .map(|(title, count)| Suggestion {
                query: title,
                category: None,
                count,
            })
            .collect())
    }

    async fn popular_products(&self, limit: usize) -> Result<Vec<SearchDocument>> {
        let query = ProductQuery {
            status: Some(ProductStatus::Available),
            order: ProductOrder::ViewsDesc,
            limit: limit.min(MAX_PAGE_SIZE as usize) as u64,
            ..Default::default()
        };
        self.documents(&query).await
    }

    async fn similar_products(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>> {
        let Some(source) = self.products.find_by_id(product_id).await? else {
            return Ok(Vec::new());
        };
        let (min, max) = similar_price_bounds(source.price.as_f64());

        let query = ProductQuery {
            categories: source
                .category
                .as_ref()
                .map(|c| vec![c.name.clone()])
                .unwrap_or_default(),
            min_price: Some(min),
            max_price: Some(max),
            status: Some(ProductStatus::Available),
            exclude_id: Some(product_id.to_string()),
            order: ProductOrder::ViewsDesc,
            limit: limit.min(MAX_PAGE_SIZE as usize) as u64,
            ..Default::default()
        };
        let documents = self.documents(&query).await?;
        Ok(documents
            .into_iter()
            .filter(|d| d.id != product_id)
            .collect())
    }

    async fn products_by_category(
        &self,
        category: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        let filters = SearchFilters {
            categories: vec![category.to_string()],
            sort_by: SortBy::Newest,
            ..Default::default()
        };
        self.search(&filters, page, page_size).await
    }
}
