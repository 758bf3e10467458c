// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Read access to listings in the relational store.

use crate::error::Result;
use crate::models::product::{
    CategorySummary, PriceValue, ProductInclude, ProductOrder, ProductQuery, ProductRecord,
    ProductStatus, SellerSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Listing source consumed by the fallback search and by index synchronization.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_many(
        &self,
        query: &ProductQuery,
        include: ProductInclude,
    ) -> Result<Vec<ProductRecord>>;

    /// Number of listings matching `query`, ignoring its offset and limit.
    async fn count(&self, query: &ProductQuery) -> Result<u64>;

    /// Any status; callers decide what to do with non-available listings.
    async fn find_by_id(&self, id: &str) -> Result<Option<ProductRecord>>;

    /// Available listing titles containing `fragment`, grouped with their counts,
    /// most frequent first.
    async fn title_counts(&self, fragment: &str, limit: u64) -> Result<Vec<(String, u64)>>;
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// Flat row of the product select before associations are attached.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    title: String,
    description: String,
    brand: Option<String>,
    price: Option<f64>,
    condition: String,
    size: Option<String>,
    color: Option<String>,
    status: String,
    views: i64,
    favorites_count: i64,
    available_for_trade: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    seller_id: Option<String>,
    seller_first_name: Option<String>,
    seller_last_name: Option<String>,
    seller_rating: Option<f64>,
    seller_location: Option<String>,
    category_id: Option<String>,
    category_name: Option<String>,
}

impl ProductRow {
    fn into_record(self, include: ProductInclude) -> ProductRecord {
        let seller = match (include.seller, self.seller_id) {
            (true, Some(id)) => Some(SellerSummary {
                id,
                first_name: self.seller_first_name,
                last_name: self.seller_last_name,
                rating: self.seller_rating,
                location: self.seller_location,
            }),
            _ => None,
        };
        let category = match (include.category, self.category_id, self.category_name) {
            (true, Some(id), Some(name)) => Some(CategorySummary { id, name }),
            _ => None,
        };

        ProductRecord {
            id: self.id,
            title: self.title,
            description: self.description,
            brand: self.brand,
            price: self.price.map(PriceValue::Number).unwrap_or_default(),
            condition: self.condition,
            size: self.size,
            color: self.color,
            // Unknown statuses are treated as not visible to buyers.
            status: ProductStatus::parse(&self.status).unwrap_or(ProductStatus::Removed),
            views: self.views,
            favorites_count: self.favorites_count,
            available_for_trade: self.available_for_trade,
            created_at: self.created_at,
            updated_at: self.updated_at,
            seller,
            category,
            images: Vec::new(),
        }
    }
}

const PRODUCT_FROM: &str = " FROM products p
     LEFT JOIN users u ON u.id = p.seller_id
     LEFT JOIN categories c ON c.id = p.category_id
     WHERE 1 = 1";

/// PostgreSQL-backed listing repository.
#[derive(Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select(count_favorites: bool) -> QueryBuilder<'static, Postgres> {
        let favorites = if count_favorites {
            "(SELECT COUNT(*) FROM favorites f WHERE f.product_id = p.id)"
        } else {
            "0::BIGINT"
        };
        let mut builder = QueryBuilder::new(format!(
            "SELECT p.id, p.title, p.description, p.brand, p.price::FLOAT8 AS price,
                    p.condition, p.size, p.color, p.status, p.views,
                    {favorites} AS favorites_count,
                    p.available_for_trade, p.created_at, p.updated_at,
                    u.id AS seller_id, u.first_name AS seller_first_name,
                    u.last_name AS seller_last_name, u.rating AS seller_rating,
                    u.location AS seller_location,
                    c.id AS category_id, c.name AS category_name"
        ));
        builder.push(PRODUCT_FROM);
        builder
    }

    async fn attach_images(&self, records: &mut [ProductRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT product_id, url FROM product_images
             WHERE product_id = ANY($1)
             ORDER BY product_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<String, Vec<String>> = HashMap::new();
        for (product_id, url) in rows {
            by_product.entry(product_id).or_default().push(url);
        }
        for record in records.iter_mut() {
            if let Some(images) = by_product.remove(&record.id) {
                record.images = images;
            }
        }
        Ok(())
    }
}

/// Escape LIKE metacharacters and wrap in `%..%`.
fn like_pattern(fragment: &str) -> String {
    let escaped = fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Listings without a price filter and sort as free.
const PRICE_EXPR: &str = "COALESCE(p.price::FLOAT8, 0)";

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    if let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) {
        let pattern = like_pattern(text.trim());
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.brand ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    for (column, values) in [
        ("c.name", &query.categories),
        ("p.brand", &query.brands),
        ("p.condition", &query.conditions),
        ("p.size", &query.sizes),
        ("p.color", &query.colors),
    ] {
        if !values.is_empty() {
            builder
                .push(format!(" AND {column} = ANY("))
                .push_bind(values.clone())
                .push(")");
        }
    }

    if let Some(min) = query.min_price {
        builder.push(format!(" AND {PRICE_EXPR} >= ")).push_bind(min);
    }
    if let Some(max) = query.max_price {
        builder.push(format!(" AND {PRICE_EXPR} <= ")).push_bind(max);
    }
    if let Some(rating) = query.min_seller_rating {
        builder.push(" AND u.rating >= ").push_bind(rating);
    }
    if let Some(trade) = query.available_for_trade {
        builder.push(" AND p.available_for_trade = ").push_bind(trade);
    }
    if let Some(status) = query.status {
        builder.push(" AND p.status = ").push_bind(status.as_str());
    }
    if let Some(exclude) = &query.exclude_id {
        builder.push(" AND p.id <> ").push_bind(exclude.clone());
    }
}

fn order_clause(order: ProductOrder) -> &'static str {
    match order {
        ProductOrder::CreatedAtDesc => " ORDER BY p.created_at DESC, p.id ASC",
        ProductOrder::PriceAsc => " ORDER BY COALESCE(p.price::FLOAT8, 0) ASC, p.id ASC",
        ProductOrder::PriceDesc => " ORDER BY COALESCE(p.price::FLOAT8, 0) DESC, p.id ASC",
        ProductOrder::ViewsDesc => " ORDER BY p.views DESC, p.id ASC",
        ProductOrder::FavoritesDesc => " ORDER BY favorites_count DESC, p.id ASC",
        ProductOrder::IdAsc => " ORDER BY p.id ASC",
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn find_many(
        &self,
        query: &ProductQuery,
        include: ProductInclude,
    ) -> Result<Vec<ProductRecord>> {
        let count_favorites = include.favorites || query.order == ProductOrder::FavoritesDesc;
        let mut builder = Self::select(count_favorites);
        push_filters(&mut builder, query);
        builder.push(order_clause(query.order));
        builder
            .push(" LIMIT ")
            .push_bind(query.limit as i64)
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows: Vec<ProductRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        let mut records: Vec<ProductRecord> =
            rows.into_iter().map(|r| r.into_record(include)).collect();
        if include.images {
            self.attach_images(&mut records).await?;
        }
        Ok(records)
    }

    async fn count(&self, query: &ProductQuery) -> Result<u64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*)");
        builder.push(PRODUCT_FROM);
        push_filters(&mut builder, query);
        let (count,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProductRecord>> {
        let mut builder = Self::select(true);
        builder.push(" AND p.id = ").push_bind(id.to_string());
        let row: Option<ProductRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut records = vec![row.into_record(ProductInclude::all())];
        self.attach_images(&mut records).await?;
        Ok(records.pop())
    }

    async fn title_counts(&self, fragment: &str, limit: u64) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT title, COUNT(*) AS count FROM products
             WHERE status = $1 AND title ILIKE $2
             GROUP BY title
             ORDER BY count DESC, title ASC
             LIMIT $3",
        )
        .bind(ProductStatus::Available.as_str())
        .bind(like_pattern(fragment.trim()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(title, count)| (title, count.max(0) as u64))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

/// Listing repository held in memory, with the same filter and ordering
/// semantics as [`PgProductRepository`].
#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<Vec<ProductRecord>>,
}

impl InMemoryProductRepository {
    pub fn new(products: Vec<ProductRecord>) -> Self {
        Self {
            products: RwLock::new(products),
        }
    }

    /// Insert or replace by id.
    pub async fn upsert(&self, product: ProductRecord) {
        let mut products = self.products.write().await;
        match products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => products.push(product),
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        let mut products = self.products.write().await;
        let before = products.len();
        products.retain(|p| p.id != id);
        products.len() != before
    }

    fn matches(product: &ProductRecord, query: &ProductQuery) -> bool {
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let needle = text.to_lowercase();
            let hit = product.title.to_lowercase().contains(&needle)
                || product.description.to_lowercase().contains(&needle)
                || product
                    .brand
                    .as_deref()
                    .is_some_and(|b| b.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }

        let in_list = |values: &[String], value: Option<&str>| {
            values.is_empty() || value.is_some_and(|v| values.iter().any(|x| x == v))
        };
        let category = product.category.as_ref().map(|c| c.name.as_str());
        if !in_list(&query.categories, category)
            || !in_list(&query.brands, product.brand.as_deref())
            || !in_list(&query.conditions, Some(product.condition.as_str()))
            || !in_list(&query.sizes, product.size.as_deref())
            || !in_list(&query.colors, product.color.as_deref())
        {
            return false;
        }

        let price = product.price.as_f64();
        if query.min_price.is_some_and(|min| price < min)
            || query.max_price.is_some_and(|max| price > max)
        {
            return false;
        }

        if let Some(min_rating) = query.min_seller_rating {
            let rating = product.seller.as_ref().and_then(|s| s.rating);
            if !rating.is_some_and(|r| r >= min_rating) {
                return false;
            }
        }

        query
            .available_for_trade
            .is_none_or(|trade| product.available_for_trade == trade)
            && query.status.is_none_or(|status| product.status == status)
            && query.exclude_id.as_deref() != Some(product.id.as_str())
    }

    fn compare(order: ProductOrder, a: &ProductRecord, b: &ProductRecord) -> Ordering {
        let primary = match order {
            ProductOrder::CreatedAtDesc => b.created_at.cmp(&a.created_at),
            ProductOrder::PriceAsc => a.price.as_f64().total_cmp(&b.price.as_f64()),
            ProductOrder::PriceDesc => b.price.as_f64().total_cmp(&a.price.as_f64()),
            ProductOrder::ViewsDesc => b.views.cmp(&a.views),
            ProductOrder::FavoritesDesc => b.favorites_count.cmp(&a.favorites_count),
            ProductOrder::IdAsc => Ordering::Equal,
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }

    async fn filtered(&self, query: &ProductQuery) -> Vec<ProductRecord> {
        let products = self.products.read().await;
        let mut matching: Vec<ProductRecord> = products
            .iter()
            .filter(|p| Self::matches(p, query))
            .cloned()
            .collect();
        matching.sort_by(|a, b| Self::compare(query.order, a, b));
        matching
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_many(
        &self,
        query: &ProductQuery,
        include: ProductInclude,
    ) -> Result<Vec<ProductRecord>> {
        Ok(self
            .filtered(query)
            .await
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|mut p| {
                if !include.seller {
                    p.seller = None;
                }
                if !include.category {
                    p.category = None;
                }
                if !include.images {
                    p.images.clear();
                }
                p
            })
            .collect())
    }

    async fn count(&self, query: &ProductQuery) -> Result<u64> {
        Ok(self.filtered(query).await.len() as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ProductRecord>> {
        let products = self.products.read().await;
        Ok(products.iter().find(|p| p.id == id).cloned())
    }

    async fn title_counts(&self, fragment: &str, limit: u64) -> Result<Vec<(String, u64)>> {
        let needle = fragment.trim().to_lowercase();
        let products = self.products.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for product in products
            .iter()
            .filter(|p| p.status == ProductStatus::Available)
            .filter(|p| p.title.to_lowercase().contains(&needle))
        {
            *counts.entry(product.title.as_str()).or_default() += 1;
        }

        let mut counts: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(title, count)| (title.to_string(), count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit as usize);
        Ok(counts)
    }
}
