// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle status of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Available,
    Sold,
    Reserved,
    Removed,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Available => "AVAILABLE",
            ProductStatus::Sold => "SOLD",
            ProductStatus::Reserved => "RESERVED",
            ProductStatus::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(ProductStatus::Available),
            "SOLD" => Some(ProductStatus::Sold),
            "RESERVED" => Some(ProductStatus::Reserved),
            "REMOVED" => Some(ProductStatus::Removed),
            _ => None,
        }
    }

    /// Only available listings are visible to buyers and may live in the index.
    pub fn is_searchable(&self) -> bool {
        matches!(self, ProductStatus::Available)
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price as it arrives from the store or from JSON payloads.
///
/// Decimal columns may surface as plain numbers or as numeric strings, so the
/// value is kept loosely typed until [`PriceValue::as_f64`] coerces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum PriceValue {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl PriceValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            PriceValue::Number(n) if n.is_finite() => *n,
            PriceValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

impl From<f64> for PriceValue {
    fn from(value: f64) -> Self {
        PriceValue::Number(value)
    }
}

/// Seller fields joined onto a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SellerSummary {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub rating: Option<f64>,
    pub location: Option<String>,
}

impl SellerSummary {
    pub fn display_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
}

/// A listing with the associations the search layer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub brand: Option<String>,
    pub price: PriceValue,
    pub condition: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub status: ProductStatus,
    pub views: i64,
    pub favorites_count: i64,
    pub available_for_trade: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seller: Option<SellerSummary>,
    pub category: Option<CategorySummary>,
    pub images: Vec<String>,
}

/// Which associations to load alongside each listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductInclude {
    pub seller: bool,
    pub category: bool,
    pub images: bool,
    pub favorites: bool,
}

impl ProductInclude {
    /// Everything needed to build a search document.
    pub fn all() -> Self {
        Self {
            seller: true,
            category: true,
            images: true,
            favorites: true,
        }
    }
}

/// Column and direction a product listing query is ordered by.
///
/// Every ordering is followed by `id ASC`, so equal sort keys come back in a
/// stable order on every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductOrder {
    #[default]
    CreatedAtDesc,
    PriceAsc,
    PriceDesc,
    ViewsDesc,
    FavoritesDesc,
    IdAsc,
}

/// Structured filter handed to [`crate::services::product_repo::ProductRepository`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductQuery {
    /// Case-insensitive substring matched against title, description and brand.
    pub text: Option<String>,
    /// Category names.
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub conditions: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_seller_rating: Option<f64>,
    pub available_for_trade: Option<bool>,
    pub status: Option<ProductStatus>,
    pub exclude_id: Option<String>,
    pub order: ProductOrder,
    pub offset: u64,
    pub limit: u64,
}
