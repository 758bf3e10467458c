// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Default number of hits per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Hard ceiling on hits per page, whatever the caller asks for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Longest free-text query accepted from clients.
pub const MAX_QUERY_LENGTH: usize = 200;

/// Denormalized listing stored in the hosted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// Product id, also the index primary key
    pub id: String,
    pub title: String,
    pub description: String,
    pub brand: String,
    pub price: f64,
    pub condition: String,
    pub size: String,
    /// Category display name
    pub category: String,
    pub category_id: String,
    pub seller_id: String,
    pub seller_name: String,
    pub seller_rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub colors: Vec<String>,
    pub materials: Vec<String>,
    pub views: i64,
    pub favorites: i64,
    pub status: String,
    pub available_for_trade: bool,
    /// Seconds since epoch
    pub created_at: i64,
    /// Seconds since epoch
    pub updated_at: i64,
}

/// Inclusive price bounds; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct PriceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Result ordering requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Newest,
    PriceAsc,
    PriceDesc,
    Popular,
    Favorites,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Newest => "newest",
            SortBy::PriceAsc => "price_asc",
            SortBy::PriceDesc => "price_desc",
            SortBy::Popular => "popular",
            SortBy::Favorites => "favorites",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "relevance" => Some(SortBy::Relevance),
            "newest" => Some(SortBy::Newest),
            "price_asc" => Some(SortBy::PriceAsc),
            "price_desc" => Some(SortBy::PriceDesc),
            "popular" => Some(SortBy::Popular),
            "favorites" => Some(SortBy::Favorites),
            _ => None,
        }
    }
}

/// Query-time filter object. Field order is part of the cache key format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchFilters {
    pub query: String,
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub conditions: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub price_range: PriceRange,
    /// Minimum seller rating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_for_trade: Option<bool>,
    pub sort_by: SortBy,
}

impl SearchFilters {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// One hit: the document plus optional highlighted fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: SearchDocument,
    #[serde(
        rename = "_highlightResult",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<Object>)]
    pub highlight: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<SearchDocument> for SearchHit {
    fn from(document: SearchDocument) -> Self {
        Self {
            document,
            highlight: None,
        }
    }
}

/// facet name -> value -> count
pub type FacetCounts = HashMap<String, HashMap<String, usize>>;

/// Response envelope shared by the hosted engine and the database fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub total_hits: u64,
    /// Zero-based page index
    pub page: u32,
    pub total_pages: u32,
    #[serde(rename = "processingTimeMS")]
    pub processing_time_ms: u64,
    pub facets: FacetCounts,
}

impl SearchResult {
    pub fn empty(page: u32) -> Self {
        Self {
            hits: Vec::new(),
            total_hits: 0,
            page,
            total_pages: 0,
            processing_time_ms: 0,
            facets: FacetCounts::new(),
        }
    }

    pub fn documents(&self) -> impl Iterator<Item = &SearchDocument> {
        self.hits.iter().map(|h| &h.document)
    }
}

/// Number of pages needed to show `total` hits.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64).min(u32::MAX as u64) as u32
}

/// Autocomplete entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Suggestion {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductsResponse {
    pub products: Vec<SearchDocument>,
}

/// A validated search call: filters plus paging.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub filters: SearchFilters,
    pub page: u32,
    pub page_size: u32,
}

/// Raw query string of `GET /search`; list parameters are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryParams {
    pub q: Option<String>,
    pub categories: Option<String>,
    pub brands: Option<String>,
    pub conditions: Option<String>,
    pub sizes: Option<String>,
    pub colors: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub seller_rating: Option<String>,
    pub available_for_trade: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl SearchQueryParams {
    /// Validate the raw parameters, reporting the first offending field.
    pub fn into_request(self) -> Result<SearchRequest, SearchError> {
        let query = self.q.unwrap_or_default().trim().to_string();
        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(SearchError::validation(
                "q",
                format!("must be at most {MAX_QUERY_LENGTH} characters"),
            ));
        }

        let min = parse_price("minPrice", self.min_price.as_deref())?;
        let max = parse_price("maxPrice", self.max_price.as_deref())?;
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(SearchError::validation(
                    "minPrice",
                    "must not be greater than maxPrice",
                ));
            }
        }

        let seller_rating = match non_empty(self.seller_rating.as_deref()) {
            Some(raw) => {
                let rating = parse_number::<f64>("sellerRating", raw)?;
                if !(0.0..=5.0).contains(&rating) {
                    return Err(SearchError::validation(
                        "sellerRating",
                        "must be between 0 and 5",
                    ));
                }
                Some(rating)
            }
            None => None,
        };

        let available_for_trade = match non_empty(self.available_for_trade.as_deref()) {
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(_) => {
                return Err(SearchError::validation(
                    "availableForTrade",
                    "must be true or false",
                ))
            }
            None => None,
        };

        let sort_by = match non_empty(self.sort_by.as_deref()) {
            Some(raw) => SortBy::parse(raw).ok_or_else(|| {
                SearchError::validation("sortBy", format!("unknown sort mode '{raw}'"))
            })?,
            None => SortBy::default(),
        };

        let (page, page_size) = parse_paging(self.page.as_deref(), self.limit.as_deref())?;

        Ok(SearchRequest {
            filters: SearchFilters {
                query,
                categories: split_list(self.categories.as_deref()),
                brands: split_list(self.brands.as_deref()),
                conditions: split_list(self.conditions.as_deref()),
                sizes: split_list(self.sizes.as_deref()),
                colors: split_list(self.colors.as_deref()),
                price_range: PriceRange { min, max },
                seller_rating,
                available_for_trade,
                sort_by,
            },
            page,
            page_size,
        })
    }
}

/// Parse zero-based `page` and `limit`, clamping the limit to [`MAX_PAGE_SIZE`].
pub fn parse_paging(page: Option<&str>, limit: Option<&str>) -> Result<(u32, u32), SearchError> {
    let page = match non_empty(page) {
        Some(raw) => parse_number::<u32>("page", raw)?,
        None => 0,
    };
    let page_size = match non_empty(limit) {
        Some(raw) => {
            let limit = parse_number::<u32>("limit", raw)?;
            if limit == 0 {
                return Err(SearchError::validation("limit", "must be at least 1"));
            }
            limit.min(MAX_PAGE_SIZE)
        }
        None => DEFAULT_PAGE_SIZE,
    };
    Ok((page, page_size))
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, SearchError> {
    raw.parse::<T>()
        .map_err(|_| SearchError::validation(field, format!("'{raw}' is not a valid number")))
}

fn parse_price(field: &str, raw: Option<&str>) -> Result<Option<f64>, SearchError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    let value = parse_number::<f64>(field, raw)?;
    if !value.is_finite() || value < 0.0 {
        return Err(SearchError::validation(field, "must be a non-negative number"));
    }
    Ok(Some(value))
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
