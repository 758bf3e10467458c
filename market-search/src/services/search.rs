// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Meilisearch adapter: owns the product index, its settings, and the
//! translation of [`SearchFilters`] into Meilisearch filter expressions.

use crate::error::{Result, SearchError};
use crate::models::analytics::{ClickEvent, ConversionEvent, SearchAnalytics};
use crate::models::search::{
    total_pages, PriceRange, SearchDocument, SearchFilters, SearchHit, SearchResult, SortBy,
    Suggestion, MAX_PAGE_SIZE,
};
use crate::services::analytics::InsightsClient;
use crate::services::backend::{
    similar_price_bounds, suggestion_query_ok, SearchBackend, SearchEngine,
};
use async_trait::async_trait;
use meilisearch_sdk::client::Client;
use meilisearch_sdk::errors::{Error as MeiliError, ErrorCode};
use meilisearch_sdk::indexes::Index;
use meilisearch_sdk::search::Selectors;
use meilisearch_sdk::settings::Settings;
use meilisearch_sdk::task_info::TaskInfo;
use meilisearch_sdk::tasks::Task;
use std::env;
use std::future::Future;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Most documents per `add_documents` call.
pub const INDEX_BATCH_SIZE: usize = 1000;

/// How long a write waits for its index task to finish.
const WRITE_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Searchable attributes, highest priority first.
const SEARCHABLE_ATTRIBUTES: &[&str] = &[
    "title",
    "brand",
    "description",
    "category",
    "sellerName",
    "tags",
];

const FILTERABLE_ATTRIBUTES: &[&str] = &[
    "category",
    "brand",
    "condition",
    "size",
    "colors",
    "materials",
    "sellerRating",
    "location",
    "availableForTrade",
    "status",
    "price",
    "id",
    "createdAt",
];

const SORTABLE_ATTRIBUTES: &[&str] = &["price", "createdAt", "views", "favorites"];

/// Built-in typo-tolerant rules followed by popularity and recency.
const RANKING_RULES: &[&str] = &[
    "words",
    "typo",
    "proximity",
    "attribute",
    "sort",
    "exactness",
    "views:desc",
    "favorites:desc",
    "sellerRating:desc",
    "createdAt:desc",
];

const FACET_ATTRIBUTES: &[&str] = &[
    "category",
    "brand",
    "condition",
    "size",
    "colors",
    "materials",
    "sellerRating",
    "location",
    "availableForTrade",
    "status",
];

const HIGHLIGHT_ATTRIBUTES: &[&str] = &["title", "brand", "description"];
const HIGHLIGHT_PRE_TAG: &str = "<mark>";
const HIGHLIGHT_POST_TAG: &str = "</mark>";

const POPULAR_SORT: &[&str] = &["views:desc", "favorites:desc"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for the hosted index.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub api_key: Option<String>,
    pub index_name: String,
    /// Meilisearch Cloud analytics endpoint; click/conversion events are
    /// dropped when unset.
    pub events_url: Option<String>,
}

impl EngineConfig {
    /// Load from the environment. `Ok(None)` when `MEILISEARCH_HOST` is unset,
    /// which disables the hosted path entirely.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Ok(host) = env::var("MEILISEARCH_HOST") else {
            return Ok(None);
        };
        let host = normalize_host(&host)?;

        Ok(Some(Self {
            host,
            api_key: env::var("MEILISEARCH_API_KEY").ok().filter(|k| !k.is_empty()),
            index_name: env::var("MEILISEARCH_INDEX").unwrap_or_else(|_| "products".to_string()),
            events_url: env::var("MEILISEARCH_EVENTS_URL")
                .ok()
                .filter(|u| !u.is_empty()),
        }))
    }
}

/// Accept `host:port` as well as full URLs.
fn normalize_host(host: &str) -> anyhow::Result<String> {
    let candidate = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    let parsed = url::Url::parse(&candidate)
        .map_err(|e| anyhow::anyhow!("Invalid MEILISEARCH_HOST '{}': {}", host, e))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

// ---------------------------------------------------------------------------
// Retries
// ---------------------------------------------------------------------------

/// Attempt count and linear backoff step for vendor calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const BULK: RetryPolicy = RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1000),
    };

    pub const SINGLE: RetryPolicy = RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(250),
    };
}

/// Run `op` until it succeeds or `policy.attempts` are used up; the last
/// error is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    label,
                    attempt,
                    attempts,
                    e
                );
                tokio::time::sleep(policy.base_delay * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!("{} failed after {} attempts: {}", label, attempts, e);
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filter translation
// ---------------------------------------------------------------------------

/// Quote a string for a Meilisearch filter expression.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Translate filters into a Meilisearch filter: an AND of OR-groups, always
/// restricted to available listings. `extra` clauses are ANDed on the end.
pub fn build_filter_expression(filters: &SearchFilters, extra: &[String]) -> String {
    let mut clauses = vec![format!("status = {}", quote("AVAILABLE"))];

    for (attribute, values) in [
        ("category", &filters.categories),
        ("brand", &filters.brands),
        ("condition", &filters.conditions),
        ("size", &filters.sizes),
        ("colors", &filters.colors),
    ] {
        if values.is_empty() {
            continue;
        }
        let group: Vec<String> = values
            .iter()
            .map(|v| format!("{attribute} = {}", quote(v)))
            .collect();
        clauses.push(format!("({})", group.join(" OR ")));
    }

    if let Some(min) = filters.price_range.min {
        clauses.push(format!("price >= {min}"));
    }
    if let Some(max) = filters.price_range.max {
        clauses.push(format!("price <= {max}"));
    }
    if let Some(rating) = filters.seller_rating {
        clauses.push(format!("sellerRating >= {rating}"));
    }
    if let Some(trade) = filters.available_for_trade {
        clauses.push(format!("availableForTrade = {trade}"));
    }
    clauses.extend(extra.iter().cloned());

    clauses.join(" AND ")
}

/// Sort rules standing in for per-ordering replica indices.
pub fn sort_rules(sort_by: SortBy) -> &'static [&'static str] {
    match sort_by {
        SortBy::Relevance => &[],
        SortBy::Newest => &["createdAt:desc"],
        SortBy::PriceAsc => &["price:asc"],
        SortBy::PriceDesc => &["price:desc"],
        SortBy::Popular => &["views:desc"],
        SortBy::Favorites => &["favorites:desc"],
    }
}

/// Echo suggestion followed by the busiest categories for the query.
pub fn suggestions_from_facets(
    query: &str,
    total_hits: u64,
    result: &SearchResult,
    limit: usize,
) -> Vec<Suggestion> {
    if limit == 0 {
        return Vec::new();
    }
    let mut suggestions = vec![Suggestion {
        query: query.to_string(),
        category: None,
        count: total_hits,
    }];

    let mut categories: Vec<(&String, &usize)> = result
        .facets
        .get("category")
        .map(|values| values.iter().filter(|(name, _)| !name.is_empty()).collect())
        .unwrap_or_default();
    categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    suggestions.extend(
        categories
            .into_iter()
            .take(limit - 1)
            .map(|(name, count)| Suggestion {
                query: query.to_string(),
                category: Some(name.clone()),
                count: *count as u64,
            }),
    );
    suggestions
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One search call against the index.
struct SearchCall<'a> {
    query: &'a str,
    filter: &'a str,
    sort: &'a [&'a str],
    page: u32,
    page_size: u32,
    facets: bool,
}

/// Meilisearch-backed product index.
pub struct MeilisearchEngine {
    client: Client,
    index_name: String,
    configured: OnceCell<()>,
    insights: Option<InsightsClient>,
    bulk_retry: RetryPolicy,
    single_retry: RetryPolicy,
    task_timeout: Duration,
}

impl MeilisearchEngine {
    /// Create the client and push index settings. A settings failure is
    /// logged and retried before the next write.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let client = Client::new(&config.host, config.api_key.clone())?;
        let insights = config.events_url.as_ref().map(|url| {
            InsightsClient::new(url, config.api_key.clone(), config.index_name.clone())
        });

        let engine = Self {
            client,
            index_name: config.index_name.clone(),
            configured: OnceCell::new(),
            insights,
            bulk_retry: RetryPolicy::BULK,
            single_retry: RetryPolicy::SINGLE,
            task_timeout: WRITE_TASK_TIMEOUT,
        };

        tracing::info!(
            "Connected to Meilisearch at {} (index '{}')",
            config.host,
            config.index_name
        );
        if let Err(e) = engine.ensure_configured().await {
            tracing::warn!("Failed to configure Meilisearch index: {}", e);
        }
        Ok(engine)
    }

    fn products_index(&self) -> Index {
        self.client.index(&self.index_name)
    }

    /// Block until an enqueued write is processed. Meilisearch accepts
    /// writes asynchronously, so a rejected document only shows up here.
    async fn await_task(&self, task: TaskInfo) -> Result<()> {
        let uid = task.task_uid;
        match task
            .wait_for_completion(&self.client, None, Some(self.task_timeout))
            .await?
        {
            Task::Failed { content } => Err(SearchError::Upstream(format!(
                "Task {} failed: {}",
                uid, content.error
            ))),
            _ => Ok(()),
        }
    }

    async fn ensure_configured(&self) -> Result<()> {
        self.configured
            .get_or_try_init(|| async {
                let settings = Settings::new()
                    .with_searchable_attributes(SEARCHABLE_ATTRIBUTES)
                    .with_filterable_attributes(FILTERABLE_ATTRIBUTES)
                    .with_sortable_attributes(SORTABLE_ATTRIBUTES)
                    .with_ranking_rules(RANKING_RULES);
                self.products_index().set_settings(&settings).await?;
                tracing::info!("Configured Meilisearch index: {}", self.index_name);
                Ok::<(), SearchError>(())
            })
            .await?;
        Ok(())
    }

    async fn run(&self, call: SearchCall<'_>) -> Result<SearchResult> {
        let page_size = call.page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = call.page as usize * page_size as usize;

        let index = self.products_index();
        let mut query = index.search();
        query
            .with_query(call.query)
            .with_filter(call.filter)
            .with_limit(page_size as usize)
            .with_offset(offset)
            .with_attributes_to_highlight(Selectors::Some(HIGHLIGHT_ATTRIBUTES))
            .with_highlight_pre_tag(HIGHLIGHT_PRE_TAG)
            .with_highlight_post_tag(HIGHLIGHT_POST_TAG);
        if !call.sort.is_empty() {
            query.with_sort(call.sort);
        }
        if call.facets {
            query.with_facets(Selectors::Some(FACET_ATTRIBUTES));
        }

        let results = query.execute::<SearchDocument>().await?;

        let total = results
            .estimated_total_hits
            .or(results.total_hits)
            .unwrap_or(results.hits.len()) as u64;
        let hits: Vec<SearchHit> = results
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                document: hit.result,
                highlight: hit.formatted_result,
            })
            .collect();

        Ok(SearchResult {
            hits,
            total_hits: total,
            page: call.page,
            total_pages: total_pages(total, page_size),
            processing_time_ms: results.processing_time_ms as u64,
            facets: results.facet_distribution.unwrap_or_default(),
        })
    }

    async fn fetch_document(&self, product_id: &str) -> Result<Option<SearchDocument>> {
        match self.products_index().get_document::<SearchDocument>(product_id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(MeiliError::Meilisearch(e)) if e.error_code == ErrorCode::DocumentNotFound => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SearchBackend for MeilisearchEngine {
    fn name(&self) -> &'static str {
        "meilisearch"
    }

    async fn search(
        &self,
        filters: &SearchFilters,
        page: u32,
        page_size: u32,
    ) -> Result<SearchResult> {
        let filter = build_filter_expression(filters, &[]);
        self.run(SearchCall {
            query: filters.query.trim(),
            filter: &filter,
            sort: sort_rules(filters.sort_by),
            page,
            page_size,
            facets: true,
        })
        .await
    }

    async fn suggestions(&self, query: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let query = query.trim();
        if !suggestion_query_ok(query) || limit == 0 {
            return Ok(Vec::new());
        }
        let filter = build_filter_expression(&SearchFilters::default(), &[]);
        let result = self
            .run(SearchCall {
                query,
                filter: &filter,
                sort: &[],
                page: 0,
                page_size: 1,
                facets: true,
            })
            .await?;
        Ok(suggestions_from_facets(
            query,
            result.total_hits,
            &result,
            limit,
        ))
    }

    async fn popular_products(&self, limit: usize) -> Result<Vec<SearchDocument>> {
        let filter = build_filter_expression(&SearchFilters::default(), &[]);
        let result = self
            .run(SearchCall {
                query: "",
                filter: &filter,
                sort: POPULAR_SORT,
                page: 0,
                page_size: limit.min(MAX_PAGE_SIZE as usize) as u32,
                facets: false,
            })
            .await?;
        Ok(result.hits.into_iter().map(|h| h.document).collect())
    }

    async fn similar_products(
        &self,
        product_id: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>> {
        let Some(source) = self.fetch_document(product_id).await? else {
            return Ok(Vec::new());
        };
        let (min, max) = similar_price_bounds(source.price);
        let filters = SearchFilters {
            categories: vec![source.category.clone()],
            price_range: PriceRange {
                min: Some(min),
                max: Some(max),
            },
            ..Default::default()
        };
        let filter = build_filter_expression(&filters, &[format!("id != {}", quote(product_id))]);
        let result = self
            .run(SearchCall {
                query: "",
                filter: &filter,
                sort: &[],
                page: 0,
                page_size: limit.min(MAX_PAGE_SIZE as usize) as u32,
                facets: false,
            })
            .await?;
        Ok(result
            .hits
            .into_iter()
            .map(|h| h.document)
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
            ..Default::default()
        };
        self.search(&filters, page, page_size).await
    }
}

#[async_trait]
impl SearchEngine for MeilisearchEngine {
    async fn index(&self, documents: &[SearchDocument]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.ensure_configured().await?;

        let index = self.products_index();
        for (n, chunk) in documents.chunks(INDEX_BATCH_SIZE).enumerate() {
            let label = format!("Indexing batch {} ({} documents)", n + 1, chunk.len());
            with_retry(self.bulk_retry, &label, || async {
                let task = index.add_documents(chunk, Some("id")).await?;
                self.await_task(task).await
            })
            .await?;
        }

        tracing::info!("Indexed {} documents", documents.len());
        Ok(documents.len())
    }

    async fn update_product(&self, document: &SearchDocument) -> Result<()> {
        self.ensure_configured().await?;
        let index = self.products_index();
        let label = format!("Updating product {}", document.id);
        with_retry(self.single_retry, &label, || async {
            let task = index
                .add_documents(std::slice::from_ref(document), Some("id"))
                .await?;
            self.await_task(task).await
        })
        .await
    }

    async fn delete_product(&self, product_id: &str) -> Result<()> {
        let index = self.products_index();
        let label = format!("Deleting product {product_id}");
        with_retry(self.single_retry, &label, || async {
            let task = index.delete_document(product_id).await?;
            self.await_task(task).await
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let task = self.products_index().delete_all_documents().await?;
        self.await_task(task).await?;
        tracing::info!("Cleared all documents from index {}", self.index_name);
        Ok(())
    }

    async fn track_click(&self, event: &ClickEvent) {
        match &self.insights {
            Some(insights) => insights.click(event).await,
            None => tracing::debug!("Click on {} not sent: no events URL", event.product_id),
        }
    }

    async fn track_conversion(&self, event: &ConversionEvent) {
        match &self.insights {
            Some(insights) => insights.conversion(event).await,
            None => tracing::debug!(
                "Conversion on {} not sent: no events URL",
                event.product_id
            ),
        }
    }

    async fn analytics(&self) -> SearchAnalytics {
        match self.products_index().get_stats().await {
            Ok(stats) => SearchAnalytics {
                available: true,
                number_of_documents: stats.number_of_documents as u64,
                is_indexing: stats.is_indexing,
                field_distribution: stats
                    .field_distribution
                    .into_iter()
                    .map(|(field, count)| (field, count as u64))
                    .collect(),
            },
            Err(e) => {
                tracing::warn!("Failed to read index stats: {}", e);
                SearchAnalytics::default()
            }
        }
    }
}
