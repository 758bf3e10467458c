// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

mod common;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use common::*;
use market_search::app::{create_router, VERSION};
use market_search::error::ErrorResponse;
use market_search::models::history::{SavedSearch, SavedSearchListResponse, SearchHistoryResponse};
use market_search::models::search::SearchResult;
use market_search::models::version::VersionResponse;
use market_search::services::rate_limit::RateLimitConfig;
use market_search::services::unified::SearchServiceConfig;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceExt;

fn unlimited() -> RateLimitConfig {
    RateLimitConfig {
        max_requests: 0,
        window: Duration::from_secs(60),
        trust_forwarded_for: false,
    }
}

async fn create_test_app() -> Router {
    let catalog = iphone_catalog();
    let engine = engine_with(&catalog).await;
    let h = harness(catalog, Some(engine), SearchServiceConfig::default());
    create_router(app_state(&h, unlimited()))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, session: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("market_session={token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_version_endpoint_response() {
    let app = create_test_app().await;

    let response = app.oneshot(get("/version")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert_eq!(content_type, "application/json");

    let version: VersionResponse = read_json(response).await;
    assert_eq!(version.service, "market-search");
    assert_eq!(version.version, VERSION);
    assert_eq!(version.search_engine, "meilisearch");

    // MAJOR.MINOR.PATCH
    let parts: Vec<&str> = version.version.split('.').collect();
    assert_eq!(parts.len(), 3);
    assert!(parts.iter().all(|p| p.parse::<u32>().is_ok()));
}

#[tokio::test]
async fn test_version_reports_database_mode() {
    let h = harness(
        iphone_catalog(),
        None,
        SearchServiceConfig {
            use_engine: false,
            ..Default::default()
        },
    );
    let app = create_router(app_state(&h, unlimited()));

    let version: VersionResponse = read_json(app.oneshot(get("/version")).await.unwrap()).await;
    assert_eq!(version.search_engine, "database");
}

#[tokio::test]
async fn test_invalid_route_returns_404() {
    let app = create_test_app().await;
    let response = app.oneshot(get("/invalid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_filters_by_price() {
    let app = create_test_app().await;

    let response = app
        .oneshot(get(
            "/search?q=iphone&minPrice=500&maxPrice=1000&sortBy=price_asc",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let result: SearchResult = read_json(response).await;
    assert_eq!(result.total_hits, 1);
    assert_eq!(result.hits[0].document.id, "phone-799");
}

#[tokio::test]
async fn test_search_issues_visitor_cookie() {
    let app = create_test_app().await;

    let response = app.oneshot(get("/search?q=iphone")).await.unwrap();

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("market_visitor="), "got {cookie:?}");
}

#[tokio::test]
async fn test_invalid_price_is_rejected_with_field() {
    let app = create_test_app().await;

    let response = app.oneshot(get("/search?minPrice=cheap")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert!(!error.success);
    assert_eq!(error.field.as_deref(), Some("minPrice"));
}

#[tokio::test]
async fn test_unknown_sort_is_rejected() {
    let app = create_test_app().await;
    let response = app.oneshot(get("/search?sortBy=cheapest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_short_suggestion_query_is_empty() {
    let app = create_test_app().await;

    let response = app.oneshot(get("/search/suggestions?q=i")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = read_json(response).await;
    assert_eq!(body["suggestions"], serde_json::json!([]));
}

#[tokio::test]
async fn test_similar_excludes_source() {
    let app = create_test_app().await;

    let response = app.oneshot(get("/search/similar/phone-799")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = read_json(response).await;
    let ids: Vec<&str> = body["products"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["id"].as_str())
        .collect();
    assert!(!ids.is_empty());
    assert!(!ids.contains(&"phone-799"));
}

#[tokio::test]
async fn test_click_is_accepted() {
    let app = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/analytics/click",
            None,
            r#"{"productId":"phone-799","position":1}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_history_follows_visitor_cookie() {
    let app = create_test_app().await;
    let visitor = "0190a5f2-7c3e-7b4a-9d2e-5f1a2b3c4d5e";
    let with_visitor = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header(header::COOKIE, format!("market_visitor={visitor}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(with_visitor("/search?q=iphone"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let found = eventually(|| {
        let app = app.clone();
        let request = with_visitor("/search-history");
        async move {
            let response = app.oneshot(request).await.unwrap();
            let history: SearchHistoryResponse = read_json(response).await;
            history.history.iter().any(|i| i.query == "iphone")
        }
    })
    .await;
    assert!(found);
}

#[tokio::test]
async fn test_saved_searches_require_session() {
    let app = create_test_app().await;
    let response = app.oneshot(get("/saved-searches")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_saved_search_lifecycle() {
    let app = create_test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/saved-searches",
            Some(USER_ONE_TOKEN),
            r#"{"name":"Cheap phones","query":"iphone","filters":{"priceRange":{"max":600}}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: SavedSearch = read_json(response).await;
    assert_eq!(created.user_id, "u1");
    assert!(!created.alerts_enabled);

    // Another user cannot touch it.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/saved-searches/{}", created.id),
            Some(USER_TWO_TOKEN),
            r#"{"name":"Mine now"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/saved-searches/{}/toggle-alerts", created.id),
            Some(USER_ONE_TOKEN),
            "",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let toggled: SavedSearch = read_json(response).await;
    assert!(toggled.alerts_enabled);

    let response = app
        .clone()
        .oneshot(json_request("GET", "/saved-searches", Some(USER_ONE_TOKEN), ""))
        .await
        .unwrap();
    let list: SavedSearchListResponse = read_json(response).await;
    assert_eq!(list.count, 1);
    assert_eq!(list.saved_searches[0].name, "Cheap phones");

    let response = app
        .oneshot(json_request("GET", "/saved-searches", Some(USER_TWO_TOKEN), ""))
        .await
        .unwrap();
    let list: SavedSearchListResponse = read_json(response).await;
    assert_eq!(list.count, 0);
}

#[tokio::test]
async fn test_saved_search_blank_name_is_rejected() {
    let app = create_test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/saved-searches",
            Some(USER_ONE_TOKEN),
            r#"{"name":"   "}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = read_json(response).await;
    assert_eq!(error.field.as_deref(), Some("name"));
}

#[tokio::test]
async fn test_admin_token_is_checked() {
    let app = create_test_app().await;
    let reindex = |token: Option<&str>| {
        let mut builder = Request::builder().method("POST").uri("/admin/reindex");
        if let Some(token) = token {
            builder = builder.header("x-admin-token", token);
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(reindex(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(reindex(Some("guess"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.oneshot(reindex(Some(ADMIN_TOKEN))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = read_json(response).await;
    assert_eq!(body["indexed"], 3);
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let h = harness(iphone_catalog(), None, SearchServiceConfig::default());
    let app = create_router(app_state(
        &h,
        RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
            trust_forwarded_for: true,
        },
    ));
    let from = |ip: &str| {
        Request::builder()
            .uri("/version")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(from("10.0.0.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let response = app.oneshot(from("10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn limited_app(max_requests: usize) -> Router {
    let h = harness(iphone_catalog(), None, SearchServiceConfig::default());
    create_router(app_state(
        &h,
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            trust_forwarded_for: false,
        },
    ))
}

fn from_peer(ip: [u8; 4], cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri("/version")
        .extension(ConnectInfo(SocketAddr::from((ip, 51000))));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_rate_limit_is_per_peer_without_proxy() {
    let app = limited_app(2);

    for _ in 0..2 {
        let response = app.clone().oneshot(from_peer([192, 168, 0, 5], None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(from_peer([192, 168, 0, 5], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.oneshot(from_peer([192, 168, 0, 6], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forged_session_cookies_do_not_escape_the_limit() {
    let app = limited_app(2);
    let mut rejected = 0;

    for n in 0..20 {
        let cookie = format!("market_session=forged-{n}");
        let response = app
            .clone()
            .oneshot(from_peer([10, 0, 0, 1], Some(&cookie)))
            .await
            .unwrap();
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 18);
}

#[tokio::test]
async fn test_signed_in_users_have_their_own_bucket() {
    let app = limited_app(1);
    let cookie = format!("market_session={USER_ONE_TOKEN}");

    let response = app.clone().oneshot(from_peer([10, 0, 0, 1], None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app
        .clone()
        .oneshot(from_peer([10, 0, 0, 1], Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.oneshot(from_peer([10, 0, 0, 1], Some(&cookie))).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_concurrent_requests_succeed() {
    let app = create_test_app().await;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let app_clone = app.clone();
            tokio::spawn(async move {
                let response = app_clone.oneshot(get("/version")).await.unwrap();
                response.status()
            })
        })
        .collect();

    for handle in handles {
        let status = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }
}
