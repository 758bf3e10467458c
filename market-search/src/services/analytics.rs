// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Click and conversion events for the hosted engine's analytics endpoint.
//! Delivery is best effort: failures are logged, never returned.

use crate::models::analytics::{ClickEvent, ConversionEvent};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::time::Duration;

const CLICK_EVENT_NAME: &str = "Search Result Clicked";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload<'a> {
    event_type: &'a str,
    event_name: &'a str,
    index_uid: &'a str,
    object_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_uid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
}

pub struct InsightsClient {
    http: reqwest::Client,
    events_url: String,
    api_key: Option<String>,
    index_uid: String,
}

impl InsightsClient {
    pub fn new(events_url: &str, api_key: Option<String>, index_uid: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            events_url: events_url.trim_end_matches('/').to_string(),
            api_key,
            index_uid,
        }
    }

    pub async fn click(&self, event: &ClickEvent) {
        let payload = EventPayload {
            event_type: "click",
            event_name: CLICK_EVENT_NAME,
            index_uid: &self.index_uid,
            object_id: &event.product_id,
            position: Some(event.position),
            query_uid: event.query_id.as_deref(),
            user_id: event.user_id.as_deref(),
        };
        if let Err(e) = self.send(&payload).await {
            tracing::warn!("Failed to track click on {}: {}", event.product_id, e);
        }
    }

    pub async fn conversion(&self, event: &ConversionEvent) {
        let payload = EventPayload {
            event_type: "conversion",
            event_name: &event.event_name,
            index_uid: &self.index_uid,
            object_id: &event.product_id,
            position: None,
            query_uid: event.query_id.as_deref(),
            user_id: event.user_id.as_deref(),
        };
        if let Err(e) = self.send(&payload).await {
            tracing::warn!("Failed to track conversion on {}: {}", event.product_id, e);
        }
    }

    async fn send(&self, payload: &EventPayload<'_>) -> anyhow::Result<()> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self
            .http
            .post(&self.events_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(user) = payload.user_id {
            request = request.header("X-MS-USER-ID", user);
        }

        request.send().await?.error_for_status()?;
        tracing::debug!(
            "Sent {} event for {}",
            payload.event_type,
            payload.object_id
        );
        Ok(())
    }
}
