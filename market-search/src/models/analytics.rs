// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A shopper clicked a hit in a result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub product_id: String,
    /// One-based position of the hit in the list that was shown
    pub position: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// A shopper bought, favorited or contacted the seller of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub product_id: String,
    #[serde(default = "default_conversion_name")]
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn default_conversion_name() -> String {
    "Product Purchased".to_string()
}

/// Snapshot of the hosted index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalytics {
    pub available: bool,
    pub number_of_documents: u64,
    pub is_indexing: bool,
    pub field_distribution: HashMap<String, u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReindexResponse {
    pub success: bool,
    pub indexed: usize,
}
