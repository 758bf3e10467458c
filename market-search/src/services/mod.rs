// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

pub mod analytics;
pub mod auth;
pub mod backend;
pub mod cache;
pub mod fallback;
pub mod history;
pub mod logging;
pub mod product_repo;
pub mod rate_limit;
pub mod saved_search;
pub mod search;
pub mod transformer;
pub mod unified;
