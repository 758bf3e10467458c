// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Logging setup and helpers for keeping user input short in logs.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "market_search=info";

/// Longest user-supplied string written to logs as-is.
const MAX_LOGGED_CHARS: usize = 64;

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Cut a query for logging: "long query te…"
pub fn truncate_for_log(value: &str) -> String {
    if value.chars().count() <= MAX_LOGGED_CHARS {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(MAX_LOGGED_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_targets_this_crate() {
        assert_eq!(DEFAULT_FILTER, format!("{}=info", module_path!().split("::").next().unwrap()));
        assert!(DEFAULT_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn test_short_values_are_unchanged() {
        assert_eq!(truncate_for_log("red dress"), "red dress");
        assert_eq!(truncate_for_log(""), "");
    }

    #[test]
    fn test_long_values_are_cut() {
        let long = "é".repeat(100);
        let cut = truncate_for_log(&long);
        assert_eq!(cut.chars().count(), MAX_LOGGED_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
