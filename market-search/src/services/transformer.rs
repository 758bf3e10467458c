// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Builds index documents from listings. Pure: no I/O, no clock.

use crate::models::product::ProductRecord;
use crate::models::search::SearchDocument;

/// Most free-text tokens taken from title and description.
const MAX_TEXT_TAGS: usize = 10;
const MIN_TAG_LENGTH: usize = 3;

const COLOR_KEYWORDS: &[&str] = &[
    "black", "white", "red", "blue", "green", "yellow", "pink", "purple", "orange", "brown",
    "grey", "gray", "beige", "navy", "cream", "gold", "silver", "khaki", "burgundy", "maroon",
    "teal", "olive", "ivory", "camel", "turquoise",
];

const MATERIAL_KEYWORDS: &[&str] = &[
    "cotton", "silk", "wool", "leather", "denim", "linen", "polyester", "cashmere", "suede",
    "velvet", "satin", "nylon", "lace", "chiffon", "viscose", "corduroy", "fleece", "tweed",
];

/// Project a listing into its search document.
pub fn to_search_document(product: &ProductRecord) -> SearchDocument {
    let text = format!("{} {}", product.title, product.description);
    let words = words(&text);

    let category_name = product
        .category
        .as_ref()
        .map(|c| c.name.clone())
        .unwrap_or_default();
    let seller = product.seller.clone().unwrap_or_default();

    SearchDocument {
        id: product.id.clone(),
        title: product.title.clone(),
        description: product.description.clone(),
        brand: product.brand.clone().unwrap_or_default(),
        price: product.price.as_f64(),
        condition: product.condition.clone(),
        size: product.size.clone().unwrap_or_default(),
        category: category_name.clone(),
        category_id: product
            .category
            .as_ref()
            .map(|c| c.id.clone())
            .unwrap_or_default(),
        seller_name: seller.display_name(),
        seller_rating: seller.rating.unwrap_or(0.0),
        seller_id: seller.id,
        location: seller.location,
        images: product.images.clone(),
        tags: build_tags(product, &category_name, &words),
        colors: build_colors(product, &words),
        materials: match_vocabulary(&words, MATERIAL_KEYWORDS),
        views: product.views,
        favorites: product.favorites_count,
        status: product.status.as_str().to_string(),
        available_for_trade: product.available_for_trade,
        created_at: product.created_at.timestamp(),
        updated_at: product.updated_at.timestamp(),
    }
}

/// Lowercased alphabetic runs of the text, in order.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn build_tags(product: &ProductRecord, category_name: &str, words: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let push = |tag: String, tags: &mut Vec<String>| {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for attribute in [
        product.brand.as_deref().unwrap_or(""),
        product.condition.as_str(),
        product.size.as_deref().unwrap_or(""),
        category_name,
    ] {
        push(attribute.trim().to_lowercase(), &mut tags);
    }

    let mut taken = 0;
    for word in words
        .iter()
        .filter(|w| w.chars().count() >= MIN_TAG_LENGTH)
    {
        if taken == MAX_TEXT_TAGS {
            break;
        }
        if !tags.contains(word) {
            tags.push(word.clone());
            taken += 1;
        }
    }

    tags
}

/// The listing's own color first, then colors named in its text.
fn build_colors(product: &ProductRecord, words: &[String]) -> Vec<String> {
    let mut colors: Vec<String> = product
        .color
        .as_deref()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .into_iter()
        .collect();
    for color in match_vocabulary(words, COLOR_KEYWORDS) {
        if !colors.contains(&color) {
            colors.push(color);
        }
    }
    colors
}

fn match_vocabulary(words: &[String], vocabulary: &[&str]) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|keyword| words.iter().any(|w| w == *keyword))
        .map(|keyword| keyword.to_string())
        .collect()
}
