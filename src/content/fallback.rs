//! Deterministic replacements used when no provider answers. Every function
//! here returns non-empty text for a non-empty title.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

pub const FALLBACK_SUFFIX: &str = "Premium Store";
const MAX_META_TITLE_CHARS: usize = 57;
const TRUNCATED_TITLE_CHARS: usize = 45;
const MAX_META_DESCRIPTION_CHARS: usize = 160;
const TRUNCATED_DESCRIPTION_CHARS: usize = 157;

pub struct CategoryRule {
    pub label: &'static str,
    pub keywords: &'static [&'static str],
}

/// Checked in order; the first rule with a keyword in the title wins.
pub const CATEGORY_RULES: [CategoryRule; 8] = [
    CategoryRule {
        label: "Electronics",
        keywords: &["phone", "watch", "charger", "smart", "digital", "bluetooth"],
    },
    CategoryRule {
        label: "Home & Garden",
        keywords: &["home", "kitchen", "bathroom", "holder", "garden"],
    },
    CategoryRule {
        label: "Fashion",
        keywords: &["clothing", "jacket", "fashion", "wear"],
    },
    CategoryRule {
        label: "Health & Beauty",
        keywords: &["beauty", "massage", "fitness"],
    },
    CategoryRule {
        label: "Sports & Outdoors",
        keywords: &["sport", "game", "ball"],
    },
    CategoryRule {
        label: "Automotive",
        keywords: &["car", "auto"],
    },
    CategoryRule {
        label: "Toys & Games",
        keywords: &["toy", "game", "children"],
    },
    CategoryRule {
        label: "Tools",
        keywords: &["tool", "equipment"],
    },
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "with", "from", "that", "this", "your", "for", "and", "the", "into", "over", "more",
        "very", "each", "only", "have", "will", "pack", "pcs", "piece", "pieces", "new",
    ]
    .into_iter()
    .collect()
});

fn clean_words(text: &str) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || *ch == '-' || ch.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn is_significant(word: &str) -> bool {
    word.chars().count() > 3
}

pub fn alt_text(title: &str, max_words: usize) -> String {
    let words = clean_words(title);
    let significant: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|word| is_significant(word))
        .take(max_words.max(1))
        .collect();
    if !significant.is_empty() {
        return significant.join(" ");
    }
    let leading: Vec<&str> = words.iter().map(String::as_str).take(8).collect();
    if !leading.is_empty() {
        return leading.join(" ");
    }
    let title = title.trim();
    if title.is_empty() {
        "Product image".to_string()
    } else {
        title.to_string()
    }
}

/// Most frequent title words (ties by first occurrence) followed by the
/// boilerplate tags.
pub fn seo_tags(title: &str, top_k: usize, boilerplate: &[String]) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize, String)> = HashMap::new();
    for (position, word) in clean_words(title).into_iter().enumerate() {
        let key = word.to_lowercase();
        if !is_significant(&key) || STOPWORDS.contains(key.as_str()) {
            continue;
        }
        counts
            .entry(key)
            .and_modify(|(count, _, _)| *count += 1)
            .or_insert((1, position, word));
    }
    let mut ranked: Vec<(usize, usize, String)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut tags: Vec<String> = ranked
        .into_iter()
        .take(top_k)
        .map(|(_, _, word)| word)
        .collect();
    if tags.is_empty() && !title.trim().is_empty() {
        tags.push(title.trim().to_string());
    }
    merge_tags(&tags, boilerplate)
}

/// Appends `additions` to `existing`, skipping case-insensitive duplicates and
/// keeping first-seen order.
pub fn merge_tags(existing: &[String], additions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(additions)
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// The `additions` not already present in `existing`, compared
/// case-insensitively and deduplicated among themselves.
pub fn missing_tags(existing: &[String], additions: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = existing
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .collect();
    additions
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(str::to_string)
        .collect()
}

pub fn meta_title(title: &str, suffix: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return suffix.to_string();
    }
    if title.chars().count() <= MAX_META_TITLE_CHARS {
        format!("{title} | {suffix}")
    } else {
        let head: String = title.chars().take(TRUNCATED_TITLE_CHARS).collect();
        format!("{head}... | {suffix}")
    }
}

pub fn meta_description(title: &str, suffix: &str) -> String {
    let title = title.trim();
    let text = if title.is_empty() {
        format!("Discover quality products with fast, secure delivery from {suffix}.")
    } else {
        format!(
            "Shop {title} at the best price with guaranteed quality. Fast and secure delivery from {suffix}."
        )
    };
    if text.chars().count() > MAX_META_DESCRIPTION_CHARS {
        let head: String = text.chars().take(TRUNCATED_DESCRIPTION_CHARS).collect();
        format!("{head}...")
    } else {
        text
    }
}

pub fn category(title: &str, default_category: &str) -> String {
    let lowered = title.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|rule| rule.label.to_string())
        .unwrap_or_else(|| default_category.to_string())
}
