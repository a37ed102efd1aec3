use crate::config::RemediationPolicy;
use crate::shopify::Product;
use serde::Serialize;

/// A metadata gap found on a product. Variants are listed in the order they
/// are remediated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deficiency {
    MissingAltText { image_ids: Vec<u64> },
    InsufficientTags,
    MissingMetaTags { title: bool, description: bool },
    MissingCategory,
}

impl Deficiency {
    pub fn field(&self) -> &'static str {
        match self {
            Deficiency::MissingAltText { .. } => "alt_text",
            Deficiency::InsufficientTags => "tags",
            Deficiency::MissingMetaTags { .. } => "meta_tags",
            Deficiency::MissingCategory => "category",
        }
    }
}

pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

pub fn classify(product: &Product, policy: &RemediationPolicy) -> Vec<Deficiency> {
    let mut found = Vec::new();

    let image_ids: Vec<u64> = product
        .images
        .iter()
        .filter(|image| is_blank(image.alt.as_deref()))
        .map(|image| image.id)
        .collect();
    if !image_ids.is_empty() {
        found.push(Deficiency::MissingAltText { image_ids });
    }

    if tags_insufficient(&product.tag_list(), policy) {
        found.push(Deficiency::InsufficientTags);
    }

    let title = is_blank(product.seo_title.as_deref());
    let description = is_blank(product.seo_description.as_deref());
    if title || description {
        found.push(Deficiency::MissingMetaTags { title, description });
    }

    if is_blank(product.product_type.as_deref()) {
        found.push(Deficiency::MissingCategory);
    }

    found
}

// Substring match against a keyword list; a tag like "quality-assured"
// counts as optimized.
fn tags_insufficient(tags: &[String], policy: &RemediationPolicy) -> bool {
    let keywords: Vec<String> = policy
        .seo_tag_keywords
        .iter()
        .map(|k| k.to_lowercase())
        .collect();
    let has_keyword = tags.iter().any(|tag| {
        let tag = tag.to_lowercase();
        keywords.iter().any(|keyword| tag.contains(keyword.as_str()))
    });
    !has_keyword || tags.len() < policy.min_tags
}

/// One product plus the gaps still to close in this run.
#[derive(Debug, Clone)]
pub struct RemediationItem {
    pub product: Product,
    pub deficiencies: Vec<Deficiency>,
}

impl RemediationItem {
    pub fn from_product(product: Product, policy: &RemediationPolicy) -> Option<Self> {
        let deficiencies = classify(&product, policy);
        if deficiencies.is_empty() {
            return None;
        }
        Some(Self {
            product,
            deficiencies,
        })
    }
}
