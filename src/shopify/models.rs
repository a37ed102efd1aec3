use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Product {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    /// Comma-joined, order preserving.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default, alias = "metafields_global_title_tag")]
    pub seo_title: Option<String>,
    #[serde(default, alias = "metafields_global_description_tag")]
    pub seo_description: Option<String>,
}

impl Product {
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(self.tags.as_deref().unwrap_or_default())
    }

    pub fn first_price(&self) -> Option<&str> {
        self.variants
            .iter()
            .find_map(|variant| variant.price.as_deref())
            .filter(|price| !price.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub product_id: Option<u64>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Variant {
    pub id: u64,
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ShopInfo {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub myshopify_domain: Option<String>,
}

/// Partial product update; unset fields are left untouched upstream.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ProductFieldsPatch {
    pub tags: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub product_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ShopEnvelope {
    pub shop: ShopInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsEnvelope {
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageAltBody<'a> {
    pub image: ImageAltPayload<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageAltPayload<'a> {
    pub id: u64,
    pub alt: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProductUpdateBody<'a> {
    pub product: ProductUpdatePayload<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProductUpdatePayload<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub fields: &'a ProductFieldsPatch,
}

pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
