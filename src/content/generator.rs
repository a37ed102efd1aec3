use super::fallback;
use super::parse::parse_structured;
use crate::config::RemediationPolicy;
use crate::llm::{Completion, ProviderChain};
use crate::shopify::Product;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an e-commerce SEO specialist. Reply with the requested content only, without commentary.";
const DESCRIPTION_CONTEXT_CHARS: usize = 200;
const ALT_TEXT_CHARS: usize = 100;
const CATEGORY_CHARS: usize = 60;
const META_TITLE_CHARS: usize = 60;
const META_DESCRIPTION_CHARS: usize = 155;
const MAX_GENERATED_TAGS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "provider", rename_all = "snake_case")]
pub enum ContentSource {
    Provider(String),
    LocalFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    pub source: ContentSource,
}

impl<T> Generated<T> {
    fn provider(value: T, name: &str) -> Self {
        Self {
            value,
            source: ContentSource::Provider(name.to_string()),
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            source: ContentSource::LocalFallback,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == ContentSource::LocalFallback
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTags {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// The slice of a product sent to providers alongside each instruction.
#[derive(Debug, Clone, Serialize)]
pub struct ProductContext {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ProductContext {
    pub fn from_product(product: &Product) -> Self {
        Self {
            title: product.title.trim().to_string(),
            description: truncate_chars(
                &plain_text(product.body_html.as_deref().unwrap_or_default()),
                DESCRIPTION_CONTEXT_CHARS,
            ),
            price: product.first_price().map(str::to_string),
            tags: product.tag_list(),
            category: product
                .product_type
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }
}

/// Produces replacement text per field. Never fails: when the provider chain
/// is exhausted or its answer is unusable, the local heuristics answer.
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    chain: ProviderChain,
    policy: Arc<RemediationPolicy>,
}

impl ContentGenerator {
    pub fn new(chain: ProviderChain, policy: Arc<RemediationPolicy>) -> Self {
        Self { chain, policy }
    }

    async fn ask(&self, instruction: &str, product: &Product) -> Option<Completion> {
        if self.chain.providers().is_empty() {
            return None;
        }
        let context = serde_json::to_string(&ProductContext::from_product(product))
            .unwrap_or_else(|_| "{}".to_string());
        let prompt = format!("{instruction}\n\nContext: {context}");
        self.chain.complete(SYSTEM_PROMPT, &prompt).await
    }

    pub async fn alt_text(&self, product: &Product) -> Generated<String> {
        let instruction = "Write concise image alt text (max 100 characters) describing this product photo for accessibility and SEO.";
        if let Some(completion) = self.ask(instruction, product).await {
            let cleaned = clean_line(&completion.text, ALT_TEXT_CHARS);
            if !cleaned.is_empty() {
                return Generated::provider(cleaned, &completion.provider);
            }
            debug!(target = "remedy.content", product_id = product.id, "alt_text_unusable");
        }
        Generated::fallback(fallback::alt_text(
            &product.title,
            self.policy.alt_text_words,
        ))
    }

    pub async fn tags(&self, product: &Product) -> Generated<Vec<String>> {
        let instruction = "Suggest up to 5 short SEO tags for this product as a comma-separated list.";
        if let Some(completion) = self.ask(instruction, product).await {
            let tags = clean_tags(&completion.text);
            if !tags.is_empty() {
                return Generated::provider(tags, &completion.provider);
            }
            debug!(target = "remedy.content", product_id = product.id, "tags_unusable");
        }
        Generated::fallback(fallback::seo_tags(
            &product.title,
            self.policy.top_tags,
            &self.policy.boilerplate_tags,
        ))
    }

    /// Fields the provider leaves empty or that fail to parse are filled
    /// locally; the result is marked as a fallback unless both came back.
    pub async fn meta_tags(&self, product: &Product, suffix: &str) -> Generated<MetaTags> {
        let instruction = "Write an SEO meta title (max 60 characters) and meta description (max 155 characters). Respond as JSON: {\"title\": \"...\", \"description\": \"...\"}";
        let mut parsed = MetaTags::default();
        let mut provider = None;
        if let Some(completion) = self.ask(instruction, product).await {
            match parse_structured::<MetaTags>(&completion.text) {
                Ok(meta) => {
                    parsed.title = clean_line(&meta.title, META_TITLE_CHARS);
                    parsed.description = clean_line(&meta.description, META_DESCRIPTION_CHARS);
                    provider = Some(completion.provider);
                }
                Err(err) => debug!(
                    target = "remedy.content",
                    product_id = product.id,
                    error = %err,
                    "meta_tags_unparseable"
                ),
            }
        }

        let complete = !parsed.title.is_empty() && !parsed.description.is_empty();
        if parsed.title.is_empty() {
            parsed.title = fallback::meta_title(&product.title, suffix);
        }
        if parsed.description.is_empty() {
            parsed.description = fallback::meta_description(&product.title, suffix);
        }
        match provider {
            Some(name) if complete => Generated::provider(parsed, &name),
            _ => Generated::fallback(parsed),
        }
    }

    pub async fn category(&self, product: &Product) -> Generated<String> {
        let instruction = "Name the single best store category for this product (for example: Electronics, Home & Garden, Fashion). Reply with the category name only.";
        if let Some(completion) = self.ask(instruction, product).await {
            let cleaned = clean_line(&completion.text, CATEGORY_CHARS);
            if !cleaned.is_empty() {
                return Generated::provider(cleaned, &completion.provider);
            }
            debug!(target = "remedy.content", product_id = product.id, "category_unusable");
        }
        Generated::fallback(fallback::category(
            &product.title,
            &self.policy.default_category,
        ))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

fn strip_quotes(text: &str) -> &str {
    text.trim()
        .trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '`')
        .trim()
}

fn clean_line(text: &str, max_chars: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    truncate_chars(strip_quotes(line), max_chars)
}

fn clean_tags(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(strip_quotes)
        .map(|tag| tag.trim_start_matches(['-', '*', '#']).trim())
        .filter(|tag| !tag.is_empty())
        .take(MAX_GENERATED_TAGS)
        .map(str::to_string)
        .collect()
}

fn plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderConfig;
    use crate::shopify::models::Image;
    use crate::test_support::{MockProviders, chat_provider, chat_reply, test_policy};
    use axum::http::StatusCode;
    use reqwest::Client;
    use serde_json::json;

    fn speaker() -> Product {
        Product {
            id: 1,
            title: "Wireless Bluetooth Speaker XL Pro".into(),
            body_html: Some("<p>Loud <b>and</b> clear.</p>".into()),
            images: vec![Image {
                id: 11,
                product_id: Some(1),
                alt: Some(String::new()),
            }],
            variants: vec![],
            tags: None,
            product_type: Some(String::new()),
            seo_title: None,
            seo_description: None,
        }
    }

    fn generator(providers: Vec<ProviderConfig>) -> ContentGenerator {
        ContentGenerator::new(
            ProviderChain::new(Client::new(), providers),
            Arc::new(test_policy()),
        )
    }

    #[test]
    fn context_strips_markup() {
        let context = ProductContext::from_product(&speaker());
        assert_eq!(context.description, "Loud and clear.");
        assert_eq!(context.category, None);
    }

    #[test]
    fn tag_replies_are_split_and_capped() {
        let tags = clean_tags("\"audio\", speaker, - bluetooth\nportable, loud, party, extra");
        assert_eq!(tags, vec!["audio", "speaker", "bluetooth", "portable", "loud"]);
    }

    #[tokio::test]
    async fn no_providers_means_local_content() {
        let generator = generator(vec![]);
        let product = speaker();

        let alt = generator.alt_text(&product).await;
        assert!(alt.is_fallback());
        assert_eq!(alt.value, "Wireless Bluetooth Speaker");

        let category = generator.category(&product).await;
        assert_eq!(category.value, "Electronics");

        let meta = generator.meta_tags(&product, "Acme").await;
        assert_eq!(meta.value.title, "Wireless Bluetooth Speaker XL Pro | Acme");
        assert!(!meta.value.description.is_empty());

        let tags = generator.tags(&product).await;
        assert!(tags.value.contains(&"SEO Optimized".to_string()));
    }

    #[tokio::test]
    async fn failing_chain_falls_back_without_error() {
        let (base, mock) = MockProviders::new()
            .route("/a", StatusCode::INTERNAL_SERVER_ERROR, json!({}))
            .route("/b", StatusCode::BAD_GATEWAY, json!({}))
            .spawn()
            .await;
        let generator = generator(vec![
            chat_provider("a", &base, "/a"),
            chat_provider("b", &base, "/b"),
        ]);
        let alt = generator.alt_text(&speaker()).await;
        assert_eq!(alt.source, ContentSource::LocalFallback);
        assert_eq!(alt.value, "Wireless Bluetooth Speaker");
        assert_eq!(mock.hits().len(), 2);
    }

    #[tokio::test]
    async fn provider_text_is_cleaned() {
        let (base, mock) = MockProviders::new()
            .route("/a", StatusCode::OK, chat_reply("\"Black wireless speaker on a desk\"\nExtra line"))
            .spawn()
            .await;
        let generator = generator(vec![chat_provider("a", &base, "/a")]);
        let alt = generator.alt_text(&speaker()).await;
        assert_eq!(alt.source, ContentSource::Provider("a".into()));
        assert_eq!(alt.value, "Black wireless speaker on a desk");

        let prompt = mock.requests()[0].body["messages"][1]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(prompt.contains("Context: {\"title\":\"Wireless Bluetooth Speaker XL Pro\""));
    }

    #[tokio::test]
    async fn meta_reply_fills_missing_half_locally() {
        let (base, _mock) = MockProviders::new()
            .route(
                "/a",
                StatusCode::OK,
                chat_reply("Here it is: {\"title\": \"Speaker XL Pro | Loud Sound\"}"),
            )
            .spawn()
            .await;
        let generator = generator(vec![chat_provider("a", &base, "/a")]);
        let meta = generator.meta_tags(&speaker(), "Acme").await;
        assert_eq!(meta.value.title, "Speaker XL Pro | Loud Sound");
        assert!(meta.value.description.starts_with("Shop Wireless Bluetooth Speaker"));
        assert!(meta.is_fallback());
    }

    #[tokio::test]
    async fn meta_reply_is_truncated() {
        let long_title = "T".repeat(80);
        let reply = json!({"title": long_title, "description": "D".repeat(200)}).to_string();
        let (base, _mock) = MockProviders::new()
            .route("/a", StatusCode::OK, chat_reply(&reply))
            .spawn()
            .await;
        let generator = generator(vec![chat_provider("a", &base, "/a")]);
        let meta = generator.meta_tags(&speaker(), "Acme").await;
        assert_eq!(meta.value.title.chars().count(), 60);
        assert_eq!(meta.value.description.chars().count(), 155);
        assert_eq!(meta.source, ContentSource::Provider("a".into()));
    }
}
