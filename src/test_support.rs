//! In-process stand-ins for the catalog and provider APIs.

use crate::config::RemediationPolicy;
use crate::llm::{ProviderConfig, ProviderShape};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

pub const TEST_TOKEN: &str = "shpat_test";

pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock server addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

pub fn test_policy() -> RemediationPolicy {
    RemediationPolicy {
        delay_ms: 0,
        ..RemediationPolicy::default()
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

fn record(method: Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> RecordedRequest {
    RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(body).unwrap_or(Value::Null),
    }
}

pub fn deficient_product(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "body_html": format!("<p>{title}</p>"),
        "images": [{"id": id * 10, "product_id": id, "alt": ""}],
        "variants": [{"id": id * 100, "price": "19.99"}],
        "tags": "",
        "product_type": "",
    })
}

pub fn compliant_product(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "images": [{"id": id * 10, "product_id": id, "alt": title}],
        "variants": [{"id": id * 100, "price": "19.99"}],
        "tags": "furniture, SEO Optimized, Quality Product",
        "product_type": "Home & Garden",
        "seo_title": format!("{title} | Demo Store"),
        "seo_description": format!("Shop {title}."),
    })
}

/// Minimal Admin REST surface: `shop.json`, paged `products.json` and the
/// two PUT endpoints.
pub struct MockShop {
    pages: Vec<Vec<Value>>,
    shop_status: StatusCode,
    failing_page: Option<usize>,
    failing_puts: Vec<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockShop {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            shop_status: StatusCode::OK,
            failing_page: None,
            failing_puts: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_shop_status(mut self, status: StatusCode) -> Self {
        self.shop_status = status;
        self
    }

    pub fn fail_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    pub fn fail_put(mut self, path_fragment: &str) -> Self {
        self.failing_puts.push(path_fragment.to_string());
        self
    }

    pub async fn spawn(self) -> (String, Arc<Self>) {
        let shop = Arc::new(self);
        let router = Router::new()
            .fallback(shop_handler)
            .with_state(shop.clone());
        (spawn_server(router).await, shop)
    }

    /// Product-page requests only.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.all_requests()
            .into_iter()
            .filter(|r| r.path.ends_with("/products.json"))
            .collect()
    }

    pub fn writes(&self) -> Vec<RecordedRequest> {
        self.all_requests()
            .into_iter()
            .filter(|r| r.method == Method::PUT)
            .collect()
    }

    pub fn all_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn shop_handler(
    State(shop): State<Arc<MockShop>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    shop.requests
        .lock()
        .expect("requests lock")
        .push(record(method.clone(), &uri, &headers, &body));

    let token = headers
        .get("x-shopify-access-token")
        .and_then(|v| v.to_str().ok());
    if token != Some(TEST_TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let path = uri.path();
    if method == Method::GET && path.ends_with("/shop.json") {
        if !shop.shop_status.is_success() {
            return shop.shop_status.into_response();
        }
        return Json(json!({
            "shop": {"name": "Demo Store", "myshopify_domain": "demo.myshopify.com"}
        }))
        .into_response();
    }

    if method == Method::GET && path.ends_with("/products.json") {
        let index = page_index(uri.query());
        if shop.failing_page == Some(index) {
            return StatusCode::BAD_GATEWAY.into_response();
        }
        let products = shop.pages.get(index).cloned().unwrap_or_default();
        let mut response = Json(json!({ "products": products })).into_response();
        if index + 1 < shop.pages.len() {
            let link = format!(
                "<https://demo.myshopify.com{path}?limit=250&page_info=page%3D{}>; rel=\"next\"",
                index + 1
            );
            response.headers_mut().insert(
                header::LINK,
                HeaderValue::from_str(&link).expect("link header"),
            );
        }
        return response;
    }

    if method == Method::PUT {
        if shop.failing_puts.iter().any(|f| path.contains(f.as_str())) {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        let echoed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        return Json(echoed).into_response();
    }

    StatusCode::NOT_FOUND.into_response()
}

fn page_index(query: Option<&str>) -> usize {
    query
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("page_info="))
        .and_then(|raw| urlencoding::decode(raw).ok())
        .and_then(|cursor| {
            cursor
                .strip_prefix("page=")
                .and_then(|n| n.parse::<usize>().ok())
        })
        .unwrap_or(0)
}

/// Canned provider responses keyed by request path.
pub struct MockProviders {
    routes: HashMap<String, (StatusCode, Value)>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProviders {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(mut self, path: &str, status: StatusCode, body: Value) -> Self {
        self.routes.insert(path.to_string(), (status, body));
        self
    }

    pub async fn spawn(self) -> (String, Arc<Self>) {
        let mock = Arc::new(self);
        let router = Router::new()
            .fallback(provider_handler)
            .with_state(mock.clone());
        (spawn_server(router).await, mock)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn hits(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

async fn provider_handler(
    State(mock): State<Arc<MockProviders>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.requests
        .lock()
        .expect("requests lock")
        .push(record(method, &uri, &headers, &body));
    match mock.routes.get(uri.path()) {
        Some((status, body)) => (*status, Json(body.clone())).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn chat_reply(text: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
}

pub fn generative_reply(text: &str) -> Value {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
}

pub fn chat_provider(name: &str, base: &str, path: &str) -> ProviderConfig {
    ProviderConfig {
        name: name.to_string(),
        url: format!("{base}{path}"),
        shape: ProviderShape::ChatCompletion,
        model: Some("test-model".to_string()),
        api_key: "test-key".to_string(),
        max_tokens: 64,
        temperature: 0.7,
    }
}
