use super::models::{
    ImageAltBody, ImageAltPayload, Product, ProductFieldsPatch, ProductUpdateBody,
    ProductUpdatePayload, ProductsEnvelope, ShopEnvelope, ShopInfo,
};
use super::pagination::next_page_info;
use reqwest::{Client, header::LINK};
use thiserror::Error;
use tracing::{debug, warn};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
pub const MAX_PAGE_SIZE: u32 = 250;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("upstream request failed: {detail}")]
    Upstream { status: Option<u16>, detail: String },
    #[error("invalid response: {0}")]
    Decode(String),
}

impl CatalogError {
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

fn request_error(err: reqwest::Error) -> CatalogError {
    CatalogError::Upstream {
        status: err.status().map(|status| status.as_u16()),
        detail: err.to_string(),
    }
}

fn status_error(status: reqwest::StatusCode, what: &str) -> CatalogError {
    CatalogError::Upstream {
        status: Some(status.as_u16()),
        detail: format!("{what} returned HTTP {status}"),
    }
}

/// Admin REST client scoped to one store.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    access_token: String,
    api_version: String,
}

impl CatalogClient {
    pub fn new(
        http: Client,
        store_url: &str,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: normalize_base_url(store_url),
            access_token: access_token.into(),
            api_version: api_version.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/admin/api/{}/{path}", self.base_url, self.api_version)
    }

    pub async fn verify_connection(&self) -> Result<ShopInfo, CatalogError> {
        let response = self
            .http
            .get(self.endpoint("shop.json"))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .await
            .map_err(|err| CatalogError::Connection(err.to_string()))?;
        if !response.status().is_success() {
            return Err(CatalogError::Connection(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let payload: ShopEnvelope = response
            .json()
            .await
            .map_err(|err| CatalogError::Decode(err.to_string()))?;
        Ok(payload.shop)
    }

    /// Reads the whole catalog, following `Link` cursors for at most
    /// `page_limit` pages. A failing page discards everything fetched so far.
    pub async fn fetch_all_products(
        &self,
        page_size: u32,
        page_limit: u32,
    ) -> Result<Vec<Product>, CatalogError> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut products = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=page_limit.max(1) {
            let mut request = self
                .http
                .get(self.endpoint("products.json"))
                .header(ACCESS_TOKEN_HEADER, &self.access_token)
                .query(&[("limit", limit.as_str())]);
            if let Some(page_info) = cursor.as_deref() {
                request = request.query(&[("page_info", page_info)]);
            }
            let response = request.send().await.map_err(request_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(status_error(status, &format!("products page {page}")));
            }
            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_info);
            let payload: ProductsEnvelope = response
                .json()
                .await
                .map_err(|err| CatalogError::Decode(err.to_string()))?;
            debug!(
                target = "remedy.catalog",
                page,
                count = payload.products.len(),
                "products_page_fetched"
            );
            products.extend(payload.products);

            match next {
                Some(next_cursor) => cursor = Some(next_cursor),
                None => return Ok(products),
            }
        }

        warn!(
            target = "remedy.catalog",
            page_limit,
            fetched = products.len(),
            "catalog_page_limit_reached"
        );
        Ok(products)
    }

    pub async fn patch_image_alt(
        &self,
        product_id: u64,
        image_id: u64,
        alt: &str,
    ) -> Result<(), CatalogError> {
        let body = ImageAltBody {
            image: ImageAltPayload { id: image_id, alt },
        };
        let response = self
            .http
            .put(self.endpoint(&format!("products/{product_id}/images/{image_id}.json")))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), "image update"));
        }
        Ok(())
    }

    pub async fn patch_product_fields(
        &self,
        product_id: u64,
        fields: &ProductFieldsPatch,
    ) -> Result<(), CatalogError> {
        let body = ProductUpdateBody {
            product: ProductUpdatePayload {
                id: product_id,
                fields,
            },
        };
        let response = self
            .http
            .put(self.endpoint(&format!("products/{product_id}.json")))
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), "product update"));
        }
        Ok(())
    }
}

fn normalize_base_url(store_url: &str) -> String {
    let trimmed = store_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockShop, TEST_TOKEN, compliant_product, deficient_product};
    use axum::http::{Method, StatusCode};

    fn client(base_url: &str) -> CatalogClient {
        CatalogClient::new(Client::new(), base_url, TEST_TOKEN, "2023-10")
    }

    #[test]
    fn bare_domains_get_https() {
        assert_eq!(
            normalize_base_url("demo.myshopify.com/"),
            "https://demo.myshopify.com"
        );
        assert_eq!(
            normalize_base_url("http://127.0.0.1:9000"),
            "http://127.0.0.1:9000"
        );
    }

    #[tokio::test]
    async fn verify_connection_returns_shop_name() {
        let (base, _shop) = MockShop::new(vec![]).spawn().await;
        let info = client(&base).verify_connection().await.expect("connect");
        assert_eq!(info.name, "Demo Store");
    }

    #[tokio::test]
    async fn verify_connection_maps_rejection() {
        let (base, _shop) = MockShop::new(vec![])
            .with_shop_status(StatusCode::UNAUTHORIZED)
            .spawn()
            .await;
        let err = client(&base)
            .verify_connection()
            .await
            .expect_err("should fail");
        assert!(matches!(err, CatalogError::Connection(_)));
    }

    #[tokio::test]
    async fn fetch_follows_link_cursors() {
        let (base, shop) = MockShop::new(vec![
            vec![deficient_product(1, "Desk Lamp"), compliant_product(2, "Chair")],
            vec![deficient_product(3, "Kettle")],
        ])
        .spawn()
        .await;
        let products = client(&base)
            .fetch_all_products(250, 40)
            .await
            .expect("fetch");
        let ids: Vec<u64> = products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let requests = shop.requests();
        assert_eq!(requests.len(), 2);
        let second = requests[1].query.clone().unwrap_or_default();
        assert!(second.contains("page_info=page%3D1"), "query was {second}");
    }

    #[tokio::test]
    async fn failing_page_yields_no_partial_catalog() {
        let (base, _shop) = MockShop::new(vec![
            vec![deficient_product(1, "Desk Lamp")],
            vec![deficient_product(2, "Kettle")],
        ])
        .fail_page(1)
        .spawn()
        .await;
        let err = client(&base)
            .fetch_all_products(250, 40)
            .await
            .expect_err("second page fails");
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn page_limit_truncates() {
        let (base, shop) = MockShop::new(vec![
            vec![deficient_product(1, "A")],
            vec![deficient_product(2, "B")],
            vec![deficient_product(3, "C")],
        ])
        .spawn()
        .await;
        let products = client(&base)
            .fetch_all_products(250, 2)
            .await
            .expect("fetch");
        assert_eq!(products.len(), 2);
        assert_eq!(shop.requests().len(), 2);
    }

    #[tokio::test]
    async fn product_patch_sends_only_set_fields() {
        let (base, shop) = MockShop::new(vec![]).spawn().await;
        let fields = ProductFieldsPatch {
            seo_title: Some("Kettle | Demo Store".into()),
            ..Default::default()
        };
        client(&base)
            .patch_product_fields(3, &fields)
            .await
            .expect("patch");
        let writes = shop.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].method, Method::PUT);
        assert!(writes[0].path.ends_with("/admin/api/2023-10/products/3.json"));
        assert_eq!(
            writes[0].body,
            serde_json::json!({"product": {"id": 3, "seo_title": "Kettle | Demo Store"}})
        );
    }

    #[tokio::test]
    async fn image_patch_surfaces_status() {
        let (base, _shop) = MockShop::new(vec![]).fail_put("/images/").spawn().await;
        let err = client(&base)
            .patch_image_alt(3, 30, "Kettle")
            .await
            .expect_err("image write fails");
        assert_eq!(err.status(), Some(500));
    }
}
