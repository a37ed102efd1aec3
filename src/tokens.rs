use crate::config::StoreCredentials;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

const REDIS_HASH_KEY: &str = "remedy:shops";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    pub shop_domain: String,
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub shop_name: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(shop_domain: &str, access_token: impl Into<String>) -> Self {
        Self {
            shop_domain: normalize_shop_domain(shop_domain),
            access_token: access_token.into(),
            scope: None,
            shop_name: None,
            installed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store backend failed: {0}")]
    Backend(String),
    #[error("corrupt token record for {shop}: {detail}")]
    Corrupt { shop: String, detail: String },
}

/// Shop domain to credential mapping. Keys are normalized with
/// [`normalize_shop_domain`] on every call.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, shop: &str) -> Result<Option<TokenRecord>, StoreError>;
    async fn put(&self, record: TokenRecord) -> Result<(), StoreError>;
    async fn delete(&self, shop: &str) -> Result<bool, StoreError>;
    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError>;
}

/// Bare shop handles gain `.myshopify.com`; explicit URLs are kept as given.
pub fn normalize_shop_domain(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    let lowered = trimmed.to_lowercase();
    if lowered.contains('.') {
        lowered
    } else {
        format!("{lowered}.myshopify.com")
    }
}

pub async fn seed_stores(
    store: &dyn TokenStore,
    stores: &[StoreCredentials],
) -> Result<usize, StoreError> {
    for credentials in stores {
        let mut record = TokenRecord::new(&credentials.domain, credentials.access_token.clone());
        if let Some(existing) = store.get(&record.shop_domain).await? {
            record.installed_at = existing.installed_at;
            record.scope = existing.scope;
            record.shop_name = existing.shop_name;
        }
        store.put(record).await?;
    }
    if !stores.is_empty() {
        info!(target = "remedy.tokens", count = stores.len(), "stores_seeded");
    }
    Ok(stores.len())
}

/// Process-local store; registration order is preserved.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: Mutex<Vec<TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, shop: &str) -> Result<Option<TokenRecord>, StoreError> {
        let key = normalize_shop_domain(shop);
        let guard = self.records.lock().await;
        Ok(guard.iter().find(|r| r.shop_domain == key).cloned())
    }

    async fn put(&self, mut record: TokenRecord) -> Result<(), StoreError> {
        record.shop_domain = normalize_shop_domain(&record.shop_domain);
        let mut guard = self.records.lock().await;
        match guard.iter_mut().find(|r| r.shop_domain == record.shop_domain) {
            Some(slot) => *slot = record,
            None => guard.push(record),
        }
        Ok(())
    }

    async fn delete(&self, shop: &str) -> Result<bool, StoreError> {
        let key = normalize_shop_domain(shop);
        let mut guard = self.records.lock().await;
        let before = guard.len();
        guard.retain(|r| r.shop_domain != key);
        Ok(guard.len() != before)
    }

    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }
}

/// Records are JSON values in a single Redis hash keyed by shop domain.
pub struct RedisTokenStore {
    client: redis::Client,
}

impl RedisTokenStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

fn decode(shop: &str, raw: &str) -> Result<TokenRecord, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Corrupt {
        shop: shop.to_string(),
        detail: err.to_string(),
    })
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, shop: &str) -> Result<Option<TokenRecord>, StoreError> {
        let key = normalize_shop_domain(shop);
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .hget(REDIS_HASH_KEY, &key)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        raw.map(|value| decode(&key, &value)).transpose()
    }

    async fn put(&self, mut record: TokenRecord) -> Result<(), StoreError> {
        record.shop_domain = normalize_shop_domain(&record.shop_domain);
        let json = serde_json::to_string(&record).map_err(|err| StoreError::Corrupt {
            shop: record.shop_domain.clone(),
            detail: err.to_string(),
        })?;
        let mut conn = self.connection().await?;
        let _: () = conn
            .hset(REDIS_HASH_KEY, &record.shop_domain, json)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(())
    }

    async fn delete(&self, shop: &str) -> Result<bool, StoreError> {
        let key = normalize_shop_domain(shop);
        let mut conn = self.connection().await?;
        let removed: usize = conn
            .hdel(REDIS_HASH_KEY, &key)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(removed > 0)
    }

    async fn list(&self) -> Result<Vec<TokenRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: HashMap<String, String> = conn
            .hgetall(REDIS_HASH_KEY)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        let mut records = raw
            .iter()
            .map(|(shop, value)| decode(shop, value))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| {
            a.installed_at
                .cmp(&b.installed_at)
                .then_with(|| a.shop_domain.cmp(&b.shop_domain))
        });
        Ok(records)
    }
}
