use crate::applier::{PatchApplier, RunLedger};
use crate::classify::RemediationItem;
use crate::config::{AppConfig, CatalogSettings, RemediationPolicy};
use crate::content::{ContentGenerator, fallback::FALLBACK_SUFFIX};
use crate::http::build_client;
use crate::llm::{ProviderChain, ProviderConfig};
use crate::report::{IssueEntry, RunReport, StageReport};
use crate::shopify::{CatalogClient, CatalogError};
use crate::tokens::{TokenRecord, TokenStore};
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use std::{future::Future, path::PathBuf, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    http: Client,
    catalog: Arc<CatalogSettings>,
    policy: Arc<RemediationPolicy>,
    chain: ProviderChain,
    report_dir: Option<Arc<PathBuf>>,
}

/// Result of one store's run inside a multi-store pass.
#[derive(Debug)]
pub struct StoreOutcome {
    pub store: String,
    pub result: Result<RunReport, RunError>,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        Self::from_parts(
            build_client(),
            config.catalog.clone(),
            config.policy.clone(),
            config.providers.clone(),
            config.report_dir.clone(),
        )
    }

    pub fn from_parts(
        http: Client,
        catalog: CatalogSettings,
        policy: RemediationPolicy,
        providers: Vec<ProviderConfig>,
        report_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            chain: ProviderChain::new(http.clone(), providers),
            http,
            catalog: Arc::new(catalog),
            policy: Arc::new(policy),
            report_dir: report_dir.map(Arc::new),
        }
    }

    /// Runs every registered store in registration order. A failing store is
    /// logged and recorded; the remaining stores still run.
    pub async fn run_all(&self, store: &dyn TokenStore) -> Vec<StoreOutcome> {
        let records = match store.list().await {
            Ok(records) => records,
            Err(err) => {
                error!(target = "remedy.pipeline", error = %err, "store_listing_failed");
                return vec![StoreOutcome {
                    store: "*".to_string(),
                    result: Err(RunError::internal("list_stores", err.to_string())),
                }];
            }
        };
        if records.is_empty() {
            warn!(target = "remedy.pipeline", "no_stores_registered");
        }

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let result = self.run_store(&record).await;
            match &result {
                Ok(report) => {
                    if record.shop_name.is_none()
                        && let Some(name) = report.shop_name.clone()
                    {
                        let updated = TokenRecord {
                            shop_name: Some(name),
                            ..record.clone()
                        };
                        if let Err(err) = store.put(updated).await {
                            warn!(target = "remedy.pipeline", error = %err, "shop_name_not_saved");
                        }
                    }
                }
                Err(err) => error!(
                    target = "remedy.pipeline",
                    store = %record.shop_domain,
                    stage = err.stage(),
                    kind = ?err.kind(),
                    error = %err,
                    "store_run_failed"
                ),
            }
            outcomes.push(StoreOutcome {
                store: record.shop_domain,
                result,
            });
        }
        outcomes
    }

    pub async fn run_store(&self, record: &TokenRecord) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut stages = Vec::new();
        let policy = self.policy.clone();
        let client = CatalogClient::new(
            self.http.clone(),
            &record.shop_domain,
            record.access_token.clone(),
            self.catalog.api_version.clone(),
        );
        info!(
            target = "remedy.pipeline",
            %run_id,
            store = %record.shop_domain,
            dry_run = policy.dry_run,
            "run_started"
        );

        let shop = self
            .capture_stage("verify_connection", &mut stages, {
                let client = client.clone();
                async move { stages::verify_connection(&client).await }
            })
            .await?;

        let products = self
            .capture_stage("fetch_catalog", &mut stages, {
                let client = client.clone();
                let catalog = self.catalog.clone();
                async move { stages::fetch_catalog(&client, &catalog).await }
            })
            .await?;
        let analyzed = products.len();

        let (mut queue, issues) = self
            .capture_stage("classify", &mut stages, {
                let policy = policy.clone();
                async move { stages::classify(products, &policy) }
            })
            .await?;
        let needing_fix = queue.len();

        let suffix = brand_suffix(&policy, &shop.name);
        let ledger = self
            .capture_stage("remediate", &mut stages, {
                let applier = PatchApplier::new(
                    client.clone(),
                    ContentGenerator::new(self.chain.clone(), policy.clone()),
                    policy.clone(),
                    suffix,
                );
                let dry_run = policy.dry_run;
                async move { stages::remediate(&applier, &mut queue, dry_run).await }
            })
            .await?;

        let RunLedger {
            mut stats,
            fixes,
            failures,
        } = ledger;
        stats.analyzed = analyzed;
        stats.needing_fix = needing_fix;

        let report = RunReport {
            run_id,
            store: record.shop_domain.clone(),
            shop_name: Some(shop.name),
            started_at,
            finished_at: Utc::now(),
            dry_run: policy.dry_run,
            stats,
            stages,
            issues,
            fixes,
            failures,
        };
        report.log_summary();

        if let Some(dir) = &self.report_dir {
            match report.write_to(dir).await {
                Ok(path) => info!(
                    target = "remedy.pipeline",
                    path = %path.display(),
                    "report_written"
                ),
                Err(err) => warn!(target = "remedy.pipeline", error = %err, "report_write_failed"),
            }
        }
        Ok(report)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, RunError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, RunError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Configured brand, then the shop's own name, then a generic label.
fn brand_suffix(policy: &RemediationPolicy, shop_name: &str) -> String {
    policy
        .brand
        .as_deref()
        .map(str::trim)
        .filter(|brand| !brand.is_empty())
        .or_else(|| Some(shop_name.trim()).filter(|name| !name.is_empty()))
        .unwrap_or(FALLBACK_SUFFIX)
        .to_string()
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct RunError {
    stage: &'static str,
    message: String,
    kind: RunErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    Connection,
    Upstream,
    Internal,
}

impl RunError {
    pub fn connection(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: RunErrorKind::Connection,
        }
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: RunErrorKind::Upstream,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: RunErrorKind::Internal,
        }
    }

    fn from_catalog(stage: &'static str, err: CatalogError) -> Self {
        match err {
            CatalogError::Connection(detail) => Self::connection(stage, detail),
            other => Self::upstream(stage, other.to_string()),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> RunErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

mod stages {
    use super::*;
    use crate::shopify::{Product, ShopInfo};

    pub async fn verify_connection(
        client: &CatalogClient,
    ) -> Result<StageOutcome<ShopInfo>, RunError> {
        let shop = client
            .verify_connection()
            .await
            .map_err(|err| RunError::connection("verify_connection", err.to_string()))?;
        let output = json!({
            "shop": shop.name,
            "domain": shop.myshopify_domain.as_deref().or(shop.domain.as_deref()),
        });
        Ok(StageOutcome::new(shop, output))
    }

    pub async fn fetch_catalog(
        client: &CatalogClient,
        catalog: &CatalogSettings,
    ) -> Result<StageOutcome<Vec<Product>>, RunError> {
        let products = client
            .fetch_all_products(catalog.page_size, catalog.page_limit)
            .await
            .map_err(|err| RunError::from_catalog("fetch_catalog", err))?;
        let output = json!({
            "count": products.len(),
            "page_size": catalog.page_size,
            "page_limit": catalog.page_limit,
        });
        Ok(StageOutcome::new(products, output))
    }

    pub fn classify(
        products: Vec<Product>,
        policy: &RemediationPolicy,
    ) -> Result<StageOutcome<(Vec<RemediationItem>, Vec<IssueEntry>)>, RunError> {
        let analyzed = products.len();
        let queue: Vec<RemediationItem> = products
            .into_iter()
            .filter_map(|product| RemediationItem::from_product(product, policy))
            .collect();
        let issues: Vec<IssueEntry> = queue
            .iter()
            .map(|item| IssueEntry {
                product_id: item.product.id,
                title: item.product.title.clone(),
                deficiencies: item.deficiencies.iter().map(|d| d.field()).collect(),
            })
            .collect();

        let mut by_field = serde_json::Map::new();
        for field in issues.iter().flat_map(|issue| issue.deficiencies.iter()) {
            let count = by_field.entry(*field).or_insert(json!(0));
            *count = json!(count.as_u64().unwrap_or(0) + 1);
        }
        let output = json!({
            "analyzed": analyzed,
            "queued": queue.len(),
            "by_field": by_field,
        });
        Ok(StageOutcome::new((queue, issues), output))
    }

    pub async fn remediate(
        applier: &PatchApplier,
        queue: &mut [RemediationItem],
        dry_run: bool,
    ) -> Result<StageOutcome<RunLedger>, RunError> {
        let mut ledger = RunLedger::default();
        if dry_run {
            info!(
                target = "remedy.pipeline",
                queued = queue.len(),
                "dry_run_no_writes"
            );
            let output = json!({ "dry_run": true, "queued": queue.len() });
            return Ok(StageOutcome::new(ledger, output));
        }
        for item in queue.iter_mut() {
            applier.apply(item, &mut ledger).await;
        }
        let output = json!({
            "fixed": ledger.stats.fixed(),
            "skipped": ledger.stats.skipped,
            "errors": ledger.stats.errors,
        });
        Ok(StageOutcome::new(ledger, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::InMemoryTokenStore;
    use crate::test_support::{
        MockShop, TEST_TOKEN, compliant_product, deficient_product, test_policy,
    };
    use axum::http::StatusCode;

    fn pipeline(policy: RemediationPolicy, report_dir: Option<PathBuf>) -> Pipeline {
        Pipeline::from_parts(
            Client::new(),
            CatalogSettings::default(),
            policy,
            vec![],
            report_dir,
        )
    }

    fn record(base: &str) -> TokenRecord {
        TokenRecord::new(base, TEST_TOKEN)
    }

    #[tokio::test]
    async fn bare_speaker_is_fully_remediated() {
        let (base, shop) = MockShop::new(vec![vec![
            deficient_product(1, "Wireless Bluetooth Speaker XL Pro"),
            compliant_product(2, "Oak Chair"),
        ]])
        .spawn()
        .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let report = pipeline(test_policy(), Some(dir.path().to_path_buf()))
            .run_store(&record(&base))
            .await
            .expect("run");

        assert_eq!(report.stats.analyzed, 2);
        assert_eq!(report.stats.needing_fix, 1);
        assert_eq!(report.stats.fixed(), 4);
        assert_eq!(report.stats.errors, 0);
        assert_eq!(report.issues[0].deficiencies, vec!["alt_text", "tags", "meta_tags", "category"]);

        let values: Vec<(&str, &str)> = report
            .fixes
            .iter()
            .map(|fix| (fix.field, fix.value.as_str()))
            .collect();
        assert!(values.contains(&("alt_text", "Wireless Bluetooth Speaker")));
        assert!(values.contains(&("category", "Electronics")));

        let meta = &shop.writes()[2].body["product"];
        assert_eq!(
            meta["seo_title"],
            serde_json::json!("Wireless Bluetooth Speaker XL Pro | Demo Store")
        );

        let stage_names: Vec<&str> = report.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            stage_names,
            vec!["verify_connection", "fetch_catalog", "classify", "remediate"]
        );
        let written = std::fs::read_dir(dir.path()).expect("report dir").count();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn compliant_catalog_is_left_alone_across_runs() {
        let (base, shop) = MockShop::new(vec![vec![
            compliant_product(1, "Oak Chair"),
            compliant_product(2, "Pine Table"),
        ]])
        .spawn()
        .await;
        let pipeline = pipeline(test_policy(), None);
        for _ in 0..2 {
            let report = pipeline.run_store(&record(&base)).await.expect("run");
            assert_eq!(report.stats.needing_fix, 0);
            assert!(report.fixes.is_empty());
        }
        assert!(shop.writes().is_empty());
    }

    #[tokio::test]
    async fn connection_failure_stops_before_catalog_read() {
        let (base, shop) = MockShop::new(vec![vec![deficient_product(1, "Lamp")]])
            .with_shop_status(StatusCode::UNAUTHORIZED)
            .spawn()
            .await;
        let err = pipeline(test_policy(), None)
            .run_store(&record(&base))
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), RunErrorKind::Connection);
        assert_eq!(err.stage(), "verify_connection");
        assert!(shop.requests().is_empty());
    }

    #[tokio::test]
    async fn catalog_failure_aborts_without_writes() {
        let (base, shop) = MockShop::new(vec![vec![deficient_product(1, "Lamp")]])
            .fail_page(0)
            .spawn()
            .await;
        let err = pipeline(test_policy(), None)
            .run_store(&record(&base))
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), RunErrorKind::Upstream);
        assert_eq!(err.stage(), "fetch_catalog");
        assert!(shop.writes().is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_without_writing() {
        let (base, shop) = MockShop::new(vec![vec![deficient_product(1, "Lamp")]])
            .spawn()
            .await;
        let policy = RemediationPolicy {
            dry_run: true,
            ..test_policy()
        };
        let report = pipeline(policy, None)
            .run_store(&record(&base))
            .await
            .expect("run");
        assert!(report.dry_run);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.stats.fixed(), 0);
        assert!(shop.writes().is_empty());
    }

    #[tokio::test]
    async fn one_store_failing_does_not_stop_the_next() {
        let (broken, _) = MockShop::new(vec![])
            .with_shop_status(StatusCode::INTERNAL_SERVER_ERROR)
            .spawn()
            .await;
        let (healthy, _) = MockShop::new(vec![vec![compliant_product(1, "Oak Chair")]])
            .spawn()
            .await;
        let store = InMemoryTokenStore::new();
        store.put(record(&broken)).await.expect("put broken");
        store.put(record(&healthy)).await.expect("put healthy");

        let outcomes = pipeline(test_policy(), None).run_all(&store).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());

        let saved = store.get(&healthy).await.expect("get").expect("present");
        assert_eq!(saved.shop_name.as_deref(), Some("Demo Store"));
    }

    #[test]
    fn suffix_prefers_configured_brand() {
        let mut policy = test_policy();
        assert_eq!(brand_suffix(&policy, "Demo Store"), "Demo Store");
        assert_eq!(brand_suffix(&policy, " "), FALLBACK_SUFFIX);
        policy.brand = Some("Acme".into());
        assert_eq!(brand_suffix(&policy, "Demo Store"), "Acme");
    }
}
