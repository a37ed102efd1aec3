use crate::classify::{Deficiency, RemediationItem};
use crate::config::RemediationPolicy;
use crate::content::{ContentGenerator, Generated, fallback};
use crate::metrics;
use crate::report::{FailureEntry, FixEntry, RunStats};
use crate::shopify::{CatalogClient, CatalogError, Product, ProductFieldsPatch};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Everything the applier produced during one run.
#[derive(Debug, Default)]
pub struct RunLedger {
    pub stats: RunStats,
    pub fixes: Vec<FixEntry>,
    pub failures: Vec<FailureEntry>,
}

/// Closes deficiencies one at a time: generate, write, count, pause.
/// A failed write is recorded and the next deficiency proceeds.
pub struct PatchApplier {
    client: CatalogClient,
    generator: ContentGenerator,
    policy: Arc<RemediationPolicy>,
    suffix: String,
}

impl PatchApplier {
    pub fn new(
        client: CatalogClient,
        generator: ContentGenerator,
        policy: Arc<RemediationPolicy>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            generator,
            policy,
            suffix: suffix.into(),
        }
    }

    pub async fn apply(&self, item: &mut RemediationItem, ledger: &mut RunLedger) {
        let deficiencies = std::mem::take(&mut item.deficiencies);
        for deficiency in &deficiencies {
            match deficiency {
                Deficiency::MissingAltText { image_ids } => {
                    self.fix_alt_text(&mut item.product, image_ids, ledger).await
                }
                Deficiency::InsufficientTags => self.fix_tags(&mut item.product, ledger).await,
                Deficiency::MissingMetaTags { title, description } => {
                    self.fix_meta_tags(&mut item.product, *title, *description, ledger)
                        .await
                }
                Deficiency::MissingCategory => {
                    self.fix_category(&mut item.product, ledger).await
                }
            }
        }
    }

    async fn fix_alt_text(&self, product: &mut Product, image_ids: &[u64], ledger: &mut RunLedger) {
        let generated = self.generator.alt_text(product).await;
        if self.withhold(&generated, product, "alt_text", ledger) {
            return;
        }
        for &image_id in image_ids {
            let result = self
                .client
                .patch_image_alt(product.id, image_id, &generated.value)
                .await;
            match result {
                Ok(()) => {
                    ledger.stats.alt_text_fixed += 1;
                    if let Some(image) = product.images.iter_mut().find(|i| i.id == image_id) {
                        image.alt = Some(generated.value.clone());
                    }
                    self.record_fix(product, "alt_text", Some(image_id), &generated, ledger);
                }
                Err(err) => self.record_failure(product, "alt_text", Some(image_id), &err, ledger),
            }
            self.pause().await;
        }
    }

    async fn fix_tags(&self, product: &mut Product, ledger: &mut RunLedger) {
        let generated = self.generator.tags(product).await;
        if self.withhold(&generated, product, "tags", ledger) {
            return;
        }
        let mut additions = generated.value.clone();
        additions.extend(self.policy.boilerplate_tags.iter().cloned());
        let mut tags = product.tag_list();
        let missing = fallback::missing_tags(&tags, &additions);
        if missing.is_empty() {
            ledger.stats.skipped += 1;
            info!(
                target = "remedy.applier",
                product_id = product.id,
                "tags_unchanged"
            );
            return;
        }
        tags.extend(missing);

        let joined = tags.join(", ");
        let fields = ProductFieldsPatch {
            tags: Some(joined.clone()),
            ..Default::default()
        };
        match self.client.patch_product_fields(product.id, &fields).await {
            Ok(()) => {
                ledger.stats.tags_fixed += 1;
                product.tags = Some(joined.clone());
                let written = Generated {
                    value: joined,
                    source: generated.source,
                };
                self.record_fix(product, "tags", None, &written, ledger);
            }
            Err(err) => self.record_failure(product, "tags", None, &err, ledger),
        }
        self.pause().await;
    }

    async fn fix_meta_tags(
        &self,
        product: &mut Product,
        title: bool,
        description: bool,
        ledger: &mut RunLedger,
    ) {
        let generated = self.generator.meta_tags(product, &self.suffix).await;
        if self.withhold(&generated, product, "meta_tags", ledger) {
            return;
        }
        let fields = ProductFieldsPatch {
            seo_title: title.then(|| generated.value.title.clone()),
            seo_description: description.then(|| generated.value.description.clone()),
            ..Default::default()
        };
        match self.client.patch_product_fields(product.id, &fields).await {
            Ok(()) => {
                ledger.stats.meta_tags_fixed += 1;
                if fields.seo_title.is_some() {
                    product.seo_title = fields.seo_title.clone();
                }
                if fields.seo_description.is_some() {
                    product.seo_description = fields.seo_description.clone();
                }
                let written = Generated {
                    value: [fields.seo_title, fields.seo_description]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" / "),
                    source: generated.source,
                };
                self.record_fix(product, "meta_tags", None, &written, ledger);
            }
            Err(err) => self.record_failure(product, "meta_tags", None, &err, ledger),
        }
        self.pause().await;
    }

    async fn fix_category(&self, product: &mut Product, ledger: &mut RunLedger) {
        let generated = self.generator.category(product).await;
        if self.withhold(&generated, product, "category", ledger) {
            return;
        }
        let fields = ProductFieldsPatch {
            product_type: Some(generated.value.clone()),
            ..Default::default()
        };
        match self.client.patch_product_fields(product.id, &fields).await {
            Ok(()) => {
                ledger.stats.category_fixed += 1;
                product.product_type = Some(generated.value.clone());
                self.record_fix(product, "category", None, &generated, ledger);
            }
            Err(err) => self.record_failure(product, "category", None, &err, ledger),
        }
        self.pause().await;
    }

    // Locally generated content is only written when the policy allows it.
    fn withhold<T>(
        &self,
        generated: &Generated<T>,
        product: &Product,
        field: &'static str,
        ledger: &mut RunLedger,
    ) -> bool {
        if self.policy.write_local_fallback || !generated.is_fallback() {
            return false;
        }
        ledger.stats.skipped += 1;
        info!(
            target = "remedy.applier",
            product_id = product.id,
            field,
            "fallback_not_written"
        );
        true
    }

    fn record_fix(
        &self,
        product: &Product,
        field: &'static str,
        image_id: Option<u64>,
        generated: &Generated<String>,
        ledger: &mut RunLedger,
    ) {
        metrics::patch_write(field, true);
        info!(
            target = "remedy.applier",
            product_id = product.id,
            field,
            image_id = ?image_id,
            source = ?generated.source,
            "patch_applied"
        );
        ledger.fixes.push(FixEntry {
            product_id: product.id,
            title: product.title.clone(),
            field,
            image_id,
            value: generated.value.clone(),
            source: generated.source.clone(),
        });
    }

    fn record_failure(
        &self,
        product: &Product,
        field: &'static str,
        image_id: Option<u64>,
        err: &CatalogError,
        ledger: &mut RunLedger,
    ) {
        metrics::patch_write(field, false);
        ledger.stats.errors += 1;
        warn!(
            target = "remedy.applier",
            product_id = product.id,
            title = %product.title,
            field,
            image_id = ?image_id,
            status = ?err.status(),
            error = %err,
            "patch_failed"
        );
        ledger.failures.push(FailureEntry {
            product_id: product.id,
            title: product.title.clone(),
            field,
            image_id,
            status: err.status(),
            error: err.to_string(),
        });
    }

    async fn pause(&self) {
        let delay = self.policy.inter_call_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}
