mod applier;
mod classify;
mod config;
mod content;
mod http;
mod llm;
mod metrics;
mod pipeline;
mod report;
mod scheduler;
mod shopify;
mod tokens;

#[cfg(test)]
mod test_support;

use config::AppConfig;
use eyre::{Result, WrapErr, eyre};
use pipeline::Pipeline;
use scheduler::Scheduler;
use std::sync::Arc;
use tokens::{InMemoryTokenStore, RedisTokenStore, TokenStore, seed_stores};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "remedy.main", "remediation failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing();

    let config = AppConfig::load().wrap_err("loading configuration")?;
    let store: Arc<dyn TokenStore> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(RedisTokenStore::open(url).wrap_err("opening redis token store")?),
        None => Arc::new(InMemoryTokenStore::new()),
    };
    seed_stores(store.as_ref(), &config.stores)
        .await
        .wrap_err("seeding token store")?;

    info!(
        target = "remedy.main",
        providers = config.providers.len(),
        stores = config.stores.len(),
        dry_run = config.policy.dry_run,
        "configuration_loaded"
    );
    let pipeline = Pipeline::new(&config);

    if let Some(every) = config.schedule {
        let scheduler = Scheduler::new(pipeline, store, every);
        scheduler
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await;
        return Ok(());
    }

    let outcomes = pipeline.run_all(store.as_ref()).await;
    if outcomes.is_empty() {
        return Err(eyre!(
            "no stores configured; set SHOPIFY_STORE_URL/SHOPIFY_ACCESS_TOKEN or SHOPIFY_STORES"
        ));
    }
    let failed: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| {
            outcome.result.as_ref().err().map(|err| {
                format!("{} ({}: {})", outcome.store, err.stage(), err.detail())
            })
        })
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} store run(s) failed: {}", failed.len(), failed.join(", ")))
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
