use crate::llm::{
    DEFAULT_MAX_TOKENS, DEFAULT_PROVIDERS, DEFAULT_TEMPERATURE, ProviderConfig, ProviderShape,
};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::warn;

pub const MIN_DELAY_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogSettings {
    pub api_version: String,
    pub page_size: u32,
    /// Upper bound on pages read per run.
    pub page_limit: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            api_version: "2023-10".to_string(),
            page_size: 250,
            page_limit: 40,
        }
    }
}

/// Knobs for what counts as deficient and how remediation writes back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemediationPolicy {
    pub delay_ms: u64,
    pub seo_tag_keywords: Vec<String>,
    /// 0 disables the tag-count check.
    pub min_tags: usize,
    pub boilerplate_tags: Vec<String>,
    pub alt_text_words: usize,
    pub top_tags: usize,
    pub default_category: String,
    pub brand: Option<String>,
    pub write_local_fallback: bool,
    pub dry_run: bool,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            delay_ms: 800,
            seo_tag_keywords: vec!["seo".into(), "quality".into(), "optimized".into()],
            min_tags: 0,
            boilerplate_tags: vec!["SEO Optimized".into(), "Quality Product".into()],
            alt_text_words: 6,
            top_tags: 3,
            default_category: "General Products".into(),
            brand: None,
            write_local_fallback: true,
            dry_run: false,
        }
    }
}

impl RemediationPolicy {
    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub domain: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderEntry {
    pub name: String,
    pub url: String,
    pub shape: ProviderShape,
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the credential.
    pub api_key_env: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub catalog: CatalogSettings,
    pub policy: RemediationPolicy,
    pub providers: Vec<ProviderEntry>,
    pub report_dir: Option<PathBuf>,
    pub schedule_secs: Option<u64>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub catalog: CatalogSettings,
    pub providers: Vec<ProviderConfig>,
    pub policy: RemediationPolicy,
    pub stores: Vec<StoreCredentials>,
    pub report_dir: Option<PathBuf>,
    pub schedule: Option<Duration>,
    pub redis_url: Option<String>,
}

impl AppConfig {
    /// `.env`, then the optional `REMEDY_CONFIG` YAML file, then
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let file = match env::var("REMEDY_CONFIG").ok().filter(|p| !p.trim().is_empty()) {
            Some(path) => FileConfig::from_path(Path::new(path.trim()))?,
            None => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| env::var(key).ok()))
    }

    pub fn from_sources(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut catalog = file.catalog;
        if let Some(version) = var("SHOPIFY_API_VERSION") {
            catalog.api_version = version;
        }
        if let Some(size) = var("CATALOG_PAGE_SIZE").and_then(|v| v.parse::<u32>().ok()) {
            catalog.page_size = size;
        }
        if let Some(limit) = var("CATALOG_PAGE_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            catalog.page_limit = limit;
        }
        catalog.page_size = catalog.page_size.clamp(1, 250);
        catalog.page_limit = catalog.page_limit.max(1);

        let mut policy = file.policy;
        if let Some(delay) = var("PATCH_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
            policy.delay_ms = delay;
        }
        if policy.delay_ms < MIN_DELAY_MS {
            warn!(
                target = "remedy.config",
                configured = policy.delay_ms,
                "patch delay raised to {MIN_DELAY_MS}ms"
            );
            policy.delay_ms = MIN_DELAY_MS;
        }
        if let Some(brand) = var("STORE_BRAND") {
            policy.brand = Some(brand);
        }
        if let Some(flag) = var("REMEDY_DRY_RUN") {
            policy.dry_run = parse_bool(&flag);
        }
        if let Some(flag) = var("REMEDY_WRITE_LOCAL_FALLBACK") {
            policy.write_local_fallback = parse_bool(&flag);
        }

        let providers = resolve_providers(&file.providers, &var);
        let stores = stores_from(&var);
        let report_dir = var("REMEDY_REPORT_DIR")
            .map(PathBuf::from)
            .or(file.report_dir);
        let schedule = var("REMEDY_SCHEDULE_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .or(file.schedule_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            catalog,
            providers,
            policy,
            stores,
            report_dir,
            schedule,
            redis_url: var("REDIS_URL"),
        }
    }
}

fn resolve_providers(
    entries: &[ProviderEntry],
    var: &impl Fn(&str) -> Option<String>,
) -> Vec<ProviderConfig> {
    let entries: Vec<ProviderEntry> = if entries.is_empty() {
        DEFAULT_PROVIDERS
            .iter()
            .map(|preset| ProviderEntry {
                name: preset.name.to_string(),
                url: preset.url.to_string(),
                shape: preset.shape,
                model: preset.model.map(str::to_string),
                api_key_env: preset.api_key_env.to_string(),
                max_tokens: None,
                temperature: None,
            })
            .collect()
    } else {
        entries.to_vec()
    };

    entries
        .into_iter()
        .filter_map(|entry| match var(&entry.api_key_env) {
            Some(api_key) => Some(ProviderConfig {
                name: entry.name,
                url: entry.url,
                shape: entry.shape,
                model: entry.model,
                api_key,
                max_tokens: entry.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                temperature: entry.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            }),
            None => {
                warn!(
                    target = "remedy.config",
                    provider = %entry.name,
                    "{} not set; provider disabled",
                    entry.api_key_env
                );
                None
            }
        })
        .collect()
}

fn stores_from(var: &impl Fn(&str) -> Option<String>) -> Vec<StoreCredentials> {
    let mut stores = Vec::new();
    if let (Some(domain), Some(access_token)) =
        (var("SHOPIFY_STORE_URL"), var("SHOPIFY_ACCESS_TOKEN"))
    {
        stores.push(StoreCredentials {
            domain,
            access_token,
        });
    }
    if let Some(raw) = var("SHOPIFY_STORES") {
        for entry in raw.split(',') {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.rsplit_once(':') {
                Some((domain, token)) if !domain.trim().is_empty() && !token.trim().is_empty() => {
                    stores.push(StoreCredentials {
                        domain: domain.trim().to_string(),
                        access_token: token.trim().to_string(),
                    })
                }
                _ => warn!(
                    target = "remedy.config",
                    "ignored malformed SHOPIFY_STORES entry"
                ),
            }
        }
    }
    stores
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
