use crate::content::ContentSource;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("report encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Counters for one run of one store.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RunStats {
    pub analyzed: usize,
    pub needing_fix: usize,
    pub alt_text_fixed: usize,
    pub tags_fixed: usize,
    pub meta_tags_fixed: usize,
    pub category_fixed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn fixed(&self) -> usize {
        self.alt_text_fixed + self.tags_fixed + self.meta_tags_fixed + self.category_fixed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueEntry {
    pub product_id: u64,
    pub title: String,
    pub deficiencies: Vec<&'static str>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct FixEntry {
    pub product_id: u64,
    pub title: String,
    pub field: &'static str,
    pub image_id: Option<u64>,
    pub value: String,
    #[serde(flatten)]
    pub source: ContentSource,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub product_id: u64,
    pub title: String,
    pub field: &'static str,
    pub image_id: Option<u64>,
    pub status: Option<u16>,
    pub error: String,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub store: String,
    pub shop_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub stats: RunStats,
    pub stages: Vec<StageReport>,
    pub issues: Vec<IssueEntry>,
    pub fixes: Vec<FixEntry>,
    pub failures: Vec<FailureEntry>,
}

impl RunReport {
    pub fn log_summary(&self) {
        let stats = &self.stats;
        info!(
            target = "remedy.report",
            run_id = %self.run_id,
            store = %self.store,
            analyzed = stats.analyzed,
            needing_fix = stats.needing_fix,
            alt_text = stats.alt_text_fixed,
            tags = stats.tags_fixed,
            meta_tags = stats.meta_tags_fixed,
            category = stats.category_fixed,
            skipped = stats.skipped,
            errors = stats.errors,
            dry_run = self.dry_run,
            "run_summary"
        );
    }

    pub fn file_name(&self) -> String {
        let slug: String = self
            .store
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '-' })
            .collect();
        let short_id = self.run_id.simple().to_string();
        format!(
            "remediation-{}-{}-{}.json",
            slug.trim_matches('-'),
            self.finished_at.format("%Y%m%dT%H%M%SZ"),
            &short_id[..8]
        )
    }

    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
