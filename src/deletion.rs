//! Staged deletions.
//!
//! The TUI never deletes anything itself. It writes a manifest listing the
//! provider message ids to `<data_dir>/deletions/pending/<id>.json`, and a
//! separate executor works through pending manifests later.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::filter::DrillFilter;
use crate::query::{QueryEngine, QueryError, TimeGranularity, ViewDimension};

const MANIFEST_VERSION: u32 = 1;
const MAX_DESCRIPTION_LEN: usize = 30;
const MAX_ID_SUFFIX_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum DeletionError {
    #[error("no messages selected")]
    NothingSelected,
    #[error("error loading messages: {0}")]
    Query(#[from] QueryError),
    #[error("failed to write manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode manifest: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    fn dir_name(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

/// Criteria the batch was selected by, recorded for the executor's summary
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub senders: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sender_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub description: String,
    pub filters: Filters,
    pub gmail_ids: Vec<String>,
    pub status: Status,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, DeletionError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn message_count(&self) -> usize {
        self.gmail_ids.len()
    }
}

/// Builder for deletion manifests
#[derive(Default)]
pub struct ManifestBuilder {
    description: String,
    gmail_ids: Vec<String>,
    filters: Filters,
    created_by: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn gmail_ids(mut self, ids: Vec<String>) -> Self {
        self.gmail_ids = ids;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn build(self) -> Manifest {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Manifest {
            version: MANIFEST_VERSION,
            id: generate_id(&created_at, &self.description),
            created_at,
            created_by: self.created_by.unwrap_or_else(|| "cli".to_string()),
            description: self.description,
            filters: self.filters,
            gmail_ids: self.gmail_ids,
            status: Status::Pending,
        }
    }
}

/// `YYYYMMDD-HHMMSS-<sanitised description>`
fn generate_id(created_at: &DateTime<Utc>, description: &str) -> String {
    let mut suffix: String = sanitize_for_filename(description)
        .chars()
        .take(MAX_ID_SUFFIX_LEN)
        .collect();
    if suffix.is_empty() {
        suffix = "batch".to_string();
    }
    format!("{}-{}", created_at.format("%Y%m%d-%H%M%S"), suffix)
}

fn sanitize_for_filename(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => Some(c),
            ' ' | '.' => Some('-'),
            _ => None,
        })
        .collect()
}

/// Everything needed to resolve a selection into a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    /// Dimension the aggregate keys were selected under
    pub dimension: ViewDimension,
    pub aggregate_keys: Vec<String>,
    pub granularity: TimeGranularity,
    pub source_id: Option<i64>,
    /// Provider ids of selected messages in the current list
    pub message_source_ids: Vec<String>,
    /// Account identifier to scope the batch to, empty when ambiguous
    pub account: String,
    /// Shown in the confirm dialog
    pub warning: Option<String>,
}

/// A built manifest waiting for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDeletion {
    pub manifest: Manifest,
    pub warning: Option<String>,
}

/// Resolves the selection into provider ids and builds a manifest
pub fn stage(
    engine: &dyn QueryEngine,
    request: &StageRequest,
) -> Result<StagedDeletion, DeletionError> {
    let mut ids: BTreeSet<String> = BTreeSet::new();

    for key in &request.aggregate_keys {
        let filter =
            DrillFilter::for_key(request.dimension, key, request.granularity, request.source_id);
        ids.extend(engine.source_message_ids(&filter)?);
    }
    ids.extend(request.message_source_ids.iter().cloned());

    if ids.is_empty() {
        return Err(DeletionError::NothingSelected);
    }

    let mut filters = Filters::default();
    if !request.account.is_empty() {
        filters.account = Some(request.account.clone());
    }
    if let Some(first) = request.aggregate_keys.first() {
        let target = match request.dimension {
            ViewDimension::Senders => Some(&mut filters.senders),
            ViewDimension::Recipients => Some(&mut filters.recipients),
            ViewDimension::Domains => Some(&mut filters.sender_domains),
            ViewDimension::Labels => Some(&mut filters.labels),
            _ => None,
        };
        if let Some(target) = target {
            target.push(first.clone());
        }
    }

    let manifest = ManifestBuilder::new()
        .description(describe(request))
        .gmail_ids(ids.into_iter().collect())
        .filters(filters)
        .created_by("tui")
        .build();

    info!(
        "staged manifest {} with {} messages",
        manifest.id,
        manifest.message_count()
    );
    Ok(StagedDeletion {
        manifest,
        warning: request.warning.clone(),
    })
}

fn describe(request: &StageRequest) -> String {
    let description = match request.aggregate_keys.as_slice() {
        [key] => format!("{}-{}", request.dimension.label(), key),
        [] if !request.message_source_ids.is_empty() => {
            format!("messages-multiple({})", request.message_source_ids.len())
        }
        [] => "selection".to_string(),
        keys => format!("{}-multiple({})", request.dimension.label(), keys.len()),
    };
    description.chars().take(MAX_DESCRIPTION_LEN).collect()
}

/// Manifest storage laid out by status under one base directory
pub struct Manager {
    base_dir: PathBuf,
}

impl Manager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn dir_for(&self, status: Status) -> PathBuf {
        self.base_dir.join(status.dir_name())
    }

    /// Writes the manifest into the directory for its status, returning the file path
    pub fn save(&self, manifest: &Manifest) -> Result<PathBuf, DeletionError> {
        let dir = self.dir_for(manifest.status);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", manifest.id));
        let data = serde_json::to_string_pretty(manifest)?;
        fs::write(&path, data)?;
        Ok(path)
    }

    pub fn list(&self, status: Status) -> Result<Vec<Manifest>, DeletionError> {
        let dir = self.dir_for(status);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut manifests = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                manifests.push(Manifest::load(&path)?);
            }
        }
        manifests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MockQueryEngine;
    use chrono::TimeZone;

    fn request() -> StageRequest {
        StageRequest {
            dimension: ViewDimension::Senders,
            aggregate_keys: Vec::new(),
            granularity: TimeGranularity::Month,
            source_id: None,
            message_source_ids: Vec::new(),
            account: String::new(),
            warning: None,
        }
    }

    #[test]
    fn test_generate_id_sanitizes_and_truncates() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            generate_id(&at, "Senders-alice@example.com"),
            "20240506-070809-Senders-aliceexample"
        );
        assert_eq!(generate_id(&at, "@@@"), "20240506-070809-batch");
    }

    #[test]
    fn test_stage_resolves_aggregate_keys_through_engine() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_source_message_ids()
            .withf(|f| f.sender.as_deref() == Some("alice@example.com") && f.source_id == Some(4))
            .times(1)
            .returning(|_| Ok(vec!["g1".to_string(), "g2".to_string()]));

        let staged = stage(
            &engine,
            &StageRequest {
                aggregate_keys: vec!["alice@example.com".to_string()],
                source_id: Some(4),
                account: "me@example.com".to_string(),
                ..request()
            },
        )
        .unwrap();

        assert_eq!(staged.manifest.gmail_ids, vec!["g1", "g2"]);
        assert_eq!(staged.manifest.description, "Senders-alice@example.com");
        assert_eq!(staged.manifest.created_by, "tui");
        assert_eq!(staged.manifest.status, Status::Pending);
        assert_eq!(staged.manifest.filters.senders, vec!["alice@example.com"]);
        assert_eq!(
            staged.manifest.filters.account.as_deref(),
            Some("me@example.com")
        );
    }

    #[test]
    fn test_stage_time_keys_use_granularity() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_source_message_ids()
            .withf(|f| {
                f.time_range.as_ref().is_some_and(|t| {
                    t.period == "2024" && t.granularity == TimeGranularity::Year
                })
            })
            .returning(|_| Ok(vec!["g9".to_string()]));

        let staged = stage(
            &engine,
            &StageRequest {
                dimension: ViewDimension::Time,
                aggregate_keys: vec!["2024".to_string()],
                granularity: TimeGranularity::Year,
                ..request()
            },
        )
        .unwrap();
        assert_eq!(staged.manifest.gmail_ids, vec!["g9"]);
        assert!(staged.manifest.filters.senders.is_empty());
    }

    #[test]
    fn test_stage_message_selection_and_description() {
        let engine = MockQueryEngine::new();
        let staged = stage(
            &engine,
            &StageRequest {
                message_source_ids: vec!["a".into(), "b".into(), "a".into()],
                warning: Some("careful".into()),
                ..request()
            },
        )
        .unwrap();
        assert_eq!(staged.manifest.gmail_ids, vec!["a", "b"]);
        assert_eq!(staged.manifest.description, "messages-multiple(3)");
        assert_eq!(staged.warning.as_deref(), Some("careful"));
        assert!(staged.manifest.filters.account.is_none());
    }

    #[test]
    fn test_stage_multiple_keys_description_is_truncated() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_source_message_ids()
            .returning(|f| Ok(vec![f.recipient_name.clone().unwrap_or_default()]));

        let staged = stage(
            &engine,
            &StageRequest {
                dimension: ViewDimension::RecipientNames,
                aggregate_keys: vec!["Ann".into(), "Ben".into()],
                ..request()
            },
        )
        .unwrap();
        assert_eq!(staged.manifest.description, "Recipient Names-multiple(2)");

        let long = describe(&StageRequest {
            aggregate_keys: vec!["someone-with-a-very-long-address@example.com".into()],
            ..request()
        });
        assert_eq!(long.chars().count(), MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn test_stage_with_nothing_resolved_fails() {
        let mut engine = MockQueryEngine::new();
        engine
            .expect_source_message_ids()
            .returning(|_| Ok(Vec::new()));
        let result = stage(
            &engine,
            &StageRequest {
                aggregate_keys: vec!["nobody@example.com".into()],
                ..request()
            },
        );
        assert!(matches!(result, Err(DeletionError::NothingSelected)));
    }

    #[test]
    fn test_manager_save_and_list_pending() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(dir.path().join("deletions"));
        let manifest = ManifestBuilder::new()
            .description("Labels-Promotions")
            .gmail_ids(vec!["x".into()])
            .created_by("tui")
            .build();

        let path = manager.save(&manifest).unwrap();
        assert!(path.starts_with(dir.path().join("deletions").join("pending")));

        let listed = manager.list(Status::Pending).unwrap();
        assert_eq!(listed, vec![manifest]);
        assert!(manager.list(Status::Completed).unwrap().is_empty());
    }

    #[test]
    fn test_manifest_json_omits_empty_filters() {
        let manifest = ManifestBuilder::new()
            .description("x")
            .created_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .build();
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["created_by"], "cli");
        assert_eq!(json["filters"], serde_json::json!({}));
    }
}
