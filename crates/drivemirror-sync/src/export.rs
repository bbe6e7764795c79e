//! `metadata.json` export
//!
//! After a successful cycle the engine writes a JSON object keyed by remote
//! id, one `{name, path, lastModifiedDateTime}` record per recorded entry.
//! The file sits in the principal directory, next to the mirror root, so it
//! can never collide with mirrored content.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use drivemirror_core::domain::RemoteEntry;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const METADATA_FILE_NAME: &str = "metadata.json";

/// One exported entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedEntry {
    pub name: String,
    /// Local path of the mirrored object
    pub path: String,
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

impl From<&RemoteEntry> for ExportedEntry {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            name: entry.descriptor.name.clone(),
            path: entry.local_path.display().to_string(),
            last_modified_date_time: entry.descriptor.modified_at,
        }
    }
}

/// Builds the exported map; keys are sorted so the output is stable
pub fn build_metadata(entries: &[RemoteEntry]) -> BTreeMap<String, ExportedEntry> {
    entries
        .iter()
        .map(|e| (e.id().as_str().to_string(), ExportedEntry::from(e)))
        .collect()
}

/// Atomically writes the export for `entries` to `path`
///
/// Returns the number of exported entries.
pub async fn write_metadata(path: &Path, entries: &[RemoteEntry]) -> Result<usize> {
    let metadata = build_metadata(entries);
    let json = serde_json::to_vec_pretty(&metadata).context("Failed to serialize metadata")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.partial");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move metadata into {}", path.display()))?;

    debug!(path = %path.display(), entries = metadata.len(), "Metadata exported");
    Ok(metadata.len())
}
