//! Read-only status surface
//!
//! Combines principals from the credential store with their sync status
//! and entry counts from the metadata store. Exposes no mutation.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    domain::{Principal, PrincipalId, SyncState, SyncStatus},
    ports::{ICredentialStore, IMetadataStore},
};

/// One principal as shown to a status reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrincipalSummary {
    pub id: PrincipalId,
    pub display_name: String,
    pub token_expires_at: DateTime<Utc>,
    pub state: SyncState,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub entry_count: u64,
}

pub struct StatusQuery {
    credentials: Arc<dyn ICredentialStore>,
    metadata: Arc<dyn IMetadataStore>,
}

impl StatusQuery {
    pub fn new(credentials: Arc<dyn ICredentialStore>, metadata: Arc<dyn IMetadataStore>) -> Self {
        Self {
            credentials,
            metadata,
        }
    }

    /// Every stored principal with its current status
    pub async fn list_principals(&self) -> Result<Vec<PrincipalSummary>> {
        let principals = self
            .credentials
            .list()
            .await
            .context("Failed to list principals")?;

        let mut summaries = Vec::with_capacity(principals.len());
        for principal in principals {
            summaries.push(self.summarize(principal).await?);
        }
        Ok(summaries)
    }

    /// Status of one principal, `None` if it never authenticated
    pub async fn status(&self, id: &PrincipalId) -> Result<Option<PrincipalSummary>> {
        match self.credentials.get(id).await? {
            Some(principal) => Ok(Some(self.summarize(principal).await?)),
            None => Ok(None),
        }
    }

    async fn summarize(&self, principal: Principal) -> Result<PrincipalSummary> {
        let status = self
            .metadata
            .get_status(principal.id())
            .await
            .with_context(|| format!("Failed to load status of {}", principal.id()))?
            .unwrap_or_else(|| SyncStatus::initial(principal.id().clone()));
        let entry_count = self.metadata.count_entries(principal.id()).await?;

        Ok(PrincipalSummary {
            id: principal.id().clone(),
            display_name: principal.display_name().to_string(),
            token_expires_at: principal.tokens().expires_at,
            state: status.state,
            last_started: status.last_started,
            last_finished: status.last_finished,
            last_error: status.last_error,
            entry_count,
        })
    }
}
