//! Children listing responses
//!
//! Maps `GET /me/drive/items/{id}/children` pages onto remote entry
//! descriptors. The remote path of an item is built from the path of the
//! folder being listed, so it never depends on `parentReference.path`,
//! which Graph omits for some drive types.
//!
//! See: <https://learn.microsoft.com/en-us/graph/api/driveitem-list-children>

use chrono::{DateTime, Utc};
use serde::Deserialize;

use drivemirror_core::domain::{
    ChangeToken, RemoteEntryDescriptor, RemoteId, RemotePath,
};

use crate::GraphError;

/// Path listing the children of the drive root
pub const ROOT_CHILDREN_PATH: &str = "/me/drive/root/children";

/// Path listing the children of a folder
pub fn children_path(id: &RemoteId) -> String {
    format!("/me/drive/items/{}/children", id.as_str())
}

/// Path of a file's content
pub fn content_path(id: &RemoteId) -> String {
    format!("/me/drive/items/{}/content", id.as_str())
}

// ============================================================================
// Microsoft Graph API response types (JSON deserialization)
// ============================================================================

/// One page of a children listing
#[derive(Debug, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub value: Vec<GraphDriveItem>,

    /// URL for the next page of results (present when more pages exist)
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// A drive item as listed by Graph
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDriveItem {
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub size: Option<u64>,

    /// Entity tag; changes whenever content or metadata changes
    pub e_tag: Option<String>,

    pub created_date_time: Option<DateTime<Utc>>,
    pub last_modified_date_time: Option<DateTime<Utc>>,

    pub created_by: Option<GraphIdentitySet>,
    pub last_modified_by: Option<GraphIdentitySet>,

    pub parent_reference: Option<GraphParentReference>,

    /// Folder facet (present if the item is a folder)
    pub folder: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct GraphIdentitySet {
    pub user: Option<GraphIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphIdentity {
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphParentReference {
    pub id: Option<String>,
}

impl GraphIdentitySet {
    /// Email of the user, or its display name when no email is exposed
    fn who(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        user.email.clone().or_else(|| user.display_name.clone())
    }
}

impl GraphDriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Builds the descriptor of this item listed under `parent_path`
    ///
    /// `parent_id` is used when the item carries no parent reference.
    pub fn into_descriptor(
        self,
        parent_path: &RemotePath,
        parent_id: Option<&RemoteId>,
    ) -> Result<RemoteEntryDescriptor, GraphError> {
        let invalid = |e: drivemirror_core::domain::DomainError| {
            GraphError::InvalidResponse(format!("drive item {}: {e}", self.id))
        };

        let id = RemoteId::new(self.id.as_str()).map_err(invalid)?;
        let remote_path = parent_path.join(&self.name).map_err(invalid)?;
        let parent_id = match self.parent_reference.as_ref().and_then(|p| p.id.as_deref()) {
            Some(pid) => Some(RemoteId::new(pid).map_err(invalid)?),
            None => parent_id.cloned(),
        };
        let is_folder = self.is_folder();

        Ok(RemoteEntryDescriptor {
            id,
            name: self.name,
            is_folder,
            size: if is_folder { None } else { self.size },
            parent_id,
            remote_path,
            change_token: self.e_tag.map(ChangeToken::new),
            created_at: self.created_date_time,
            modified_at: self.last_modified_date_time,
            created_by: self.created_by.as_ref().and_then(GraphIdentitySet::who),
            modified_by: self.last_modified_by.as_ref().and_then(GraphIdentitySet::who),
        })
    }
}
