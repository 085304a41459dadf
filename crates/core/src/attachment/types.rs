//! Attachment types and data structures.

use std::fmt;

use aegis_shared::types::{AttachmentId, FileId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AttachmentError;

/// Free-form attachment metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Polymorphic reference to the record that owns an attachment.
///
/// `entity_type` is the discriminant selecting a policy; `entity_id` is opaque
/// to the engine. The referenced row lives in a table the engine does not own,
/// so the store cannot check it with a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EntityRef {
    entity_type: String,
    entity_id: String,
}

impl EntityRef {
    /// Creates an entity reference.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` if either part is blank.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Result<Self, AttachmentError> {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();

        if entity_type.trim().is_empty() {
            return Err(AttachmentError::InvalidReference(
                "entity type must not be empty".to_string(),
            ));
        }
        if entity_id.trim().is_empty() {
            return Err(AttachmentError::InvalidReference(format!(
                "entity id for '{entity_type}' must not be empty"
            )));
        }

        Ok(Self {
            entity_type,
            entity_id,
        })
    }

    /// Entity type discriminant.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Opaque id of the owning record.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A byte count rendered in human units (`1 MB`, `488.2 KB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

        let mut unit = 0;
        let mut divisor = 1u64;
        while self.0 / divisor >= 1024 && unit < UNITS.len() - 1 {
            divisor *= 1024;
            unit += 1;
        }

        let whole = self.0 / divisor;
        let tenths = (self.0 % divisor) * 10 / divisor;
        if tenths == 0 {
            write!(f, "{whole} {}", UNITS[unit])
        } else {
            write!(f, "{whole}.{tenths} {}", UNITS[unit])
        }
    }
}

/// Attachment domain model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    /// Unique identifier.
    pub id: AttachmentId,
    /// Owning record.
    pub entity: EntityRef,
    /// Attached file.
    pub file_id: FileId,
    /// Role the file plays for the owner (e.g. "photo", "invoice").
    pub attachment_type: String,
    /// Zero-based rank among the owner's attachments.
    pub display_order: i32,
    /// Free-form metadata.
    pub metadata: Metadata,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// User who attached the file.
    pub created_by: Option<UserId>,
    /// Last update timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

/// File record as exposed by the file-storage subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// File ID.
    pub id: FileId,
    /// Name the file was uploaded with.
    pub original_name: String,
    /// Storage path.
    pub file_path: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub mime_type: String,
    /// File category (image, document, ...).
    pub category: String,
    /// Owner of the file.
    pub uploaded_by: UserId,
    /// Soft-delete tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Returns true if the file has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Attachment joined with its live file record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentWithFile {
    /// Attachment record.
    pub attachment: Attachment,
    /// File record.
    pub file: FileInfo,
}

/// Input for creating an attachment record.
#[derive(Debug, Clone)]
pub struct CreateAttachmentInput {
    /// Owning record.
    pub entity: EntityRef,
    /// File to attach.
    pub file_id: FileId,
    /// Attachment type.
    pub attachment_type: String,
    /// Optional metadata.
    pub metadata: Option<Metadata>,
    /// Explicit position. Defaults to the end of the list.
    pub display_order: Option<i32>,
    /// Size override. Defaults to the file record's size.
    pub file_size: Option<u64>,
    /// MIME override. Defaults to the file record's MIME type.
    pub mime_type: Option<String>,
    /// Acting user.
    pub created_by: Option<UserId>,
}

impl CreateAttachmentInput {
    /// Creates an input with every optional field unset.
    #[must_use]
    pub fn new(entity: EntityRef, file_id: FileId, attachment_type: impl Into<String>) -> Self {
        Self {
            entity,
            file_id,
            attachment_type: attachment_type.into(),
            metadata: None,
            display_order: None,
            file_size: None,
            mime_type: None,
            created_by: None,
        }
    }
}

/// Input for updating an attachment. Only supplied fields change.
#[derive(Debug, Clone, Default)]
pub struct UpdateAttachmentInput {
    /// New attachment type.
    pub attachment_type: Option<String>,
    /// New display order.
    pub display_order: Option<i32>,
    /// Replacement metadata.
    pub metadata: Option<Metadata>,
}

/// One file in a bulk attach request.
#[derive(Debug, Clone)]
pub struct BulkAttachItem {
    /// File to attach.
    pub file_id: FileId,
    /// Attachment type.
    pub attachment_type: String,
    /// Optional metadata.
    pub metadata: Option<Metadata>,
}

/// Usage report over the files owned by one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentStatistics {
    /// Live files owned by the user.
    pub total_files: u64,
    /// Files with at least one attachment.
    pub files_with_attachments: u64,
    /// Files with no attachment.
    pub files_without_attachments: u64,
    /// Attachments across all of the user's files.
    pub total_attachments: u64,
}
