//! Attachment error types.

use aegis_shared::AppError;
use aegis_shared::types::{AttachmentId, FileId};
use thiserror::Error;

use super::types::{Attachment, ByteSize};

/// Attachment operation errors.
///
/// Every variant rejects a single request; none is fatal to the process.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// Entity type has no registered policy.
    #[error(
        "no attachment policy for entity type '{entity_type}' (registered: {})",
        .registered.join(", ")
    )]
    ConfigNotFound {
        /// Requested entity type.
        entity_type: String,
        /// Every registered entity type.
        registered: Vec<String>,
    },

    /// Attachment type is not in the policy's whitelist.
    #[error(
        "attachment type '{attachment_type}' is not allowed (allowed: {})",
        .allowed.join(", ")
    )]
    InvalidAttachmentType {
        /// Rejected attachment type.
        attachment_type: String,
        /// Allowed attachment types.
        allowed: Vec<String>,
    },

    /// Entity already holds the maximum number of attachments.
    #[error("attachment quota exceeded for {entity_type}: {current} of {max_files} files attached")]
    QuotaExceeded {
        /// Entity type of the owning record.
        entity_type: String,
        /// Policy limit.
        max_files: u32,
        /// Attachment count before the rejected insert.
        current: u64,
    },

    /// File size exceeds the policy limit.
    #[error("file too large: {size} exceeds maximum {max}")]
    FileTooLarge {
        /// Reported file size.
        size: ByteSize,
        /// Policy limit.
        max: ByteSize,
    },

    /// MIME type is not permitted by the policy.
    #[error("MIME type '{mime_type}' is not allowed (allowed: {})", .allowed.join(", "))]
    MimeTypeNotAllowed {
        /// Rejected MIME type.
        mime_type: String,
        /// Allowed MIME patterns.
        allowed: Vec<String>,
    },

    /// One or more required metadata keys are absent or null.
    #[error("missing required metadata: {}", .keys.join(", "))]
    MissingRequiredMetadata {
        /// Every missing key.
        keys: Vec<String>,
    },

    /// Attachment not found.
    #[error("attachment not found: {0}")]
    NotFound(AttachmentId),

    /// File record missing or soft-deleted.
    #[error("file not found: {0}")]
    FileNotFound(FileId),

    /// File is already attached to the entity.
    #[error("file {file_id} is already attached to this entity")]
    AlreadyAttached {
        /// Duplicate file.
        file_id: FileId,
    },

    /// Entity reference is malformed.
    #[error("invalid entity reference: {0}")]
    InvalidReference(String),

    /// Reorder list is not a permutation of the entity's files.
    #[error("invalid reorder: {0}")]
    InvalidReorder(String),

    /// Policy configuration rejected at startup.
    #[error("invalid attachment policy: {0}")]
    InvalidPolicy(String),

    /// A bulk attach stopped part way. Earlier items stay attached.
    #[error("bulk attach failed at item {index} (file {file_id}): {source}")]
    BulkAttachFailed {
        /// Position of the failing item in the request.
        index: usize,
        /// File of the failing item.
        file_id: FileId,
        /// Attachments created before the failure.
        attached: Vec<Attachment>,
        /// Underlying failure.
        source: Box<AttachmentError>,
    },

    /// Underlying store failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl AttachmentError {
    /// Create a persistence error.
    #[must_use]
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an invalid reorder error.
    #[must_use]
    pub fn invalid_reorder(msg: impl Into<String>) -> Self {
        Self::InvalidReorder(msg.into())
    }

    /// Returns true when the request broke a policy rule, as opposed to a lookup or store failure.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAttachmentType { .. }
                | Self::QuotaExceeded { .. }
                | Self::FileTooLarge { .. }
                | Self::MimeTypeNotAllowed { .. }
                | Self::MissingRequiredMetadata { .. }
        )
    }
}

impl From<AttachmentError> for AppError {
    fn from(err: AttachmentError) -> Self {
        let msg = err.to_string();
        match err {
            AttachmentError::ConfigNotFound { .. }
            | AttachmentError::InvalidAttachmentType { .. }
            | AttachmentError::MissingRequiredMetadata { .. }
            | AttachmentError::InvalidReference(_)
            | AttachmentError::InvalidReorder(_) => Self::Validation(msg),
            AttachmentError::QuotaExceeded { .. } => Self::BusinessRule(msg),
            AttachmentError::FileTooLarge { .. } => Self::PayloadTooLarge(msg),
            AttachmentError::MimeTypeNotAllowed { .. } => Self::UnsupportedMediaType(msg),
            AttachmentError::NotFound(_) | AttachmentError::FileNotFound(_) => Self::NotFound(msg),
            AttachmentError::AlreadyAttached { .. } => Self::Conflict(msg),
            AttachmentError::InvalidPolicy(_) => Self::Configuration(msg),
            AttachmentError::Persistence(_) => Self::Database(msg),
            AttachmentError::BulkAttachFailed { source, .. } => {
                with_message(Self::from(*source), msg)
            }
        }
    }
}

/// Keeps the classification of `err` but replaces its message.
fn with_message(err: AppError, msg: String) -> AppError {
    match err {
        AppError::NotFound(_) => AppError::NotFound(msg),
        AppError::Validation(_) => AppError::Validation(msg),
        AppError::BusinessRule(_) => AppError::BusinessRule(msg),
        AppError::Conflict(_) => AppError::Conflict(msg),
        AppError::PayloadTooLarge(_) => AppError::PayloadTooLarge(msg),
        AppError::UnsupportedMediaType(_) => AppError::UnsupportedMediaType(msg),
        AppError::Configuration(_) => AppError::Configuration(msg),
        AppError::Database(_) => AppError::Database(msg),
        AppError::Internal(_) => AppError::Internal(msg),
    }
}
