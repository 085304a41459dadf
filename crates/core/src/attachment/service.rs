//! Attachment service implementation.

use std::future::Future;
use std::sync::Arc;

use aegis_shared::types::{AttachmentId, FileId, UserId};
use tracing::{debug, info, warn};

use super::error::AttachmentError;
use super::policy::AttachmentPolicy;
use super::registry::AttachmentRegistry;
use super::types::{
    Attachment, AttachmentStatistics, AttachmentWithFile, BulkAttachItem, CreateAttachmentInput,
    EntityRef, Metadata, UpdateAttachmentInput,
};

/// Repository trait for attachment persistence.
///
/// This trait is implemented by the db crate to provide actual database operations.
/// Implementations own the create rules: they count, validate through
/// [`super::validation::validate_new_attachment`] and insert as one step.
pub trait AttachmentRepository: Send + Sync {
    /// Attachments of an entity ordered by `(display_order, created_at)`.
    fn find_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Attachment>, AttachmentError>> + Send;

    /// Same as [`Self::find_by_entity`], joined with live (not soft-deleted) files.
    fn find_by_entity_with_file(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> impl Future<Output = Result<Vec<AttachmentWithFile>, AttachmentError>> + Send;

    /// Find attachment by ID.
    fn find_by_id(
        &self,
        id: AttachmentId,
    ) -> impl Future<Output = Result<Option<Attachment>, AttachmentError>> + Send;

    /// Validate and insert a new attachment.
    fn create(
        &self,
        input: CreateAttachmentInput,
    ) -> impl Future<Output = Result<Attachment, AttachmentError>> + Send;

    /// Apply the supplied fields and refresh `updated_at`.
    fn update(
        &self,
        id: AttachmentId,
        input: UpdateAttachmentInput,
    ) -> impl Future<Output = Result<Attachment, AttachmentError>> + Send;

    /// Delete attachment by ID. Returns false if it did not exist.
    fn delete(&self, id: AttachmentId)
    -> impl Future<Output = Result<bool, AttachmentError>> + Send;

    /// Delete every attachment of an entity, returning how many were removed.
    fn delete_by_entity(
        &self,
        entity: &EntityRef,
    ) -> impl Future<Output = Result<u64, AttachmentError>> + Send;

    /// Count attachments of an entity.
    fn count_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> impl Future<Output = Result<u64, AttachmentError>> + Send;

    /// Atomically rewrite display orders to follow `file_ids`.
    fn reorder(
        &self,
        entity: &EntityRef,
        file_ids: &[FileId],
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;

    /// Every attachment of a file, across entities.
    fn find_by_file_id(
        &self,
        file_id: FileId,
    ) -> impl Future<Output = Result<Vec<Attachment>, AttachmentError>> + Send;

    /// Count attachments of a file.
    fn count_by_file_id(
        &self,
        file_id: FileId,
    ) -> impl Future<Output = Result<u64, AttachmentError>> + Send;

    /// Usage report over the files owned by `owner`.
    fn statistics(
        &self,
        owner: UserId,
    ) -> impl Future<Output = Result<AttachmentStatistics, AttachmentError>> + Send;
}

/// Attachment service, the single entry point for attachment use cases.
pub struct AttachmentService<R: AttachmentRepository> {
    registry: Arc<AttachmentRegistry>,
    repo: Arc<R>,
}

impl<R: AttachmentRepository> AttachmentService<R> {
    /// Create a new attachment service.
    #[must_use]
    pub fn new(registry: Arc<AttachmentRegistry>, repo: Arc<R>) -> Self {
        Self { registry, repo }
    }

    /// Policy registry the service validates against.
    #[must_use]
    pub fn registry(&self) -> &AttachmentRegistry {
        &self.registry
    }

    /// Attach a file to an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The entity type has no policy
    /// - The file does not exist or is already attached
    /// - Any policy rule rejects the attachment
    /// - Database operation fails
    pub async fn attach_file(
        &self,
        entity: &EntityRef,
        file_id: FileId,
        attachment_type: impl Into<String>,
        metadata: Option<Metadata>,
        actor: Option<UserId>,
    ) -> Result<Attachment, AttachmentError> {
        let mut input = CreateAttachmentInput::new(entity.clone(), file_id, attachment_type);
        input.metadata = metadata;
        input.created_by = actor;
        self.attach(input).await
    }

    /// Attach a file with explicit size, MIME or position overrides.
    ///
    /// # Errors
    ///
    /// Same as [`Self::attach_file`].
    pub async fn attach(&self, input: CreateAttachmentInput) -> Result<Attachment, AttachmentError> {
        let entity = input.entity.clone();
        let file_id = input.file_id;

        match self.repo.create(input).await {
            Ok(attachment) => {
                info!(
                    entity = %entity,
                    file_id = %file_id,
                    attachment_id = %attachment.id,
                    display_order = attachment.display_order,
                    "File attached"
                );
                Ok(attachment)
            }
            Err(e) if e.is_policy_violation() => {
                warn!(entity = %entity, file_id = %file_id, error = %e, "Attach rejected by policy");
                Err(e)
            }
            Err(e) => {
                warn!(entity = %entity, file_id = %file_id, error = %e, "Attach failed");
                Err(e)
            }
        }
    }

    /// Attach several files in input order.
    ///
    /// Best effort: a failure stops the batch but keeps what was already
    /// attached. The error reports the failing item and the attachments created
    /// before it.
    ///
    /// # Errors
    ///
    /// Returns `BulkAttachFailed` wrapping the first item failure.
    pub async fn bulk_attach_files(
        &self,
        entity: &EntityRef,
        items: Vec<BulkAttachItem>,
        actor: Option<UserId>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let mut attached = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let file_id = item.file_id;
            match self
                .attach_file(entity, file_id, item.attachment_type, item.metadata, actor)
                .await
            {
                Ok(attachment) => attached.push(attachment),
                Err(e) => {
                    return Err(AttachmentError::BulkAttachFailed {
                        index,
                        file_id,
                        attached,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(attached)
    }

    /// List attachments of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_entity_attachments(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        debug!(entity = %entity, "Listing attachments");
        self.repo.find_by_entity(entity, attachment_type).await
    }

    /// List attachments of an entity together with their file records.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_entity_attachments_with_files(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<AttachmentWithFile>, AttachmentError> {
        self.repo
            .find_by_entity_with_file(entity, attachment_type)
            .await
    }

    /// Get attachment by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if attachment not found or database operation fails.
    pub async fn get_attachment(&self, id: AttachmentId) -> Result<Attachment, AttachmentError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(AttachmentError::NotFound(id))
    }

    /// Update attachment type, position or metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment does not exist, a new attachment type
    /// or metadata breaks the policy, or database operation fails.
    pub async fn update_attachment(
        &self,
        id: AttachmentId,
        input: UpdateAttachmentInput,
    ) -> Result<Attachment, AttachmentError> {
        self.repo.update(id, input).await
    }

    /// Remove one attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment does not exist or database operation fails.
    pub async fn remove_attachment(&self, id: AttachmentId) -> Result<(), AttachmentError> {
        if self.repo.delete(id).await? {
            info!(attachment_id = %id, "Attachment removed");
            Ok(())
        } else {
            Err(AttachmentError::NotFound(id))
        }
    }

    /// Put an entity's attachments in the order of `file_ids`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReorder` unless `file_ids` lists every attached file exactly once.
    pub async fn reorder_attachments(
        &self,
        entity: &EntityRef,
        file_ids: &[FileId],
    ) -> Result<(), AttachmentError> {
        self.repo.reorder(entity, file_ids).await?;
        info!(entity = %entity, count = file_ids.len(), "Attachments reordered");
        Ok(())
    }

    /// Count attachments of an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_attachment_count(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<u64, AttachmentError> {
        self.repo.count_by_entity(entity, attachment_type).await
    }

    /// Policy governing `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` for unregistered entity types.
    pub fn get_entity_config(&self, entity_type: &str) -> Result<&AttachmentPolicy, AttachmentError> {
        self.registry.get_policy(entity_type)
    }

    /// Every attachment of a file, across entities.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_attachments_by_file_id(
        &self,
        file_id: FileId,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        self.repo.find_by_file_id(file_id).await
    }

    /// Count attachments of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_attachment_count_by_file_id(
        &self,
        file_id: FileId,
    ) -> Result<u64, AttachmentError> {
        self.repo.count_by_file_id(file_id).await
    }

    /// Usage report over the files owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if database operation fails.
    pub async fn get_statistics(&self, owner: UserId) -> Result<AttachmentStatistics, AttachmentError> {
        self.repo.statistics(owner).await
    }

    /// Delete every attachment of an entity that is being deleted.
    ///
    /// Callers invoke this for entity types whose policy cascades; file records
    /// are left to the file-storage subsystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity type has no policy or database operation fails.
    pub async fn cleanup_entity(&self, entity: &EntityRef) -> Result<u64, AttachmentError> {
        let policy = self.registry.get_policy(entity.entity_type())?;
        if !policy.cascade_delete {
            warn!(
                entity = %entity,
                "Cleaning up attachments of an entity type that retains them"
            );
        }

        let removed = self.repo.delete_by_entity(entity).await?;
        info!(entity = %entity, removed, "Entity attachments cleaned up");
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
