//! In-memory attachment repository.
//!
//! Keeps files and attachments behind one lock, so the count-validate-insert
//! sequence of `create` is serialized the same way the database store
//! serializes it with an advisory lock. Used by tests and embedded setups.

use std::collections::HashMap;
use std::sync::Arc;

use aegis_shared::types::{AttachmentId, FileId, UserId};
use chrono::Utc;
use tokio::sync::RwLock;

use super::error::AttachmentError;
use super::ordering::{apply_order_changes, next_display_order, plan_reorder};
use super::registry::AttachmentRegistry;
use super::service::AttachmentRepository;
use super::types::{
    Attachment, AttachmentStatistics, AttachmentWithFile, CreateAttachmentInput, EntityRef,
    FileInfo, UpdateAttachmentInput,
};
use super::validation::{validate_new_attachment, validate_update};

#[derive(Debug, Default)]
struct State {
    attachments: Vec<Attachment>,
    files: HashMap<FileId, FileInfo>,
}

impl State {
    fn live_file(&self, file_id: FileId) -> Option<&FileInfo> {
        self.files.get(&file_id).filter(|f| !f.is_deleted())
    }

    fn of_entity<'a>(
        &'a self,
        entity: &'a EntityRef,
        attachment_type: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Attachment> + 'a {
        self.attachments.iter().filter(move |a| {
            &a.entity == entity && attachment_type.is_none_or(|t| a.attachment_type == t)
        })
    }
}

/// Attachment repository backed by process memory.
#[derive(Debug)]
pub struct MemoryAttachmentRepository {
    registry: Arc<AttachmentRegistry>,
    state: RwLock<State>,
}

impl MemoryAttachmentRepository {
    /// Creates an empty repository validating against `registry`.
    #[must_use]
    pub fn new(registry: Arc<AttachmentRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(State::default()),
        }
    }

    /// Registers a file record, standing in for the file-storage subsystem.
    pub async fn insert_file(&self, file: FileInfo) {
        self.state.write().await.files.insert(file.id, file);
    }

    /// Soft-deletes a file record. Returns false if the file is unknown.
    pub async fn soft_delete_file(&self, file_id: FileId) -> bool {
        let mut state = self.state.write().await;
        match state.files.get_mut(&file_id) {
            Some(file) => {
                file.deleted_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }
}

fn sorted(mut attachments: Vec<Attachment>) -> Vec<Attachment> {
    attachments.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then(a.created_at.cmp(&b.created_at))
    });
    attachments
}

impl AttachmentRepository for MemoryAttachmentRepository {
    async fn find_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let state = self.state.read().await;
        Ok(sorted(
            state.of_entity(entity, attachment_type).cloned().collect(),
        ))
    }

    async fn find_by_entity_with_file(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<AttachmentWithFile>, AttachmentError> {
        let state = self.state.read().await;
        let attachments = sorted(state.of_entity(entity, attachment_type).cloned().collect());

        Ok(attachments
            .into_iter()
            .filter_map(|attachment| {
                let file = state.live_file(attachment.file_id)?.clone();
                Some(AttachmentWithFile { attachment, file })
            })
            .collect())
    }

    async fn find_by_id(&self, id: AttachmentId) -> Result<Option<Attachment>, AttachmentError> {
        let state = self.state.read().await;
        Ok(state.attachments.iter().find(|a| a.id == id).cloned())
    }

    async fn create(&self, input: CreateAttachmentInput) -> Result<Attachment, AttachmentError> {
        let mut state = self.state.write().await;

        let file = state
            .live_file(input.file_id)
            .ok_or(AttachmentError::FileNotFound(input.file_id))?;
        let current = state.of_entity(&input.entity, None).count() as u64;

        validate_new_attachment(&self.registry, &input, current, file)?;

        if state
            .of_entity(&input.entity, None)
            .any(|a| a.file_id == input.file_id)
        {
            return Err(AttachmentError::AlreadyAttached {
                file_id: input.file_id,
            });
        }

        let display_order = input.display_order.unwrap_or_else(|| {
            let highest = state.of_entity(&input.entity, None).map(|a| a.display_order).max();
            next_display_order(highest)
        });

        let attachment = Attachment {
            id: AttachmentId::new(),
            entity: input.entity,
            file_id: input.file_id,
            attachment_type: input.attachment_type,
            display_order,
            metadata: input.metadata.unwrap_or_default(),
            created_at: Utc::now(),
            created_by: input.created_by,
            updated_at: None,
        };
        state.attachments.push(attachment.clone());

        Ok(attachment)
    }

    async fn update(
        &self,
        id: AttachmentId,
        input: UpdateAttachmentInput,
    ) -> Result<Attachment, AttachmentError> {
        let mut state = self.state.write().await;
        let attachment = state
            .attachments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AttachmentError::NotFound(id))?;

        validate_update(&self.registry, attachment.entity.entity_type(), &input)?;

        if let Some(attachment_type) = input.attachment_type {
            attachment.attachment_type = attachment_type;
        }
        if let Some(display_order) = input.display_order {
            attachment.display_order = display_order;
        }
        if let Some(metadata) = input.metadata {
            attachment.metadata = metadata;
        }
        attachment.updated_at = Some(Utc::now());

        Ok(attachment.clone())
    }

    async fn delete(&self, id: AttachmentId) -> Result<bool, AttachmentError> {
        let mut state = self.state.write().await;
        let before = state.attachments.len();
        state.attachments.retain(|a| a.id != id);
        Ok(state.attachments.len() < before)
    }

    async fn delete_by_entity(&self, entity: &EntityRef) -> Result<u64, AttachmentError> {
        let mut state = self.state.write().await;
        let before = state.attachments.len();
        state.attachments.retain(|a| &a.entity != entity);
        Ok((before - state.attachments.len()) as u64)
    }

    async fn count_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<u64, AttachmentError> {
        let state = self.state.read().await;
        Ok(state.of_entity(entity, attachment_type).count() as u64)
    }

    async fn reorder(&self, entity: &EntityRef, file_ids: &[FileId]) -> Result<(), AttachmentError> {
        let mut state = self.state.write().await;
        let current: Vec<Attachment> = state.of_entity(entity, None).cloned().collect();
        let changes = plan_reorder(&current, file_ids)?;

        let now = Utc::now();
        for attachment in &mut state.attachments {
            if changes.iter().any(|c| c.attachment_id == attachment.id) {
                attachment.updated_at = Some(now);
            }
        }
        apply_order_changes(&mut state.attachments, &changes);
        Ok(())
    }

    async fn find_by_file_id(&self, file_id: FileId) -> Result<Vec<Attachment>, AttachmentError> {
        let state = self.state.read().await;
        let mut attachments: Vec<Attachment> = state
            .attachments
            .iter()
            .filter(|a| a.file_id == file_id)
            .cloned()
            .collect();
        attachments.sort_by_key(|a| a.created_at);
        Ok(attachments)
    }

    async fn count_by_file_id(&self, file_id: FileId) -> Result<u64, AttachmentError> {
        let state = self.state.read().await;
        Ok(state
            .attachments
            .iter()
            .filter(|a| a.file_id == file_id)
            .count() as u64)
    }

    async fn statistics(&self, owner: UserId) -> Result<AttachmentStatistics, AttachmentError> {
        let state = self.state.read().await;
        let mut stats = AttachmentStatistics::default();

        for file in state
            .files
            .values()
            .filter(|f| f.uploaded_by == owner && !f.is_deleted())
        {
            let count = state
                .attachments
                .iter()
                .filter(|a| a.file_id == file.id)
                .count() as u64;

            stats.total_files += 1;
            stats.total_attachments += count;
            if count > 0 {
                stats.files_with_attachments += 1;
            } else {
                stats.files_without_attachments += 1;
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::policy::AttachmentPolicy;

    fn file(owner: UserId, mime_type: &str) -> FileInfo {
        let id = FileId::new();
        FileInfo {
            id,
            original_name: format!("{id}.bin"),
            file_path: format!("uploads/{id}"),
            file_size: 1_000,
            mime_type: mime_type.to_string(),
            category: "document".to_string(),
            uploaded_by: owner,
            deleted_at: None,
        }
    }

    fn repo() -> MemoryAttachmentRepository {
        let registry = AttachmentRegistry::new([AttachmentPolicy::new("product")]).unwrap();
        MemoryAttachmentRepository::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_and_deleted_files() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();

        let missing = FileId::new();
        let result = repo
            .create(CreateAttachmentInput::new(entity.clone(), missing, "photo"))
            .await;
        assert!(matches!(result, Err(AttachmentError::FileNotFound(id)) if id == missing));

        let deleted = file(UserId::new(), "image/png");
        let deleted_id = deleted.id;
        repo.insert_file(deleted).await;
        assert!(repo.soft_delete_file(deleted_id).await);

        let result = repo
            .create(CreateAttachmentInput::new(entity, deleted_id, "photo"))
            .await;
        assert!(matches!(result, Err(AttachmentError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_file() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let f = file(UserId::new(), "image/png");
        let file_id = f.id;
        repo.insert_file(f).await;

        repo.create(CreateAttachmentInput::new(entity.clone(), file_id, "photo"))
            .await
            .unwrap();
        let result = repo
            .create(CreateAttachmentInput::new(entity.clone(), file_id, "manual"))
            .await;
        assert!(matches!(result, Err(AttachmentError::AlreadyAttached { .. })));

        // Same file on another entity is fine.
        let other = EntityRef::new("product", "p-2").unwrap();
        assert!(
            repo.create(CreateAttachmentInput::new(other, file_id, "photo"))
                .await
                .is_ok()
        );
        assert_eq!(repo.count_by_file_id(file_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_explicit_display_order_sorts_first() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let owner = UserId::new();
        let (a, b) = (file(owner, "image/png"), file(owner, "image/png"));
        let (a_id, b_id) = (a.id, b.id);
        repo.insert_file(a).await;
        repo.insert_file(b).await;

        repo.create(CreateAttachmentInput::new(entity.clone(), a_id, "photo"))
            .await
            .unwrap();
        let mut input = CreateAttachmentInput::new(entity.clone(), b_id, "photo");
        input.display_order = Some(-1);
        repo.create(input).await.unwrap();

        let listed = repo.find_by_entity(&entity, None).await.unwrap();
        assert_eq!(listed[0].file_id, b_id);
        assert_eq!(listed[1].file_id, a_id);
    }

    #[tokio::test]
    async fn test_with_file_hides_soft_deleted_files() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let owner = UserId::new();
        let (a, b) = (file(owner, "image/png"), file(owner, "application/pdf"));
        let (a_id, b_id) = (a.id, b.id);
        repo.insert_file(a).await;
        repo.insert_file(b).await;

        for id in [a_id, b_id] {
            repo.create(CreateAttachmentInput::new(entity.clone(), id, "photo"))
                .await
                .unwrap();
        }
        repo.soft_delete_file(a_id).await;

        let joined = repo.find_by_entity_with_file(&entity, None).await.unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].file.id, b_id);
        assert_eq!(repo.count_by_entity(&entity, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_default_order_follows_highest_after_removal() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let owner = UserId::new();

        let mut created = Vec::new();
        for _ in 0..4 {
            let f = file(owner, "image/png");
            let file_id = f.id;
            repo.insert_file(f).await;
            created.push(file_id);
        }

        let first = repo
            .create(CreateAttachmentInput::new(entity.clone(), created[0], "photo"))
            .await
            .unwrap();
        for file_id in &created[1..3] {
            repo.create(CreateAttachmentInput::new(entity.clone(), *file_id, "photo"))
                .await
                .unwrap();
        }
        assert!(repo.delete(first.id).await.unwrap());

        let appended = repo
            .create(CreateAttachmentInput::new(entity.clone(), created[3], "photo"))
            .await
            .unwrap();
        assert_eq!(appended.display_order, 3);

        let orders: Vec<i32> = repo
            .find_by_entity(&entity, None)
            .await
            .unwrap()
            .iter()
            .map(|a| a.display_order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_with_file_on_empty_entity() {
        let repo = repo();
        let entity = EntityRef::new("product", "nothing-here").unwrap();

        assert!(repo.find_by_entity_with_file(&entity, None).await.unwrap().is_empty());
        assert!(
            repo.find_by_entity_with_file(&entity, Some("photo"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_attachment_type_filter() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let owner = UserId::new();
        let (a, b, c) = (
            file(owner, "image/png"),
            file(owner, "image/png"),
            file(owner, "application/pdf"),
        );
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        for f in [a, b, c] {
            repo.insert_file(f).await;
        }

        for (file_id, attachment_type) in [(a_id, "photo"), (b_id, "photo"), (c_id, "manual")] {
            repo.create(CreateAttachmentInput::new(entity.clone(), file_id, attachment_type))
                .await
                .unwrap();
        }

        let photos = repo.find_by_entity(&entity, Some("photo")).await.unwrap();
        assert_eq!(photos.len(), 2);
        assert!(photos.iter().all(|a| a.attachment_type == "photo"));
        assert_eq!(repo.count_by_entity(&entity, Some("photo")).await.unwrap(), 2);
        assert_eq!(repo.count_by_entity(&entity, Some("manual")).await.unwrap(), 1);
        assert_eq!(repo.count_by_entity(&entity, Some("spec-sheet")).await.unwrap(), 0);
        assert_eq!(repo.count_by_entity(&entity, None).await.unwrap(), 3);

        let manuals = repo
            .find_by_entity_with_file(&entity, Some("manual"))
            .await
            .unwrap();
        assert_eq!(manuals.len(), 1);
        assert_eq!(manuals[0].file.id, c_id);
    }

    #[tokio::test]
    async fn test_statistics_skip_soft_deleted_files() {
        let repo = repo();
        let entity = EntityRef::new("product", "p-1").unwrap();
        let owner = UserId::new();
        let (kept, dropped, idle) = (
            file(owner, "image/png"),
            file(owner, "image/png"),
            file(owner, "image/png"),
        );
        let (kept_id, dropped_id) = (kept.id, dropped.id);
        for f in [kept, dropped, idle] {
            repo.insert_file(f).await;
        }
        for file_id in [kept_id, dropped_id] {
            repo.create(CreateAttachmentInput::new(entity.clone(), file_id, "photo"))
                .await
                .unwrap();
        }

        assert!(repo.soft_delete_file(dropped_id).await);

        let stats = repo.statistics(owner).await.unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.files_with_attachments, 1);
        assert_eq!(stats.files_without_attachments, 1);
        assert_eq!(stats.total_attachments, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_attachment() {
        let result = repo()
            .update(AttachmentId::new(), UpdateAttachmentInput::default())
            .await;
        assert!(matches!(result, Err(AttachmentError::NotFound(_))));
    }
}
