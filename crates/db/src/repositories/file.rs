//! File record repository.
//!
//! File records belong to the upload subsystem; this accessor covers what the
//! seeder and tests need to stand one up.

use aegis_core::attachment::FileInfo;
use aegis_shared::types::{FileId, UserId};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};

use crate::entities::uploaded_files;

/// Input for registering an uploaded file.
#[derive(Debug, Clone)]
pub struct NewUploadedFile {
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
}

/// File repository for the `uploaded_files` table.
#[derive(Debug, Clone)]
pub struct FileRepository {
    db: DatabaseConnection,
}

impl FileRepository {
    /// Creates a new file repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Registers a file record.
    ///
    /// # Errors
    ///
    /// Returns an error if the size does not fit the column or the insert fails.
    pub async fn insert(&self, input: NewUploadedFile) -> Result<FileInfo, DbErr> {
        let file_size = i64::try_from(input.file_size)
            .map_err(|_| DbErr::Custom(format!("file size {} out of range", input.file_size)))?;

        let file = uploaded_files::ActiveModel {
            id: Set(FileId::new().into_inner()),
            original_name: Set(input.original_name),
            file_path: Set(input.file_path),
            file_size: Set(file_size),
            mime_type: Set(input.mime_type),
            category: Set(input.category),
            uploaded_by: Set(input.uploaded_by.into_inner()),
            created_at: Set(chrono::Utc::now().into()),
            deleted_at: Set(None),
        };

        file.insert(&self.db).await.map(to_file_info)
    }

    /// Finds a file record, including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: FileId) -> Result<Option<FileInfo>, DbErr> {
        let model = uploaded_files::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?;
        Ok(model.map(to_file_info))
    }

    /// Sets the soft-delete tombstone. Returns false if the file is unknown or already deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn soft_delete(&self, id: FileId) -> Result<bool, DbErr> {
        let Some(model) = uploaded_files::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await?
        else {
            return Ok(false);
        };
        if model.deleted_at.is_some() {
            return Ok(false);
        }

        let mut active: uploaded_files::ActiveModel = model.into();
        active.deleted_at = Set(Some(chrono::Utc::now().into()));
        active.update(&self.db).await?;
        Ok(true)
    }
}

/// Convert database model to the file record seen by the attachment engine.
pub(crate) fn to_file_info(model: uploaded_files::Model) -> FileInfo {
    FileInfo {
        id: FileId::from_uuid(model.id),
        original_name: model.original_name,
        file_path: model.file_path,
        // Non-negative by table constraint.
        file_size: u64::try_from(model.file_size).unwrap_or_default(),
        mime_type: model.mime_type,
        category: model.category,
        uploaded_by: UserId::from_uuid(model.uploaded_by),
        deleted_at: model.deleted_at.map(|t| t.with_timezone(&chrono::Utc)),
    }
}
