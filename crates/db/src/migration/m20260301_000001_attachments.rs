//! Attachment schema.
//!
//! Creates the file records table and the polymorphic attachments table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(UPLOADED_FILES_SQL).await?;
        db.execute_unprepared(ENTITY_ATTACHMENTS_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS entity_attachments CASCADE;")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS uploaded_files CASCADE;")
            .await?;
        Ok(())
    }
}

const UPLOADED_FILES_SQL: &str = r"
-- File records owned by the upload subsystem
CREATE TABLE uploaded_files (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    original_name VARCHAR(255) NOT NULL,
    file_path TEXT NOT NULL,
    file_size BIGINT NOT NULL,
    mime_type VARCHAR(255) NOT NULL,
    category VARCHAR(50) NOT NULL,
    uploaded_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    deleted_at TIMESTAMPTZ,
    CONSTRAINT chk_file_size_non_negative CHECK (file_size >= 0)
);

-- Per-user usage statistics over live files
CREATE INDEX idx_uploaded_files_owner ON uploaded_files(uploaded_by) WHERE deleted_at IS NULL;
";

const ENTITY_ATTACHMENTS_SQL: &str = r"
-- Polymorphic links between files and business records
CREATE TABLE entity_attachments (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    entity_type VARCHAR(100) NOT NULL,
    entity_id VARCHAR(255) NOT NULL,
    file_id UUID NOT NULL REFERENCES uploaded_files(id) ON DELETE CASCADE,
    attachment_type VARCHAR(100) NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_by UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ,
    CONSTRAINT uq_entity_attachments_entity_file UNIQUE (entity_type, entity_id, file_id)
);

-- Listing an entity's attachments in display order
CREATE INDEX idx_entity_attachments_entity
    ON entity_attachments(entity_type, entity_id, display_order);

-- Reverse lookup from a file
CREATE INDEX idx_entity_attachments_file ON entity_attachments(file_id);
";
