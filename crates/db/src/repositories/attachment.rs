//! Attachment repository for database operations.
//!
//! Implements the core attachment repository using SeaORM. Writes that depend
//! on the current attachment set of an entity (create, reorder) run inside one
//! transaction holding a transaction-scoped advisory lock on that entity.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbBackend,
    DbErr, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, Statement, TransactionTrait,
};
use tracing::debug;

use aegis_core::attachment::{
    Attachment, AttachmentError, AttachmentRegistry, AttachmentRepository as AttachmentRepoTrait,
    AttachmentStatistics, AttachmentWithFile, CreateAttachmentInput, EntityRef, Metadata,
    UpdateAttachmentInput, next_display_order, plan_reorder, validate_new_attachment,
    validate_update,
};
use aegis_shared::types::{AttachmentId, FileId, UserId};

use super::file::to_file_info;
use crate::entities::{entity_attachments, uploaded_files};

/// Attachment repository implementation.
#[derive(Debug, Clone)]
pub struct AttachmentRepository {
    db: DatabaseConnection,
    registry: Arc<AttachmentRegistry>,
}

impl AttachmentRepository {
    /// Create a new attachment repository validating against `registry`.
    #[must_use]
    pub fn new(db: DatabaseConnection, registry: Arc<AttachmentRegistry>) -> Self {
        Self { db, registry }
    }
}

#[derive(Debug, FromQueryResult)]
struct StatisticsRow {
    total_files: i64,
    files_with_attachments: i64,
    total_attachments: i64,
}

const STATISTICS_SQL: &str = r"
SELECT
    COUNT(*)::BIGINT AS total_files,
    (COUNT(*) FILTER (WHERE counts.attachments > 0))::BIGINT AS files_with_attachments,
    COALESCE(SUM(counts.attachments), 0)::BIGINT AS total_attachments
FROM (
    SELECT f.id, COUNT(ea.id) AS attachments
    FROM uploaded_files f
    LEFT JOIN entity_attachments ea ON ea.file_id = f.id
    WHERE f.uploaded_by = $1 AND f.deleted_at IS NULL
    GROUP BY f.id
) counts
";

impl AttachmentRepoTrait for AttachmentRepository {
    async fn find_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<Attachment>, AttachmentError> {
        let models = entity_attachments::Entity::find()
            .filter(entity_condition(entity, attachment_type))
            .order_by_asc(entity_attachments::Column::DisplayOrder)
            .order_by_asc(entity_attachments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        models.into_iter().map(to_domain).collect()
    }

    async fn find_by_entity_with_file(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<Vec<AttachmentWithFile>, AttachmentError> {
        let rows = entity_attachments::Entity::find()
            .filter(entity_condition(entity, attachment_type))
            .find_also_related(uploaded_files::Entity)
            .filter(uploaded_files::Column::DeletedAt.is_null())
            .order_by_asc(entity_attachments::Column::DisplayOrder)
            .order_by_asc(entity_attachments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .filter_map(|(attachment, file)| file.map(|file| (attachment, file)))
            .map(|(attachment, file)| {
                Ok(AttachmentWithFile {
                    attachment: to_domain(attachment)?,
                    file: to_file_info(file),
                })
            })
            .collect()
    }

    async fn find_by_id(&self, id: AttachmentId) -> Result<Option<Attachment>, AttachmentError> {
        let model = entity_attachments::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?;

        model.map(to_domain).transpose()
    }

    async fn create(&self, input: CreateAttachmentInput) -> Result<Attachment, AttachmentError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        lock_entity(&txn, &input.entity).await.map_err(db_err)?;

        let file = uploaded_files::Entity::find_by_id(input.file_id.into_inner())
            .one(&txn)
            .await
            .map_err(db_err)?
            .filter(|f| f.deleted_at.is_none())
            .ok_or(AttachmentError::FileNotFound(input.file_id))?;
        let current = count_for(&txn, &input.entity, None)
            .await
            .map_err(db_err)?;

        validate_new_attachment(&self.registry, &input, current, &to_file_info(file))?;

        let display_order = match input.display_order {
            Some(order) => order,
            None => next_display_order(
                max_order_for(&txn, &input.entity).await.map_err(db_err)?,
            ),
        };

        let file_id = input.file_id;
        let active_model = entity_attachments::ActiveModel {
            id: Set(AttachmentId::new().into_inner()),
            entity_type: Set(input.entity.entity_type().to_string()),
            entity_id: Set(input.entity.entity_id().to_string()),
            file_id: Set(file_id.into_inner()),
            attachment_type: Set(input.attachment_type),
            display_order: Set(display_order),
            metadata: Set(serde_json::Value::Object(input.metadata.unwrap_or_default())),
            created_by: Set(input.created_by.map(UserId::into_inner)),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };

        let model = active_model.insert(&txn).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                AttachmentError::AlreadyAttached { file_id }
            } else {
                db_err(e)
            }
        })?;
        txn.commit().await.map_err(db_err)?;

        debug!(
            entity = %input.entity,
            file_id = %file_id,
            current,
            display_order,
            "Attachment row inserted"
        );
        to_domain(model)
    }

    async fn update(
        &self,
        id: AttachmentId,
        input: UpdateAttachmentInput,
    ) -> Result<Attachment, AttachmentError> {
        let model = entity_attachments::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or(AttachmentError::NotFound(id))?;

        validate_update(&self.registry, &model.entity_type, &input)?;

        let mut active: entity_attachments::ActiveModel = model.into();
        if let Some(attachment_type) = input.attachment_type {
            active.attachment_type = Set(attachment_type);
        }
        if let Some(display_order) = input.display_order {
            active.display_order = Set(display_order);
        }
        if let Some(metadata) = input.metadata {
            active.metadata = Set(serde_json::Value::Object(metadata));
        }
        active.updated_at = Set(Some(Utc::now().into()));

        let model = active.update(&self.db).await.map_err(db_err)?;
        to_domain(model)
    }

    async fn delete(&self, id: AttachmentId) -> Result<bool, AttachmentError> {
        let result = entity_attachments::Entity::delete_by_id(id.into_inner())
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected > 0)
    }

    async fn delete_by_entity(&self, entity: &EntityRef) -> Result<u64, AttachmentError> {
        let result = entity_attachments::Entity::delete_many()
            .filter(entity_condition(entity, None))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected)
    }

    async fn count_by_entity(
        &self,
        entity: &EntityRef,
        attachment_type: Option<&str>,
    ) -> Result<u64, AttachmentError> {
        count_for(&self.db, entity, attachment_type)
            .await
            .map_err(db_err)
    }

    async fn reorder(&self, entity: &EntityRef, file_ids: &[FileId]) -> Result<(), AttachmentError> {
        let txn = self.db.begin().await.map_err(db_err)?;
        lock_entity(&txn, entity).await.map_err(db_err)?;

        let current = entity_attachments::Entity::find()
            .filter(entity_condition(entity, None))
            .all(&txn)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(to_domain)
            .collect::<Result<Vec<_>, _>>()?;

        let changes = plan_reorder(&current, file_ids)?;
        let now = Utc::now();
        for change in &changes {
            entity_attachments::Entity::update_many()
                .col_expr(
                    entity_attachments::Column::DisplayOrder,
                    Expr::value(change.display_order),
                )
                .col_expr(entity_attachments::Column::UpdatedAt, Expr::value(now))
                .filter(entity_attachments::Column::Id.eq(change.attachment_id.into_inner()))
                .exec(&txn)
                .await
                .map_err(db_err)?;
        }

        txn.commit().await.map_err(db_err)?;
        debug!(entity = %entity, changed = changes.len(), "Display orders rewritten");
        Ok(())
    }

    async fn find_by_file_id(&self, file_id: FileId) -> Result<Vec<Attachment>, AttachmentError> {
        let models = entity_attachments::Entity::find()
            .filter(entity_attachments::Column::FileId.eq(file_id.into_inner()))
            .order_by_asc(entity_attachments::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?;

        models.into_iter().map(to_domain).collect()
    }

    async fn count_by_file_id(&self, file_id: FileId) -> Result<u64, AttachmentError> {
        entity_attachments::Entity::find()
            .filter(entity_attachments::Column::FileId.eq(file_id.into_inner()))
            .count(&self.db)
            .await
            .map_err(db_err)
    }

    async fn statistics(&self, owner: UserId) -> Result<AttachmentStatistics, AttachmentError> {
        let row = StatisticsRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            STATISTICS_SQL,
            [owner.into_inner().into()],
        ))
        .one(&self.db)
        .await
        .map_err(db_err)?;

        Ok(row.map(to_statistics).unwrap_or_default())
    }
}

/// Serializes writers on one entity until the surrounding transaction ends.
async fn lock_entity<C: ConnectionTrait>(conn: &C, entity: &EntityRef) -> Result<(), DbErr> {
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [lock_key(entity).into()],
    ))
    .await?;
    Ok(())
}

fn lock_key(entity: &EntityRef) -> String {
    format!("{}:{}", entity.entity_type(), entity.entity_id())
}

async fn count_for<C: ConnectionTrait>(
    conn: &C,
    entity: &EntityRef,
    attachment_type: Option<&str>,
) -> Result<u64, DbErr> {
    entity_attachments::Entity::find()
        .filter(entity_condition(entity, attachment_type))
        .count(conn)
        .await
}

/// Highest display order in use on `entity`, `None` when it has no attachments.
async fn max_order_for<C: ConnectionTrait>(
    conn: &C,
    entity: &EntityRef,
) -> Result<Option<i32>, DbErr> {
    let max = entity_attachments::Entity::find()
        .select_only()
        .column_as(entity_attachments::Column::DisplayOrder.max(), "max_order")
        .filter(entity_condition(entity, None))
        .into_tuple::<Option<i32>>()
        .one(conn)
        .await?;

    Ok(max.flatten())
}

fn entity_condition(entity: &EntityRef, attachment_type: Option<&str>) -> Condition {
    let condition = Condition::all()
        .add(entity_attachments::Column::EntityType.eq(entity.entity_type()))
        .add(entity_attachments::Column::EntityId.eq(entity.entity_id()));

    match attachment_type {
        Some(t) => condition.add(entity_attachments::Column::AttachmentType.eq(t)),
        None => condition,
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_err(e: DbErr) -> AttachmentError {
    AttachmentError::persistence(e.to_string())
}

/// Convert database model to domain model.
fn to_domain(model: entity_attachments::Model) -> Result<Attachment, AttachmentError> {
    let entity = EntityRef::new(model.entity_type, model.entity_id)
        .map_err(|e| AttachmentError::persistence(format!("corrupt attachment {}: {e}", model.id)))?;

    Ok(Attachment {
        id: AttachmentId::from_uuid(model.id),
        entity,
        file_id: FileId::from_uuid(model.file_id),
        attachment_type: model.attachment_type,
        display_order: model.display_order,
        metadata: to_metadata(model.metadata),
        created_at: model.created_at.with_timezone(&Utc),
        created_by: model.created_by.map(UserId::from_uuid),
        updated_at: model.updated_at.map(|t| t.with_timezone(&Utc)),
    })
}

fn to_metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

fn to_statistics(row: StatisticsRow) -> AttachmentStatistics {
    let total_files = u64::try_from(row.total_files).unwrap_or_default();
    let files_with_attachments = u64::try_from(row.files_with_attachments).unwrap_or_default();

    AttachmentStatistics {
        total_files,
        files_with_attachments,
        files_without_attachments: total_files.saturating_sub(files_with_attachments),
        total_attachments: u64::try_from(row.total_attachments).unwrap_or_default(),
    }
}
