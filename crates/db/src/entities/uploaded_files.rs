//! `SeaORM` Entity for uploaded_files table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "uploaded_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub original_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub category: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::entity_attachments::Entity")]
    EntityAttachments,
}

impl Related<super::entity_attachments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EntityAttachments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
