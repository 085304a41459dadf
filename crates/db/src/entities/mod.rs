//! `SeaORM` entity definitions.

pub mod entity_attachments;
pub mod uploaded_files;
