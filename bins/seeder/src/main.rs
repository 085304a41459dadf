//! Development seeder for the attachment engine.
//!
//! Loads the application configuration, builds the policy registry, registers a
//! handful of demo files and attaches them to demo records through the
//! attachment service, then prints the demo user's usage statistics.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use aegis_core::attachment::{AttachmentRegistry, AttachmentService, BulkAttachItem, EntityRef};
use aegis_db::migration::Migrator;
use aegis_db::{AttachmentRepository, FileRepository, NewUploadedFile};
use aegis_shared::AppConfig;
use aegis_shared::types::{FileId, UserId};
use sea_orm_migration::MigratorTrait;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Demo user ID (consistent for all seeds)
const DEMO_USER_ID: &str = "00000000-0000-0000-0000-000000000002";

/// A demo upload: name, MIME type, size in bytes, category.
type DemoFile = (&'static str, &'static str, u64, &'static str);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let db = aegis_db::connect_with(&config.database).await?;
    info!("Connected to database");

    Migrator::up(&db, None).await?;

    let registry = Arc::new(AttachmentRegistry::from_config(&config.attachments)?);
    let files = FileRepository::new(db.clone());
    let repo = Arc::new(AttachmentRepository::new(db, Arc::clone(&registry)));
    let service = AttachmentService::new(registry, repo);
    info!(
        entity_types = ?service.registry().list_entity_types(),
        "Attachment policies loaded"
    );
    let owner = UserId::from_uuid(Uuid::parse_str(DEMO_USER_ID)?);

    seed_entity(
        &service,
        &files,
        owner,
        &EntityRef::new("receiving", "RCV-DEMO-0001")?,
        &[
            ("dock-photo.jpg", "image/jpeg", 850_000, "image"),
            ("delivery-note.pdf", "application/pdf", 120_000, "document"),
        ],
        &["photo", "delivery-note"],
        None,
    )
    .await?;

    seed_entity(
        &service,
        &files,
        owner,
        &EntityRef::new("patient", "HN-DEMO-0001")?,
        &[("cbc-panel.pdf", "application/pdf", 240_000, "document")],
        &["lab-result"],
        Some(json!({ "patientId": "HN-DEMO-0001", "recordType": "lab-result" })),
    )
    .await?;

    seed_entity(
        &service,
        &files,
        owner,
        &EntityRef::new("product", "SKU-DEMO-0001")?,
        &[
            ("front.png", "image/png", 400_000, "image"),
            ("datasheet.pdf", "application/pdf", 900_000, "document"),
        ],
        &["photo", "spec-sheet"],
        None,
    )
    .await?;

    // An unattached upload so the statistics show both buckets.
    register(&files, owner, ("orphan.png", "image/png", 10_000, "image")).await?;

    let stats = service.get_statistics(owner).await?;
    info!(
        total_files = stats.total_files,
        files_with_attachments = stats.files_with_attachments,
        files_without_attachments = stats.files_without_attachments,
        total_attachments = stats.total_attachments,
        "Seeding complete"
    );

    Ok(())
}

/// Uploads `uploads` and attaches them to `entity` with the matching attachment types.
async fn seed_entity(
    service: &AttachmentService<AttachmentRepository>,
    files: &FileRepository,
    owner: UserId,
    entity: &EntityRef,
    uploads: &[DemoFile],
    attachment_types: &[&str],
    metadata: Option<serde_json::Value>,
) -> anyhow::Result<()> {
    if service.get_attachment_count(entity, None).await? > 0 {
        warn!(entity = %entity, "Entity already has attachments, skipping...");
        return Ok(());
    }

    let mut items = Vec::with_capacity(uploads.len());
    for (upload, attachment_type) in uploads.iter().zip(attachment_types) {
        items.push(BulkAttachItem {
            file_id: register(files, owner, *upload).await?,
            attachment_type: (*attachment_type).to_string(),
            metadata: metadata.as_ref().and_then(|m| m.as_object().cloned()),
        });
    }

    let attached = service.bulk_attach_files(entity, items, Some(owner)).await?;
    info!(entity = %entity, count = attached.len(), "Demo attachments created");
    Ok(())
}

async fn register(files: &FileRepository, owner: UserId, upload: DemoFile) -> anyhow::Result<FileId> {
    let (name, mime_type, size, category) = upload;
    let file = files
        .insert(NewUploadedFile {
            original_name: name.to_string(),
            file_path: format!("uploads/demo/{}/{name}", Uuid::new_v4()),
            file_size: size,
            mime_type: mime_type.to_string(),
            category: category.to_string(),
            uploaded_by: owner,
        })
        .await?;
    Ok(file.id)
}
