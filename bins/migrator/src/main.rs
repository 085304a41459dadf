//! Database migration runner for the attachment schema.
//!
//! Usage:
//!   migrator up      - Create `uploaded_files` and `entity_attachments`
//!   migrator down    - Drop them again
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop all tables and re-run migrations
//!
//! The connection string comes from `DATABASE_URL`, optionally loaded from `.env`.

use aegis_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The CLI sets up its own tracing
    cli::run_cli(Migrator).await;
}
