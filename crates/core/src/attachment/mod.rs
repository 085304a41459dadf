//! Generic attachment engine for AegisX.
//!
//! Links uploaded files to arbitrary business records under per-entity-type
//! policies.
//!
//! # Modules
//!
//! - `policy` - Attachment policies and MIME rules
//! - `registry` - Immutable policy table keyed by entity type
//! - `validation` - Pure policy checks
//! - `ordering` - Display-order planning for reorder requests
//! - `service` - Repository contract and orchestration
//! - `memory` - In-memory repository

pub mod error;
pub mod memory;
pub mod ordering;
pub mod policy;
pub mod registry;
pub mod service;
pub mod types;
pub mod validation;

#[cfg(test)]
mod validation_props;

pub use error::AttachmentError;
pub use memory::MemoryAttachmentRepository;
pub use ordering::{OrderChange, apply_order_changes, next_display_order, plan_reorder};
pub use policy::{AttachmentPolicy, MimeRule, builtin_policies};
pub use registry::AttachmentRegistry;
pub use service::{AttachmentRepository, AttachmentService};
pub use types::{
    Attachment, AttachmentStatistics, AttachmentWithFile, BulkAttachItem, ByteSize,
    CreateAttachmentInput, EntityRef, FileInfo, Metadata, UpdateAttachmentInput,
};
pub use validation::{
    AttachmentCandidate, validate_attachment, validate_attachment_type, validate_metadata,
    validate_new_attachment, validate_update,
};
