//! Core business logic for the AegisX attachment engine.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Attachment policies, validation rules and the orchestration service live here;
//! persistence is reached through the [`attachment::AttachmentRepository`] trait.
//!
//! # Modules
//!
//! - `attachment` - Polymorphic file attachments governed by per-entity-type policies

pub mod attachment;
