//! Shared types, errors, and configuration for AegisX.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for attachments, files and users
//! - Application-wide error types
//! - Configuration management, including the declarative attachment policies

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, AttachmentsConfig, DatabaseConfig, PolicyConfig};
pub use error::{AppError, AppResult};
