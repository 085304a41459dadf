//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Attachment policy configuration.
    #[serde(default)]
    pub attachments: AttachmentsConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Declarative attachment policies.
///
/// Loaded once at startup and turned into an immutable registry by the core crate.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentsConfig {
    /// Start from the built-in policy set before applying `policies`.
    #[serde(default = "default_include_builtin")]
    pub include_builtin: bool,
    /// Policies declared in configuration. Entries replace built-ins with the same entity type.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            include_builtin: default_include_builtin(),
            policies: Vec::new(),
        }
    }
}

fn default_include_builtin() -> bool {
    true
}

/// Serialized form of one entity type's attachment policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    /// Entity type this policy governs.
    pub entity_type: String,
    /// Allowed attachment types. Absent means any type is accepted.
    #[serde(default)]
    pub allowed_attachment_types: Option<Vec<String>>,
    /// Maximum attachments per entity instance.
    #[serde(default)]
    pub max_files: Option<u32>,
    /// Allowed MIME types: exact (`application/pdf`), prefix (`image/*`) or `*`.
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,
    /// Maximum file size in bytes.
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
    /// Remove attachments when the owning entity is deleted.
    #[serde(default)]
    pub cascade_delete: bool,
    /// Metadata keys that must be present with a non-null value.
    #[serde(default)]
    pub required_metadata: Vec<String>,
    /// Metadata keys that may be present.
    #[serde(default)]
    pub optional_metadata: Vec<String>,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("AEGIS").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or misses required keys.
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
