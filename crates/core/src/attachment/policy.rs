//! Declarative attachment policies.

use std::collections::BTreeSet;
use std::fmt;

use aegis_shared::PolicyConfig;
use serde::Serialize;

/// One entry of a policy's MIME whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum MimeRule {
    /// `*`: disables MIME checking.
    Any,
    /// `type/*`: any subtype of the stored `type/` prefix.
    Prefix(String),
    /// Exact MIME type.
    Exact(String),
}

impl MimeRule {
    /// Parses a whitelist entry.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if pattern == "*" {
            Self::Any
        } else if let Some(major) = pattern.strip_suffix("/*") {
            Self::Prefix(format!("{major}/"))
        } else {
            Self::Exact(pattern.to_string())
        }
    }

    /// Returns true if `mime_type` satisfies this rule.
    #[must_use]
    pub fn matches(&self, mime_type: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => mime_type.starts_with(prefix.as_str()),
            Self::Exact(exact) => mime_type == exact,
        }
    }
}

impl fmt::Display for MimeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

impl From<MimeRule> for String {
    fn from(rule: MimeRule) -> Self {
        rule.to_string()
    }
}

/// Attachment policy for one entity type.
///
/// Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentPolicy {
    /// Entity type this policy governs.
    pub entity_type: String,
    /// Allowed attachment types. `None` accepts any type.
    pub allowed_attachment_types: Option<BTreeSet<String>>,
    /// Inclusive limit on attachments per entity instance.
    pub max_files: Option<u32>,
    /// MIME whitelist. `None` accepts any MIME type.
    pub allowed_mime_types: Option<Vec<MimeRule>>,
    /// Maximum file size in bytes.
    pub max_file_size: Option<u64>,
    /// Remove attachments when the owning entity is deleted.
    pub cascade_delete: bool,
    /// Metadata keys that must be present with a non-null value.
    pub required_metadata: BTreeSet<String>,
    /// Metadata keys that may be present. Informational only.
    pub optional_metadata: BTreeSet<String>,
}

impl AttachmentPolicy {
    /// Creates an unrestricted policy for `entity_type`.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            allowed_attachment_types: None,
            max_files: None,
            allowed_mime_types: None,
            max_file_size: None,
            cascade_delete: false,
            required_metadata: BTreeSet::new(),
            optional_metadata: BTreeSet::new(),
        }
    }

    /// Restricts the accepted attachment types.
    #[must_use]
    pub fn with_attachment_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_attachment_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Limits attachments per entity instance.
    #[must_use]
    pub const fn with_max_files(mut self, max_files: u32) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Restricts the accepted MIME types.
    #[must_use]
    pub fn with_mime_types<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_mime_types = Some(
            patterns
                .into_iter()
                .map(|p| MimeRule::parse(p.as_ref()))
                .collect(),
        );
        self
    }

    /// Limits the file size in bytes.
    #[must_use]
    pub const fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// Sets the cascade-delete flag.
    #[must_use]
    pub const fn with_cascade_delete(mut self, cascade: bool) -> Self {
        self.cascade_delete = cascade;
        self
    }

    /// Sets the required metadata keys.
    #[must_use]
    pub fn with_required_metadata<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_metadata = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the optional metadata keys.
    #[must_use]
    pub fn with_optional_metadata<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_metadata = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `attachment_type` passes the whitelist.
    #[must_use]
    pub fn allows_attachment_type(&self, attachment_type: &str) -> bool {
        self.allowed_attachment_types
            .as_ref()
            .is_none_or(|allowed| allowed.contains(attachment_type))
    }

    /// Returns true if `mime_type` passes the whitelist.
    #[must_use]
    pub fn allows_mime_type(&self, mime_type: &str) -> bool {
        self.allowed_mime_types
            .as_ref()
            .is_none_or(|rules| rules.iter().any(|rule| rule.matches(mime_type)))
    }

    /// Allowed attachment types as a list, for error reporting.
    #[must_use]
    pub fn allowed_attachment_type_list(&self) -> Vec<String> {
        self.allowed_attachment_types
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Allowed MIME patterns as a list, for error reporting.
    #[must_use]
    pub fn allowed_mime_type_list(&self) -> Vec<String> {
        self.allowed_mime_types
            .iter()
            .flatten()
            .map(ToString::to_string)
            .collect()
    }
}

impl From<&PolicyConfig> for AttachmentPolicy {
    fn from(config: &PolicyConfig) -> Self {
        let mut policy = Self::new(config.entity_type.trim())
            .with_cascade_delete(config.cascade_delete)
            .with_required_metadata(config.required_metadata.iter().cloned())
            .with_optional_metadata(config.optional_metadata.iter().cloned());

        if let Some(types) = &config.allowed_attachment_types {
            policy = policy.with_attachment_types(types.iter().cloned());
        }
        if let Some(patterns) = &config.allowed_mime_types {
            policy = policy.with_mime_types(patterns);
        }
        policy.max_files = config.max_files;
        policy.max_file_size = config.max_file_size_bytes;
        policy
    }
}

const MB: u64 = 1024 * 1024;

/// Policies for the entity types of the host application.
#[must_use]
pub fn builtin_policies() -> Vec<AttachmentPolicy> {
    vec![
        AttachmentPolicy::new("receiving")
            .with_attachment_types(["photo", "delivery-note", "invoice", "inspection-report", "other"])
            .with_max_files(20)
            .with_mime_types(["image/*", "application/pdf"])
            .with_max_file_size(10 * MB)
            .with_cascade_delete(true)
            .with_optional_metadata(["description", "receivedBy"]),
        AttachmentPolicy::new("patient")
            .with_attachment_types(["medical-record", "lab-result", "photo", "consent-form", "id-card"])
            .with_max_files(100)
            .with_mime_types(["image/*", "application/pdf"])
            .with_max_file_size(20 * MB)
            .with_required_metadata(["patientId", "recordType"])
            .with_optional_metadata(["recordDate", "department"]),
        AttachmentPolicy::new("product")
            .with_attachment_types(["photo", "spec-sheet", "manual", "msds"])
            .with_max_files(10)
            .with_mime_types(["image/*", "application/pdf"])
            .with_max_file_size(5 * MB)
            .with_cascade_delete(true),
        AttachmentPolicy::new("supplier")
            .with_attachment_types(["contract", "certificate", "license", "other"])
            .with_max_files(30)
            .with_mime_types([
                "application/pdf",
                "image/*",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ])
            .with_max_file_size(10 * MB)
            .with_optional_metadata(["expiresAt", "issuer"]),
        AttachmentPolicy::new("budget-request")
            .with_attachment_types(["quotation", "justification", "approval"])
            .with_max_files(10)
            .with_mime_types(["*"])
            .with_max_file_size(10 * MB)
            .with_cascade_delete(true),
    ]
}
