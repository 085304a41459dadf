//! Configuration registry of attachment policies.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use aegis_shared::AttachmentsConfig;

use super::error::AttachmentError;
use super::policy::{AttachmentPolicy, builtin_policies};

/// Immutable table of attachment policies keyed by entity type.
///
/// Built once at startup and shared behind an `Arc`; request handling only reads it.
#[derive(Debug, Clone, Default)]
pub struct AttachmentRegistry {
    policies: BTreeMap<String, AttachmentPolicy>,
}

impl AttachmentRegistry {
    /// Builds a registry from explicit policies.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` for a blank entity type, a zero file quota,
    /// or two policies for the same entity type.
    pub fn new(
        policies: impl IntoIterator<Item = AttachmentPolicy>,
    ) -> Result<Self, AttachmentError> {
        let mut map = BTreeMap::new();
        for policy in policies {
            check_policy(&policy)?;
            match map.entry(policy.entity_type.clone()) {
                Entry::Occupied(_) => {
                    return Err(AttachmentError::InvalidPolicy(format!(
                        "duplicate policy for entity type '{}'",
                        policy.entity_type
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(policy);
                }
            }
        }
        Ok(Self { policies: map })
    }

    /// Registry holding only the built-in policies.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            policies: builtin_policies()
                .into_iter()
                .map(|p| (p.entity_type.clone(), p))
                .collect(),
        }
    }

    /// Builds the registry from configuration.
    ///
    /// Configured policies replace built-in policies of the same entity type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` if the configured policies are invalid.
    pub fn from_config(config: &AttachmentsConfig) -> Result<Self, AttachmentError> {
        let configured = Self::new(config.policies.iter().map(AttachmentPolicy::from))?;
        if !config.include_builtin {
            return Ok(configured);
        }

        let mut registry = Self::builtin();
        registry.policies.extend(configured.policies);
        Ok(registry)
    }

    /// Looks up the policy for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` listing every registered entity type.
    pub fn get_policy(&self, entity_type: &str) -> Result<&AttachmentPolicy, AttachmentError> {
        self.policies
            .get(entity_type)
            .ok_or_else(|| AttachmentError::ConfigNotFound {
                entity_type: entity_type.to_string(),
                registered: self.policies.keys().cloned().collect(),
            })
    }

    /// Returns true if `entity_type` has a policy.
    #[must_use]
    pub fn is_supported(&self, entity_type: &str) -> bool {
        self.policies.contains_key(entity_type)
    }

    /// Registered entity types in sorted order.
    #[must_use]
    pub fn list_entity_types(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    /// Number of registered policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Returns true if no policy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

fn check_policy(policy: &AttachmentPolicy) -> Result<(), AttachmentError> {
    if policy.entity_type.trim().is_empty() {
        return Err(AttachmentError::InvalidPolicy(
            "entity type must not be empty".to_string(),
        ));
    }
    if policy.max_files == Some(0) {
        return Err(AttachmentError::InvalidPolicy(format!(
            "max_files for '{}' must be at least 1",
            policy.entity_type
        )));
    }
    Ok(())
}
