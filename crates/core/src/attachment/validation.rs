//! Policy validation for attachments.
//!
//! Pure functions over the registry and their arguments; nothing here touches storage.

use super::error::AttachmentError;
use super::policy::AttachmentPolicy;
use super::registry::AttachmentRegistry;
use super::types::{ByteSize, CreateAttachmentInput, FileInfo, Metadata, UpdateAttachmentInput};

/// A proposed attachment, as seen by the validator.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentCandidate<'a> {
    /// Attachment type of the new attachment.
    pub attachment_type: &'a str,
    /// Attachments the entity holds before the insert.
    pub current_file_count: u64,
    /// File size, if known.
    pub file_size: Option<u64>,
    /// MIME type, if known.
    pub mime_type: Option<&'a str>,
}

/// Validates a proposed attachment against the entity type's policy.
///
/// Checks run in order: attachment type, quota, size, MIME type.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate_attachment(
    registry: &AttachmentRegistry,
    entity_type: &str,
    candidate: &AttachmentCandidate<'_>,
) -> Result<(), AttachmentError> {
    let policy = registry.get_policy(entity_type)?;

    validate_attachment_type(policy, candidate.attachment_type)?;

    // Count is taken before the insert, so reaching the limit already rejects.
    if let Some(max_files) = policy.max_files
        && candidate.current_file_count >= u64::from(max_files)
    {
        return Err(AttachmentError::QuotaExceeded {
            entity_type: entity_type.to_string(),
            max_files,
            current: candidate.current_file_count,
        });
    }

    if let (Some(size), Some(max)) = (candidate.file_size, policy.max_file_size)
        && size > max
    {
        return Err(AttachmentError::FileTooLarge {
            size: ByteSize(size),
            max: ByteSize(max),
        });
    }

    if let Some(mime_type) = candidate.mime_type
        && !policy.allows_mime_type(mime_type)
    {
        return Err(AttachmentError::MimeTypeNotAllowed {
            mime_type: mime_type.to_string(),
            allowed: policy.allowed_mime_type_list(),
        });
    }

    Ok(())
}

/// Checks `attachment_type` against the policy's whitelist.
///
/// # Errors
///
/// Returns `InvalidAttachmentType` listing the allowed types.
pub fn validate_attachment_type(
    policy: &AttachmentPolicy,
    attachment_type: &str,
) -> Result<(), AttachmentError> {
    if policy.allows_attachment_type(attachment_type) {
        Ok(())
    } else {
        Err(AttachmentError::InvalidAttachmentType {
            attachment_type: attachment_type.to_string(),
            allowed: policy.allowed_attachment_type_list(),
        })
    }
}

/// Validates that every required metadata key is present and non-null.
///
/// # Errors
///
/// Returns `MissingRequiredMetadata` naming all missing keys at once.
pub fn validate_metadata(
    registry: &AttachmentRegistry,
    entity_type: &str,
    metadata: &Metadata,
) -> Result<(), AttachmentError> {
    let policy = registry.get_policy(entity_type)?;

    let missing: Vec<String> = policy
        .required_metadata
        .iter()
        .filter(|key| metadata.get(key.as_str()).is_none_or(serde_json::Value::is_null))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AttachmentError::MissingRequiredMetadata { keys: missing })
    }
}

/// Full rule set for a new attachment.
///
/// Size and MIME type fall back to the file record when the input does not
/// override them. Absent metadata is checked as an empty map.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate_new_attachment(
    registry: &AttachmentRegistry,
    input: &CreateAttachmentInput,
    current_file_count: u64,
    file: &FileInfo,
) -> Result<(), AttachmentError> {
    let entity_type = input.entity.entity_type();
    let candidate = AttachmentCandidate {
        attachment_type: &input.attachment_type,
        current_file_count,
        file_size: Some(input.file_size.unwrap_or(file.file_size)),
        mime_type: Some(input.mime_type.as_deref().unwrap_or(&file.mime_type)),
    };
    validate_attachment(registry, entity_type, &candidate)?;

    match &input.metadata {
        Some(metadata) => validate_metadata(registry, entity_type, metadata),
        None => validate_metadata(registry, entity_type, &Metadata::new()),
    }
}

/// Rules for the fields an update replaces. Untouched fields are not re-checked.
///
/// # Errors
///
/// Returns `InvalidAttachmentType` or `MissingRequiredMetadata`.
pub fn validate_update(
    registry: &AttachmentRegistry,
    entity_type: &str,
    input: &UpdateAttachmentInput,
) -> Result<(), AttachmentError> {
    if let Some(attachment_type) = &input.attachment_type {
        validate_attachment_type(registry.get_policy(entity_type)?, attachment_type)?;
    }
    if let Some(metadata) = &input.metadata {
        validate_metadata(registry, entity_type, metadata)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn registry() -> AttachmentRegistry {
        AttachmentRegistry::new([
            AttachmentPolicy::new("receiving")
                .with_attachment_types(["photo", "delivery-note"])
                .with_max_files(2)
                .with_mime_types(["image/*", "application/pdf"])
                .with_max_file_size(1_048_576),
            AttachmentPolicy::new("patient")
                .with_required_metadata(["patientId", "recordType"]),
            AttachmentPolicy::new("note").with_mime_types(["*"]),
        ])
        .unwrap()
    }

    fn candidate(attachment_type: &str) -> AttachmentCandidate<'_> {
        AttachmentCandidate {
            attachment_type,
            current_file_count: 0,
            file_size: None,
            mime_type: None,
        }
    }

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_unregistered_type_fails_config_not_found() {
        let registry = registry();
        assert!(matches!(
            validate_attachment(&registry, "ward", &candidate("photo")),
            Err(AttachmentError::ConfigNotFound { .. })
        ));
        assert!(matches!(
            validate_metadata(&registry, "ward", &Metadata::new()),
            Err(AttachmentError::ConfigNotFound { .. })
        ));
    }

    #[rstest]
    #[case("photo", true)]
    #[case("delivery-note", true)]
    #[case("invoice", false)]
    #[case("Photo", false)]
    #[case("", false)]
    fn test_attachment_type_whitelist(#[case] attachment_type: &str, #[case] accepted: bool) {
        let result = validate_attachment(&registry(), "receiving", &candidate(attachment_type));
        assert_eq!(result.is_ok(), accepted, "{attachment_type}: {result:?}");
        if !accepted {
            assert!(matches!(
                result,
                Err(AttachmentError::InvalidAttachmentType { allowed, .. })
                    if allowed == vec!["delivery-note", "photo"]
            ));
        }
    }

    #[rstest]
    #[case(0, true)]
    #[case(1, true)]
    #[case(2, false)]
    #[case(7, false)]
    fn test_quota_rejects_at_limit(#[case] current: u64, #[case] accepted: bool) {
        let candidate = AttachmentCandidate {
            current_file_count: current,
            ..candidate("photo")
        };
        let result = validate_attachment(&registry(), "receiving", &candidate);
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            assert!(matches!(
                result,
                Err(AttachmentError::QuotaExceeded { max_files: 2, .. })
            ));
        }
    }

    #[rstest]
    #[case(500_000, true)]
    #[case(1_048_576, true)]
    #[case(1_048_577, false)]
    #[case(2_000_000, false)]
    fn test_file_size_limit(#[case] size: u64, #[case] accepted: bool) {
        let candidate = AttachmentCandidate {
            file_size: Some(size),
            ..candidate("photo")
        };
        let result = validate_attachment(&registry(), "receiving", &candidate);
        assert_eq!(result.is_ok(), accepted);
        if !accepted {
            let message = result.unwrap_err().to_string();
            assert!(message.contains("1 MB"), "{message}");
        }
    }

    #[rstest]
    #[case("image/png", true)]
    #[case("image/jpeg", true)]
    #[case("application/pdf", true)]
    #[case("application/pdf+zip", false)]
    #[case("text/plain", false)]
    fn test_mime_rules(#[case] mime: &str, #[case] accepted: bool) {
        let candidate = AttachmentCandidate {
            mime_type: Some(mime),
            ..candidate("photo")
        };
        let result = validate_attachment(&registry(), "receiving", &candidate);
        assert_eq!(result.is_ok(), accepted, "{mime}");
        if !accepted {
            assert!(matches!(
                result,
                Err(AttachmentError::MimeTypeNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn test_wildcard_mime_accepts_anything() {
        let candidate = AttachmentCandidate {
            mime_type: Some("application/x-msdownload"),
            ..candidate("anything")
        };
        assert!(validate_attachment(&registry(), "note", &candidate).is_ok());
    }

    #[test]
    fn test_metadata_reports_every_missing_key() {
        let registry = registry();

        let result = validate_metadata(&registry, "patient", &Metadata::new());
        assert!(matches!(
            result,
            Err(AttachmentError::MissingRequiredMetadata { keys })
                if keys == vec!["patientId", "recordType"]
        ));
    }

    #[test]
    fn test_metadata_partial_names_missing_key() {
        let result = validate_metadata(
            &registry(),
            "patient",
            &metadata(json!({ "patientId": "p1" })),
        );
        assert!(matches!(
            result,
            Err(AttachmentError::MissingRequiredMetadata { keys }) if keys == vec!["recordType"]
        ));
    }

    #[test]
    fn test_metadata_null_counts_as_missing() {
        let result = validate_metadata(
            &registry(),
            "patient",
            &metadata(json!({ "patientId": "p1", "recordType": null })),
        );
        assert!(matches!(
            result,
            Err(AttachmentError::MissingRequiredMetadata { keys }) if keys == vec!["recordType"]
        ));
    }

    #[test]
    fn test_update_checks_only_supplied_fields() {
        let registry = registry();

        assert!(validate_update(&registry, "patient", &UpdateAttachmentInput::default()).is_ok());

        let retype = UpdateAttachmentInput {
            attachment_type: Some("invoice".to_string()),
            ..UpdateAttachmentInput::default()
        };
        assert!(validate_update(&registry, "receiving", &retype).is_err());

        let wipe = UpdateAttachmentInput {
            metadata: Some(Metadata::new()),
            ..UpdateAttachmentInput::default()
        };
        assert!(matches!(
            validate_update(&registry, "patient", &wipe),
            Err(AttachmentError::MissingRequiredMetadata { .. })
        ));
    }

    #[test]
    fn test_new_attachment_falls_back_to_file_record() {
        use aegis_shared::types::{FileId, UserId};

        use super::super::types::EntityRef;

        let registry = registry();
        let file = FileInfo {
            id: FileId::new(),
            original_name: "scan.txt".to_string(),
            file_path: "uploads/scan.txt".to_string(),
            file_size: 100,
            mime_type: "text/plain".to_string(),
            category: "document".to_string(),
            uploaded_by: UserId::new(),
            deleted_at: None,
        };
        let entity = EntityRef::new("receiving", "rcv-1").unwrap();
        let mut input = CreateAttachmentInput::new(entity, file.id, "photo");

        assert!(matches!(
            validate_new_attachment(&registry, &input, 0, &file),
            Err(AttachmentError::MimeTypeNotAllowed { .. })
        ));

        input.mime_type = Some("image/png".to_string());
        assert!(validate_new_attachment(&registry, &input, 0, &file).is_ok());
    }

    #[test]
    fn test_metadata_complete_succeeds() {
        let result = validate_metadata(
            &registry(),
            "patient",
            &metadata(json!({ "patientId": "p1", "recordType": "lab-result", "extra": 1 })),
        );
        assert!(result.is_ok());
    }
}
