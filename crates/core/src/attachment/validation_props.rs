//! Property-based tests for attachment validation and ordering.

use std::collections::BTreeSet;

use aegis_shared::types::FileId;
use proptest::prelude::*;
use uuid::Uuid;

use crate::attachment::error::AttachmentError;
use crate::attachment::ordering::{apply_order_changes, plan_reorder, test_support::attachments_for};
use crate::attachment::policy::AttachmentPolicy;
use crate::attachment::registry::AttachmentRegistry;
use crate::attachment::types::Metadata;
use crate::attachment::validation::{AttachmentCandidate, validate_attachment, validate_metadata};

/// Strategy for entity and attachment type names.
fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z-]{0,15}"
}

/// Strategy for distinct file ids.
fn arb_file_ids(max: usize) -> impl Strategy<Value = Vec<FileId>> {
    prop::collection::btree_set(any::<u128>(), 0..max)
        .prop_map(|ids| ids.into_iter().map(|n| FileId::from(Uuid::from_u128(n))).collect())
}

fn candidate(attachment_type: &str, current_file_count: u64) -> AttachmentCandidate<'_> {
    AttachmentCandidate {
        attachment_type,
        current_file_count,
        file_size: None,
        mime_type: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // =========================================================================
    // Unregistered entity types
    // =========================================================================

    /// Every call for a type outside the registry fails with ConfigNotFound.
    #[test]
    fn prop_unregistered_type_fails(entity_type in arb_name(), attachment_type in arb_name()) {
        prop_assume!(entity_type != "receiving");
        let registry = AttachmentRegistry::new([AttachmentPolicy::new("receiving")]).unwrap();

        let is_config_not_found = matches!(
            validate_attachment(&registry, &entity_type, &candidate(&attachment_type, 0)),
            Err(AttachmentError::ConfigNotFound { .. })
        );
        prop_assert!(is_config_not_found);
        let is_config_not_found = matches!(
            validate_metadata(&registry, &entity_type, &Metadata::new()),
            Err(AttachmentError::ConfigNotFound { .. })
        );
        prop_assert!(is_config_not_found);
        let is_config_not_found = matches!(
            registry.get_policy(&entity_type),
            Err(AttachmentError::ConfigNotFound { .. })
        );
        prop_assert!(is_config_not_found);
    }

    // =========================================================================
    // Attachment type whitelist
    // =========================================================================

    /// A whitelist accepts exactly its members.
    #[test]
    fn prop_whitelist_accepts_exactly_members(
        allowed in prop::collection::btree_set(arb_name(), 1..6),
        probe in arb_name()
    ) {
        let registry = AttachmentRegistry::new([
            AttachmentPolicy::new("product").with_attachment_types(allowed.iter().cloned()),
        ])
        .unwrap();

        for member in &allowed {
            prop_assert!(validate_attachment(&registry, "product", &candidate(member, 0)).is_ok());
        }

        let result = validate_attachment(&registry, "product", &candidate(&probe, 0));
        prop_assert_eq!(result.is_ok(), allowed.contains(&probe));
    }

    // =========================================================================
    // Quota
    // =========================================================================

    /// With max_files = N the Nth attach passes and the (N+1)th fails.
    #[test]
    fn prop_quota_boundary(max_files in 1u32..50) {
        let registry = AttachmentRegistry::new([
            AttachmentPolicy::new("receiving").with_max_files(max_files),
        ])
        .unwrap();
        let limit = u64::from(max_files);

        prop_assert!(validate_attachment(&registry, "receiving", &candidate("photo", limit - 1)).is_ok());
        let is_quota_error = matches!(
            validate_attachment(&registry, "receiving", &candidate("photo", limit)),
            Err(AttachmentError::QuotaExceeded { .. })
        );
        prop_assert!(is_quota_error);
    }

    // =========================================================================
    // MIME rules
    // =========================================================================

    /// `image/*` accepts any image subtype and nothing outside `image/`.
    #[test]
    fn prop_mime_prefix(major in "[a-z]{3,10}", minor in "[a-z0-9.+-]{1,12}") {
        let registry = AttachmentRegistry::new([
            AttachmentPolicy::new("product").with_mime_types(["image/*"]),
            AttachmentPolicy::new("note").with_mime_types(["*"]),
        ])
        .unwrap();
        let mime = format!("{major}/{minor}");
        let probe = AttachmentCandidate {
            mime_type: Some(&mime),
            ..candidate("photo", 0)
        };

        let result = validate_attachment(&registry, "product", &probe);
        prop_assert_eq!(result.is_ok(), major == "image");
        prop_assert!(validate_attachment(&registry, "note", &probe).is_ok());
    }

    // =========================================================================
    // Required metadata
    // =========================================================================

    /// The error names exactly the required keys absent from the input.
    #[test]
    fn prop_missing_metadata_keys_reported(
        required in prop::collection::btree_set(arb_name(), 0..5),
        present in prop::collection::btree_set(arb_name(), 0..5)
    ) {
        let registry = AttachmentRegistry::new([
            AttachmentPolicy::new("patient").with_required_metadata(required.iter().cloned()),
        ])
        .unwrap();
        let metadata: Metadata = present
            .iter()
            .map(|k| (k.clone(), serde_json::Value::from("x")))
            .collect();

        let expected: Vec<String> = required.difference(&present).cloned().collect();
        match validate_metadata(&registry, "patient", &metadata) {
            Ok(()) => prop_assert!(expected.is_empty()),
            Err(AttachmentError::MissingRequiredMetadata { keys }) => prop_assert_eq!(keys, expected),
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    // =========================================================================
    // Reorder
    // =========================================================================

    /// Any permutation yields orders 0..n in list order, and repeating it writes nothing.
    #[test]
    fn prop_reorder_permutation(
        (files, order) in arb_file_ids(12).prop_flat_map(|files| {
            let shuffled = Just(files.clone()).prop_shuffle();
            (Just(files), shuffled)
        })
    ) {
        let mut attachments = attachments_for(&files);
        let changes = plan_reorder(&attachments, &order).unwrap();
        apply_order_changes(&mut attachments, &changes);

        for (position, file_id) in order.iter().enumerate() {
            let attachment = attachments.iter().find(|a| a.file_id == *file_id).unwrap();
            prop_assert_eq!(attachment.display_order, i32::try_from(position).unwrap());
        }

        let orders: BTreeSet<i32> = attachments.iter().map(|a| a.display_order).collect();
        prop_assert_eq!(orders.len(), files.len());
        prop_assert!(plan_reorder(&attachments, &order).unwrap().is_empty());
    }
}
