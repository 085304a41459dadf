//! Display-order planning for reorder requests.

use std::collections::{HashMap, HashSet};

use aegis_shared::types::{AttachmentId, FileId};

use super::error::AttachmentError;
use super::types::Attachment;

/// A display-order write produced by [`plan_reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderChange {
    /// Attachment to update.
    pub attachment_id: AttachmentId,
    /// New zero-based position.
    pub display_order: i32,
}

/// Computes the writes that put `current` into the order given by `file_ids`.
///
/// `file_ids` must name every file attached to the entity exactly once, so
/// the resulting orders are always `0..n` with no gaps or duplicates.
/// Attachments already at their target position produce no write.
///
/// # Errors
///
/// Returns `InvalidReorder` if `file_ids` repeats a file, names a file that is
/// not attached, or leaves an attached file out.
pub fn plan_reorder(
    current: &[Attachment],
    file_ids: &[FileId],
) -> Result<Vec<OrderChange>, AttachmentError> {
    let by_file: HashMap<FileId, &Attachment> =
        current.iter().map(|a| (a.file_id, a)).collect();

    let mut seen = HashSet::with_capacity(file_ids.len());
    let mut changes = Vec::new();

    for (position, file_id) in file_ids.iter().enumerate() {
        if !seen.insert(*file_id) {
            return Err(AttachmentError::invalid_reorder(format!(
                "file {file_id} is listed more than once"
            )));
        }
        let attachment = by_file.get(file_id).ok_or_else(|| {
            AttachmentError::invalid_reorder(format!("file {file_id} is not attached to this entity"))
        })?;
        let display_order = i32::try_from(position).map_err(|_| {
            AttachmentError::invalid_reorder("too many attachments to reorder")
        })?;

        if attachment.display_order != display_order {
            changes.push(OrderChange {
                attachment_id: attachment.id,
                display_order,
            });
        }
    }

    let missing: Vec<String> = current
        .iter()
        .filter(|a| !seen.contains(&a.file_id))
        .map(|a| a.file_id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(AttachmentError::invalid_reorder(format!(
            "every attached file must be listed; missing: {}",
            missing.join(", ")
        )));
    }

    Ok(changes)
}

/// Position for an appended attachment: one past the highest order in use, or 0.
#[must_use]
pub fn next_display_order(max_in_use: Option<i32>) -> i32 {
    max_in_use.map_or(0, |max| max.saturating_add(1))
}

/// Applies planned changes to an in-memory list.
pub fn apply_order_changes(attachments: &mut [Attachment], changes: &[OrderChange]) {
    let targets: HashMap<AttachmentId, i32> = changes
        .iter()
        .map(|c| (c.attachment_id, c.display_order))
        .collect();

    for attachment in attachments.iter_mut() {
        if let Some(order) = targets.get(&attachment.id) {
            attachment.display_order = *order;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::attachments_for;
    use super::*;

    fn order_of(attachments: &[Attachment], file_id: FileId) -> i32 {
        attachments
            .iter()
            .find(|a| a.file_id == file_id)
            .map(|a| a.display_order)
            .unwrap()
    }

    #[test]
    fn test_reorder_rotates_positions() {
        let (a, b, c) = (FileId::new(), FileId::new(), FileId::new());
        let mut attachments = attachments_for(&[a, b, c]);

        let changes = plan_reorder(&attachments, &[c, a, b]).unwrap();
        assert_eq!(changes.len(), 3);
        apply_order_changes(&mut attachments, &changes);

        assert_eq!(order_of(&attachments, c), 0);
        assert_eq!(order_of(&attachments, a), 1);
        assert_eq!(order_of(&attachments, b), 2);

        // Same list again: nothing left to write.
        assert!(plan_reorder(&attachments, &[c, a, b]).unwrap().is_empty());
    }

    #[test]
    fn test_reorder_skips_unchanged_positions() {
        let (a, b, c) = (FileId::new(), FileId::new(), FileId::new());
        let attachments = attachments_for(&[a, b, c]);

        let changes = plan_reorder(&attachments, &[a, c, b]).unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn test_reorder_rejects_partial_list() {
        let (a, b, c) = (FileId::new(), FileId::new(), FileId::new());
        let attachments = attachments_for(&[a, b, c]);

        let err = plan_reorder(&attachments, &[c, a]).unwrap_err();
        assert!(matches!(err, AttachmentError::InvalidReorder(_)));
        assert!(err.to_string().contains(&b.to_string()));
    }

    #[test]
    fn test_reorder_rejects_duplicates_and_foreign_files() {
        let (a, b) = (FileId::new(), FileId::new());
        let attachments = attachments_for(&[a, b]);

        assert!(matches!(
            plan_reorder(&attachments, &[a, a, b]),
            Err(AttachmentError::InvalidReorder(_))
        ));
        assert!(matches!(
            plan_reorder(&attachments, &[a, b, FileId::new()]),
            Err(AttachmentError::InvalidReorder(_))
        ));
    }

    #[test]
    fn test_next_display_order_appends_after_highest() {
        assert_eq!(next_display_order(None), 0);
        assert_eq!(next_display_order(Some(0)), 1);
        assert_eq!(next_display_order(Some(-1)), 0);
        assert_eq!(next_display_order(Some(i32::MAX)), i32::MAX);
    }

    #[test]
    fn test_reorder_empty_entity() {
        assert!(plan_reorder(&[], &[]).unwrap().is_empty());
    }
}
