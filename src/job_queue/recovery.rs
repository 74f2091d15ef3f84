//! Startup replay of unfinished jobs.
//!
//! Jobs found processing are presumed orphaned by a crash: they are reset to
//! pending and re-run from the start, never resumed.

use super::models::{JobAttributes, TemplateId};
use super::scheduler::{QueueEntry, QueueInner};
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

/// What recovery did with the unfinished jobs it found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Jobs put back in the in-memory queue.
    pub rearmed: usize,
    /// Request ids left pending because they cannot be replayed.
    pub skipped: Vec<String>,
}

/// Re-arm every replayable pending job, oldest first, without touching the
/// store rows. Unreplayable rows stay pending and are only logged.
pub(super) fn recover(inner: &QueueInner) -> Result<RecoveryReport> {
    let records = inner
        .store
        .find_all_unfinished_and_reset_processing_to_pending()
        .context("Failed to load unfinished jobs")?;

    let mut report = RecoveryReport::default();
    for record in records {
        let (Some(template_id), Some(raw_attributes)) =
            (record.template_id.as_deref(), record.attributes.as_deref())
        else {
            warn!(
                "Skipping recovery of job {}: no template id or attributes stored",
                record.request_id
            );
            report.skipped.push(record.request_id);
            continue;
        };

        let template = TemplateId::parse(template_id);
        if !inner.registry.contains(&template) {
            warn!(
                "Skipping recovery of job {}: template '{}' is not registered",
                record.request_id, template
            );
            report.skipped.push(record.request_id);
            continue;
        }

        let attributes = match JobAttributes::from_stored(template_id, raw_attributes) {
            Ok(attributes) => attributes,
            Err(e) => {
                warn!(
                    "Skipping recovery of job {}: {}",
                    record.request_id, e
                );
                report.skipped.push(record.request_id);
                continue;
            }
        };

        let rearmed =
            inner.push_entry(QueueEntry::new(record.request_id, template, attributes));
        if rearmed {
            report.rearmed += 1;
        }
    }

    if !report.skipped.is_empty() {
        info!(
            "{} unfinished jobs need manual attention: {}",
            report.skipped.len(),
            report.skipped.join(", ")
        );
    }
    Ok(report)
}
