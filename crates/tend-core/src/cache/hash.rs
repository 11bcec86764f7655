//! Snapshot content hash
//!
//! SHA-256 over the most recent `slice` records plus the total record count
//! and the latest modification time. The digest is a pure function of the
//! records: input order, wall-clock time and process state do not affect it.

use sha2::{Digest, Sha256};

use crate::models::BehaviorRecord;

/// Hex-encoded digest of a behavioral snapshot
pub fn content_hash(records: &[BehaviorRecord], slice: usize) -> String {
    let mut ordered: Vec<&BehaviorRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut hasher = Sha256::new();
    hasher.update(format!("count:{}\n", ordered.len()).as_bytes());

    let latest = ordered.iter().map(|r| r.last_modified()).max();
    match latest {
        Some(at) => hasher.update(format!("latest:{}\n", at.timestamp_millis()).as_bytes()),
        None => hasher.update(b"latest:none\n"),
    }

    let start = ordered.len().saturating_sub(slice);
    for record in &ordered[start..] {
        // Unit separators keep free-form categories from bleeding into the next field
        hasher.update(
            format!(
                "{}\x1f{}\x1f{:.3}\x1f{:.3}\x1f{}\x1f{}\n",
                record.id,
                record.category,
                record.intensity,
                record.resistance,
                record.timestamp.timestamp_millis(),
                record
                    .updated_at
                    .map(|u| u.timestamp_millis().to_string())
                    .unwrap_or_default(),
            )
            .as_bytes(),
        );
    }

    hex::encode(hasher.finalize())
}
