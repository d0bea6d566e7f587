//! # Snapshot History
//!
//! Append-only, per-license time series of every snapshot the engine
//! recorded. Each entry chains to its predecessor with a SHA-256 hash, so
//! edits to stored history are detectable with [`SnapshotHistory::verify_chain`].
//!
//! ```text
//! entry_hash = SHA-256(previous_hash || sequence || license_id || snapshot_id || recorded_at)
//! ```
//!
//! The first entry of each license chains to 64 zeros.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use credmate_compliance::ComplianceSnapshot;
use credmate_core::{sha256_hex, LicenseId, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Previous hash of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One recorded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// 1-based position in the license's chain.
    pub sequence: u64,
    /// The license.
    pub license_id: LicenseId,
    /// The snapshot.
    pub snapshot: ComplianceSnapshot,
    /// Hash of the preceding entry.
    pub previous_hash: String,
    /// Hash of this entry.
    pub entry_hash: String,
    /// When the entry was appended.
    pub recorded_at: Timestamp,
}

impl HistoryEntry {
    fn compute_hash(
        previous_hash: &str,
        sequence: u64,
        license_id: LicenseId,
        snapshot: &ComplianceSnapshot,
        recorded_at: Timestamp,
    ) -> String {
        let input = format!(
            "{}{}{}{}{}",
            previous_hash,
            sequence,
            license_id,
            snapshot.snapshot_id,
            recorded_at.to_canonical_string()
        );
        sha256_hex(input.as_bytes())
    }

    /// Whether the stored hash matches the entry's contents.
    pub fn hash_matches(&self) -> bool {
        self.entry_hash
            == Self::compute_hash(
                &self.previous_hash,
                self.sequence,
                self.license_id,
                &self.snapshot,
                self.recorded_at,
            )
    }
}

/// Result of [`SnapshotHistory::verify_chain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Entries examined.
    pub entries: usize,
    /// Entries whose link, hash or snapshot id does not check out.
    pub broken_links: usize,
    /// Sequence of the first broken entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_broken: Option<u64>,
    /// `broken_links == 0`.
    pub valid: bool,
}

/// Per-license hash-chained snapshot history.
#[derive(Debug, Default)]
pub struct SnapshotHistory {
    chains: RwLock<BTreeMap<LicenseId, Vec<HistoryEntry>>>,
}

impl SnapshotHistory {
    /// An empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a snapshot. Returns `None` without appending when the most
    /// recent entry for the same `as_of` already holds a snapshot with the
    /// same id.
    pub fn append(
        &self,
        snapshot: ComplianceSnapshot,
        recorded_at: Timestamp,
    ) -> Option<HistoryEntry> {
        let license_id = snapshot.license_id;
        let mut chains = self.chains.write();
        let chain = chains.entry(license_id).or_default();
        if chain
            .iter()
            .rev()
            .find(|e| e.snapshot.as_of == snapshot.as_of)
            .is_some_and(|e| e.snapshot.snapshot_id == snapshot.snapshot_id)
        {
            return None;
        }
        let previous_hash = chain
            .last()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let sequence = chain.len() as u64 + 1;
        let entry_hash =
            HistoryEntry::compute_hash(&previous_hash, sequence, license_id, &snapshot, recorded_at);
        let entry = HistoryEntry {
            sequence,
            license_id,
            snapshot,
            previous_hash,
            entry_hash,
            recorded_at,
        };
        chain.push(entry.clone());
        Some(entry)
    }

    /// Load a previously persisted entry. Entries must arrive in sequence
    /// order per license.
    pub fn restore(&self, entry: HistoryEntry) -> Result<(), MonitorError> {
        let mut chains = self.chains.write();
        let chain = chains.entry(entry.license_id).or_default();
        let expected = chain.len() as u64 + 1;
        if entry.sequence != expected {
            return Err(MonitorError::History(format!(
                "license {} history entry {} restored out of order (expected {})",
                entry.license_id, entry.sequence, expected
            )));
        }
        chain.push(entry);
        Ok(())
    }

    /// The snapshot with the latest `as_of`. Among snapshots for the same
    /// date the most recently recorded wins, so a retrospective evaluation
    /// never displaces the current standing.
    pub fn latest(&self, license_id: LicenseId) -> Option<ComplianceSnapshot> {
        self.chains
            .read()
            .get(&license_id)?
            .iter()
            .max_by_key(|e| (e.snapshot.as_of, e.sequence))
            .map(|e| e.snapshot.clone())
    }

    /// Every entry for a license in append order.
    pub fn history(&self, license_id: LicenseId) -> Vec<HistoryEntry> {
        self.chains
            .read()
            .get(&license_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The snapshot with the latest `as_of` on or before the given date.
    /// Among snapshots for the same date the most recently recorded wins.
    pub fn at_or_before(&self, license_id: LicenseId, as_of: NaiveDate) -> Option<ComplianceSnapshot> {
        self.chains
            .read()
            .get(&license_id)?
            .iter()
            .filter(|e| e.snapshot.as_of <= as_of)
            .max_by_key(|e| (e.snapshot.as_of, e.sequence))
            .map(|e| e.snapshot.clone())
    }

    /// Number of entries for a license.
    pub fn len(&self, license_id: LicenseId) -> usize {
        self.chains.read().get(&license_id).map_or(0, Vec::len)
    }

    /// Check every link, entry hash and snapshot id in a license's chain.
    pub fn verify_chain(&self, license_id: LicenseId) -> ChainVerification {
        let chains = self.chains.read();
        let entries = chains.get(&license_id).map(Vec::as_slice).unwrap_or_default();

        let mut broken_links = 0;
        let mut first_broken = None;
        let mut expected_prev: &str = GENESIS_HASH;
        for entry in entries {
            let intact = entry.previous_hash == expected_prev
                && entry.hash_matches()
                && entry.snapshot.verify_id();
            if !intact {
                broken_links += 1;
                first_broken.get_or_insert(entry.sequence);
            }
            expected_prev = entry.entry_hash.as_str();
        }
        if broken_links > 0 {
            tracing::warn!(%license_id, broken_links, "snapshot history chain broken");
        }

        ChainVerification {
            entries: entries.len(),
            broken_links,
            first_broken,
            valid: broken_links == 0,
        }
    }
}
