//! # Rulepacks
//!
//! A rulepack is a YAML file declaring jurisdictions and their ordered rule
//! versions. Packs are the normal way rules reach a fresh deployment;
//! the admin API publishes later changes.
//!
//! ```yaml
//! rulepack: us-physician-cme
//! version: "2026.1"
//! jurisdictions:
//!   - id: US-TX
//!     name: Texas Medical Board
//!     imlc_member: true
//!     principal_licensure_eligible: true
//!     versions:
//!       - effective_from: 2020-01-01
//!         cycle_length_months: 24
//!         total_hours: 48
//!         accepted_credit_types:
//!           - credit_type: AMA_PRA_1
//! ```
//!
//! ## Idempotent install
//!
//! [`Rulepack::install`] skips versions the store already holds with the
//! same effective date and content digest, so restarting against a
//! hydrated store republishes nothing. A version that differs from what
//! the store holds for that date is an error, never a silent overwrite.

use std::path::Path;

use chrono::NaiveDate;
use credmate_core::{sha256_digest, CanonicalBytes, ContentDigest};
use serde::{Deserialize, Serialize};

use crate::error::{RuleStoreError, RulepackError, RulepackResult};
use crate::model::{Jurisdiction, RuleSet, RuleVersion};
use crate::store::RuleStore;

/// One version entry in a rulepack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulepackVersion {
    /// First date the version governs.
    pub effective_from: NaiveDate,
    /// The requirement body.
    #[serde(flatten)]
    pub rules: RuleSet,
}

/// One jurisdiction entry in a rulepack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulepackJurisdiction {
    /// The jurisdiction definition.
    #[serde(flatten)]
    pub jurisdiction: Jurisdiction,
    /// Versions in ascending effective order.
    #[serde(default)]
    pub versions: Vec<RulepackVersion>,
}

/// A parsed rulepack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rulepack {
    /// Pack name.
    pub rulepack: String,
    /// Pack release label.
    pub version: String,
    /// Jurisdictions declared by the pack.
    #[serde(default)]
    pub jurisdictions: Vec<RulepackJurisdiction>,
}

/// Outcome of [`Rulepack::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Jurisdictions newly registered.
    pub jurisdictions_registered: usize,
    /// Versions newly published.
    pub versions_published: usize,
    /// Versions already present with identical content.
    pub versions_skipped: usize,
}

impl Rulepack {
    /// Content digest of the whole pack.
    pub fn digest(&self) -> Result<ContentDigest, RulepackError> {
        let canonical = CanonicalBytes::new(self).map_err(|e| RulepackError::Invalid {
            name: self.rulepack.clone(),
            detail: e.to_string(),
        })?;
        Ok(sha256_digest(&canonical))
    }

    /// Check internal consistency: unique jurisdictions, strictly ascending
    /// effective dates, and valid rule bodies.
    pub fn validate(&self) -> RulepackResult<()> {
        let invalid = |detail: String| RulepackError::Invalid {
            name: self.rulepack.clone(),
            detail,
        };
        if self.rulepack.trim().is_empty() {
            return Err(invalid("rulepack name must not be empty".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.jurisdictions {
            let id = &entry.jurisdiction.id;
            if !seen.insert(id.clone()) {
                return Err(invalid(format!("jurisdiction {id} is declared twice")));
            }
            for pair in entry.versions.windows(2) {
                if pair[1].effective_from <= pair[0].effective_from {
                    return Err(invalid(format!(
                        "{id}: version effective {} does not follow {}",
                        pair[1].effective_from, pair[0].effective_from
                    )));
                }
            }
            for version in &entry.versions {
                version
                    .rules
                    .validate(id)
                    .map_err(|e| invalid(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Register every jurisdiction and publish every version not already
    /// present in `store`.
    pub fn install(&self, store: &RuleStore) -> RulepackResult<InstallReport> {
        self.validate()?;
        let install_err = |source: RuleStoreError| RulepackError::Install {
            name: self.rulepack.clone(),
            source,
        };

        let mut report = InstallReport::default();
        for entry in &self.jurisdictions {
            let id = &entry.jurisdiction.id;
            if store
                .register_jurisdiction(entry.jurisdiction.clone())
                .map_err(install_err)?
            {
                report.jurisdictions_registered += 1;
            }
            let existing = store.versions(id).map_err(install_err)?;
            for version in &entry.versions {
                let digest = RuleVersion::compute_digest(id, version.effective_from, &version.rules)
                    .map_err(install_err)?;
                match existing
                    .iter()
                    .find(|v| v.effective_from == version.effective_from)
                {
                    Some(present) if present.content_digest == digest => {
                        report.versions_skipped += 1;
                    }
                    Some(present) => {
                        return Err(RulepackError::Invalid {
                            name: self.rulepack.clone(),
                            detail: format!(
                                "{id}: version effective {} differs from stored {}",
                                version.effective_from, present.version_id
                            ),
                        });
                    }
                    None => {
                        store
                            .publish_rule_version(id, version.rules.clone(), version.effective_from)
                            .map_err(install_err)?;
                        report.versions_published += 1;
                    }
                }
            }
        }
        tracing::info!(
            rulepack = %self.rulepack,
            version = %self.version,
            registered = report.jurisdictions_registered,
            published = report.versions_published,
            skipped = report.versions_skipped,
            "rulepack installed"
        );
        Ok(report)
    }
}

/// Load and validate a rulepack from a YAML file.
pub fn load_rulepack(path: &Path) -> RulepackResult<Rulepack> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RulepackError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            RulepackError::Io(e)
        }
    })?;
    let pack: Rulepack = serde_yaml::from_str(&content).map_err(|e| RulepackError::YamlParse {
        path: path.to_path_buf(),
        source: e,
    })?;
    pack.validate()?;
    Ok(pack)
}

/// Load every `*.yaml` / `*.yml` file in `dir`, in file-name order.
pub fn load_rulepack_dir(dir: &Path) -> RulepackResult<Vec<Rulepack>> {
    if !dir.is_dir() {
        return Err(RulepackError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();
    paths.iter().map(|p| load_rulepack(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use credmate_core::{CreditHours, JurisdictionId};
    use crate::model::{GracePolicy, QuotaMeasure, Recurrence};

    const PACK: &str = r#"
rulepack: test-pack
version: "1"
jurisdictions:
  - id: us-tx
    name: Texas Medical Board
    imlc_member: true
    principal_licensure_eligible: true
    versions:
      - effective_from: 2020-01-01
        cycle_length_months: 24
        total_hours: 48
        topic_quotas:
          - topic: ethics
            unit: hours
            required: 2
          - topic: human trafficking
            unit: count
            required: 1
            recurrence: one_time
        accepted_credit_types:
          - credit_type: AMA_PRA_1
          - credit_type: AOA_1A
            weight: 0.5
        grace_policy:
          kind: practice_barred
          days: 90
  - id: US-IN
    name: Indiana Medical Licensing Board
    versions:
      - effective_from: 2019-01-01
        cycle_length_months: 24
        total_hours: 0
"#;

    fn write_pack(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn parses_sample_pack() {
        let pack: Rulepack = serde_yaml::from_str(PACK).unwrap();
        pack.validate().unwrap();
        let tx = &pack.jurisdictions[0];
        assert_eq!(tx.jurisdiction.id, JurisdictionId::new("US-TX").unwrap());
        let rules = &tx.versions[0].rules;
        assert_eq!(rules.total_hours, CreditHours::from_whole(48));
        assert_eq!(rules.grace_policy, GracePolicy::PracticeBarred { days: 90 });
        assert_eq!(rules.topic_quotas[1].measure, QuotaMeasure::Count { required: 1 });
        assert_eq!(rules.topic_quotas[1].recurrence, Recurrence::OneTime);
        assert_eq!(rules.accepted_credit_types[1].weight.basis_points(), 5_000);
    }

    #[test]
    fn install_is_idempotent() {
        let pack: Rulepack = serde_yaml::from_str(PACK).unwrap();
        let store = RuleStore::new();
        let first = pack.install(&store).unwrap();
        assert_eq!(first.jurisdictions_registered, 2);
        assert_eq!(first.versions_published, 2);
        let second = pack.install(&store).unwrap();
        assert_eq!(second.jurisdictions_registered, 0);
        assert_eq!(second.versions_published, 0);
        assert_eq!(second.versions_skipped, 2);
    }

    #[test]
    fn install_refuses_divergent_version() {
        let pack: Rulepack = serde_yaml::from_str(PACK).unwrap();
        let store = RuleStore::new();
        pack.install(&store).unwrap();
        let mut changed = pack.clone();
        changed.jurisdictions[0].versions[0].rules.total_hours = CreditHours::from_whole(50);
        assert!(matches!(
            changed.install(&store),
            Err(RulepackError::Invalid { .. })
        ));
    }

    #[test]
    fn validate_rejects_unordered_versions() {
        let mut pack: Rulepack = serde_yaml::from_str(PACK).unwrap();
        let first = pack.jurisdictions[0].versions[0].clone();
        pack.jurisdictions[0].versions.push(first);
        assert!(pack.validate().is_err());
    }

    #[test]
    fn load_missing_file() {
        let err = load_rulepack(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, RulepackError::FileNotFound { .. }));
    }

    #[test]
    fn load_reports_yaml_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(dir.path(), "broken.yaml", "rulepack: [unterminated");
        match load_rulepack(&path) {
            Err(RulepackError::YamlParse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected YamlParse, got {other:?}"),
        }
    }

    #[test]
    fn load_dir_reads_yaml_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "b.yaml", PACK);
        write_pack(
            dir.path(),
            "a.yml",
            "rulepack: empty\nversion: \"0\"\njurisdictions: []\n",
        );
        write_pack(dir.path(), "notes.txt", "ignored");
        let packs = load_rulepack_dir(dir.path()).unwrap();
        assert_eq!(packs.len(), 2);
        assert_eq!(packs[0].rulepack, "empty");
        assert_eq!(packs[1].rulepack, "test-pack");
    }

    #[test]
    fn pack_digest_is_stable() {
        let a: Rulepack = serde_yaml::from_str(PACK).unwrap();
        let b: Rulepack = serde_yaml::from_str(PACK).unwrap();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }
}
