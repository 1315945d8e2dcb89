//! The aggregated version snapshot and its JSON shape.
//!
//! The published document maps each display name to a record whose shape is
//! selected by the project's family: agents carry `latest_version`,
//! telemetry SDKs carry `sdk_latest_version` and `auto_latest_version`.
//! Unresolved fields are omitted from the JSON, matching the historical
//! document format.

use crate::registry::Family;
use serde::Serialize;
use std::collections::BTreeMap;

/// Which field of a [`VersionRecord`] an extracted version is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    /// `latest_version` on an agent record.
    Latest,
    /// `sdk_latest_version` on a telemetry record.
    Sdk,
    /// `auto_latest_version` on a telemetry record.
    Auto,
}

/// The resolved versions of one tracked project.
///
/// Serializes untagged: the two shapes are mutually exclusive per key and
/// distinguished by their field names alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VersionRecord {
    /// Agent-family shape.
    Agent {
        #[serde(skip_serializing_if = "Option::is_none")]
        latest_version: Option<String>,
    },

    /// Telemetry-family shape.
    TelemetrySdk {
        #[serde(skip_serializing_if = "Option::is_none")]
        sdk_latest_version: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        auto_latest_version: Option<String>,
    },
}

impl VersionRecord {
    /// Creates the empty record of the given family's shape.
    pub fn empty(family: Family) -> Self {
        match family {
            Family::Agent => VersionRecord::Agent {
                latest_version: None,
            },
            Family::TelemetrySdk => VersionRecord::TelemetrySdk {
                sdk_latest_version: None,
                auto_latest_version: None,
            },
        }
    }

    /// Writes an extracted version into the given field.
    ///
    /// A field that does not exist on this record's shape is ignored; the
    /// query plan only ever pairs fields with their own family.
    pub fn assign(&mut self, field: VersionField, version: String) {
        match (self, field) {
            (VersionRecord::Agent { latest_version }, VersionField::Latest) => {
                *latest_version = Some(version);
            }
            (
                VersionRecord::TelemetrySdk {
                    sdk_latest_version, ..
                },
                VersionField::Sdk,
            ) => {
                *sdk_latest_version = Some(version);
            }
            (
                VersionRecord::TelemetrySdk {
                    auto_latest_version,
                    ..
                },
                VersionField::Auto,
            ) => {
                *auto_latest_version = Some(version);
            }
            _ => {}
        }
    }
}

/// The complete mapping published per run, keyed by display name.
///
/// Backed by a `BTreeMap` so serialization is byte-identical for identical
/// input, regardless of extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregatedSnapshot {
    records: BTreeMap<String, VersionRecord>,
}

impl AggregatedSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `display_name`, creating the empty record of
    /// the given family's shape if the project has not been seen yet.
    pub fn entry(&mut self, display_name: &str, family: Family) -> &mut VersionRecord {
        self.records
            .entry(display_name.to_string())
            .or_insert_with(|| VersionRecord::empty(family))
    }

    /// Looks up a record by display name.
    pub fn get(&self, display_name: &str) -> Option<&VersionRecord> {
        self.records.get(display_name)
    }

    /// Number of projects in the snapshot.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no projects.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serializes the snapshot to the published JSON document.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_record_serializes_with_its_single_field() {
        let mut record = VersionRecord::empty(Family::Agent);
        record.assign(VersionField::Latest, "2.4.0".to_string());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "latest_version": "2.4.0" }));
    }

    #[test]
    fn telemetry_record_serializes_both_fields() {
        let mut record = VersionRecord::empty(Family::TelemetrySdk);
        record.assign(VersionField::Sdk, "1.9.0".to_string());
        record.assign(VersionField::Auto, "1.9.0".to_string());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sdk_latest_version": "1.9.0",
                "auto_latest_version": "1.9.0",
            })
        );
    }

    #[test]
    fn unresolved_fields_are_omitted() {
        let agent = VersionRecord::empty(Family::Agent);
        let telemetry = VersionRecord::empty(Family::TelemetrySdk);

        assert_eq!(serde_json::to_value(&agent).unwrap(), serde_json::json!({}));
        assert_eq!(
            serde_json::to_value(&telemetry).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn mismatched_field_is_ignored() {
        let mut record = VersionRecord::empty(Family::Agent);
        record.assign(VersionField::Sdk, "1.0.0".to_string());
        assert_eq!(record, VersionRecord::empty(Family::Agent));
    }

    #[test]
    fn snapshot_serialization_is_order_independent() {
        let mut first = AggregatedSnapshot::new();
        first
            .entry("java", Family::Agent)
            .assign(VersionField::Latest, "1.0.0".to_string());
        first.entry("go", Family::Agent);

        let mut second = AggregatedSnapshot::new();
        second.entry("go", Family::Agent);
        second
            .entry("java", Family::Agent)
            .assign(VersionField::Latest, "1.0.0".to_string());

        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }
}
