//! Mobility and consumption profile database.
//!
//! Profiles are produced by external tooling, one record per file. Each
//! record is tagged by `kind`; consumption records carry the vehicle's
//! per-timestep energy draw that replaces the `consumption` column of the
//! site series in a sweep.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{DispatchError, Result, Stage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileRecord {
    Driving(DrivingProfile),
    Consumption(ConsumptionProfile),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrivingProfile {
    /// User group whose rules generated the trips (commuter, retiree, ...)
    #[serde(default)]
    pub user_rules: Option<String>,
    #[serde(default)]
    pub total_hours: Option<f64>,
    #[serde(default)]
    pub time_step_in_hrs: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionProfile {
    #[serde(default)]
    pub vehicle: Option<String>,
    /// Name of the driving profile this consumption was derived from
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub timeseries: Option<ConsumptionSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSeries {
    /// Driving energy per timestep (kWh)
    pub consumption: Vec<f64>,
    /// Vehicle-at-home indicator, if the profile carries its own
    #[serde(default, alias = "BEV_at_home")]
    pub bev_at_home: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileDatabase {
    records: BTreeMap<String, ProfileRecord>,
}

impl ProfileDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, record: ProfileRecord) {
        self.records.insert(name.into(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ProfileRecord> {
        self.records.get(name)
    }

    /// Load every `*.json`, `*.yaml` and `*.yml` record in `dir`; the file
    /// stem is the profile name.
    pub fn load(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| DispatchError::io(Stage::Profiles, dir, e))?;

        let mut db = Self::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DispatchError::io(Stage::Profiles, dir, e))?
                .path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let text = match ext {
                "json" | "yaml" | "yml" => fs::read_to_string(&path)
                    .map_err(|e| DispatchError::io(Stage::Profiles, &path, e))?,
                _ => continue,
            };
            let record: ProfileRecord = if ext == "json" {
                serde_json::from_str(&text).map_err(|e| malformed(&path, &e))?
            } else {
                serde_yaml::from_str(&text).map_err(|e| malformed(&path, &e))?
            };
            db.insert(name, record);
        }

        info!(dir = %dir.display(), profiles = db.len(), "loaded profile database");
        Ok(db)
    }

    pub fn consumption_profiles(&self) -> impl Iterator<Item = (&str, &ConsumptionProfile)> {
        self.records.iter().filter_map(|(name, record)| match record {
            ProfileRecord::Consumption(p) => Some((name.as_str(), p)),
            ProfileRecord::Driving(_) => None,
        })
    }

    pub fn driving_profiles(&self) -> impl Iterator<Item = (&str, &DrivingProfile)> {
        self.records.iter().filter_map(|(name, record)| match record {
            ProfileRecord::Driving(p) => Some((name.as_str(), p)),
            ProfileRecord::Consumption(_) => None,
        })
    }

    /// Series of all consumption profiles that carry one.
    ///
    /// Profiles without a series are reported and skipped.
    pub fn consumption_series(&self) -> BTreeMap<String, ConsumptionSeries> {
        let mut series = BTreeMap::new();
        for (name, profile) in self.consumption_profiles() {
            match &profile.timeseries {
                Some(ts) => {
                    series.insert(name.to_string(), ts.clone());
                }
                None => warn!(profile = name, "'timeseries' not found in profile"),
            }
        }
        if series.is_empty() {
            error!("no 'timeseries' found in any profile, was consumption calculated?");
        }
        series
    }
}

fn malformed(path: &Path, e: &dyn std::fmt::Display) -> DispatchError {
    DispatchError::configuration(
        Stage::Profiles,
        format!("malformed profile record {}: {e}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_records() {
        let json = r#"{"kind": "consumption", "vehicle": "Tesla Model 3",
            "timeseries": {"consumption": [0.0, 1.5], "BEV_at_home": [1, 0]}}"#;
        let record: ProfileRecord = serde_json::from_str(json).unwrap();

        match record {
            ProfileRecord::Consumption(p) => {
                let ts = p.timeseries.unwrap();
                assert_eq!(ts.consumption, vec![0.0, 1.5]);
                assert_eq!(ts.bev_at_home, Some(vec![1.0, 0.0]));
            }
            other => panic!("unexpected record {other:?}"),
        }

        let yaml = "kind: driving\nuser_rules: commuter\ntotal_hours: 168\n";
        let record: ProfileRecord = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(record, ProfileRecord::Driving(DrivingProfile { user_rules: Some(ref r), .. }) if r == "commuter"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(serde_json::from_str::<ProfileRecord>(r#"{"kind": "charging"}"#).is_err());
    }

    #[test]
    fn test_missing_timeseries_is_skipped() {
        let mut db = ProfileDatabase::new();
        db.insert("BEV_commuter", ProfileRecord::Driving(DrivingProfile::default()));
        db.insert(
            "BEV_commuter_tesla",
            ProfileRecord::Consumption(ConsumptionProfile {
                timeseries: Some(ConsumptionSeries {
                    consumption: vec![0.2; 4],
                    bev_at_home: None,
                }),
                ..Default::default()
            }),
        );
        db.insert("BEV_retiree_tesla", ProfileRecord::Consumption(ConsumptionProfile::default()));

        let series = db.consumption_series();
        assert_eq!(series.keys().collect::<Vec<_>>(), vec!["BEV_commuter_tesla"]);
        assert_eq!(db.driving_profiles().count(), 1);
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"{"kind": "consumption", "timeseries": {"consumption": [1.0]}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("b.yaml"), "kind: driving\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let db = ProfileDatabase::load(dir.path()).unwrap();
        assert_eq!(db.len(), 2);
        assert!(matches!(db.get("b"), Some(ProfileRecord::Driving(_))));
    }

    #[test]
    fn test_load_malformed_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), r#"{"kind": "consumption", "timeseries": 3}"#).unwrap();

        let err = ProfileDatabase::load(dir.path()).unwrap_err();
        assert_eq!(err.stage(), Stage::Profiles);
    }
}
