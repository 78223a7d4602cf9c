//! Experiment documents sent to the experiment service.
//!
//! The field names and nesting here are the service's wire format. Several
//! boolean-looking fields are strings on the wire (`"true"`, `"False"`) and
//! must stay that way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CONTROL_GROUP: &str = "control";
pub const DISABLED_GROUP: &str = "disabled";
pub const DOCUMENT_VERSION: u32 = 4;

/// A complete experiment definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDocument {
    pub experiment_name: String,
    pub experiment_type: String,
    pub experiment_description: String,
    pub enabled: String,
    pub version: u32,
    pub is_feature_flag: String,
    pub experiment_tags: Vec<String>,
    pub key_metrics: Vec<String>,
    pub analytics_enabled: String,
    pub treatment_groups: Vec<TreatmentGroup>,
    pub advanced_rollout: AdvancedRollout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentGroup {
    pub treatment_group_description: String,
    pub treatment_group_value: BTreeMap<String, Value>,
    pub treatment_group_serial: u32,
    pub treatment_group_name: String,
    pub treatment_group_proportion: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedRollout {
    pub client_side_bucketing: String,
    pub platform: Vec<String>,
    pub bucket_by: String,
    #[serde(rename = "type")]
    pub rollout_type: String,
    pub children: Vec<RolloutSegment>,
    pub experiment_title: String,
    pub experiment_type: String,
    /// os -> app -> version bound
    pub launched_app_versions: BTreeMap<String, BTreeMap<String, VersionBound>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutSegment {
    pub title: String,
    pub rollout: f64,
    pub bucket_by: String,
    pub operator: String,
    pub distribution: Vec<Allocation>,
    pub property: String,
    #[serde(rename = "type")]
    pub segment_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub proportion: f64,
    pub treatment_group_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBound {
    #[serde(rename = "minIncl")]
    pub min_incl: String,
}

impl ExperimentDocument {
    /// Sum of all treatment-group proportions.
    pub fn total_proportion(&self) -> f64 {
        self.treatment_groups
            .iter()
            .map(|g| g.treatment_group_proportion)
            .sum()
    }
}

fn treatment_group(name: &str, description: &str, proportion: f64) -> TreatmentGroup {
    TreatmentGroup {
        treatment_group_description: description.to_string(),
        treatment_group_value: BTreeMap::new(),
        treatment_group_serial: 0,
        treatment_group_name: name.to_string(),
        treatment_group_proportion: proportion,
    }
}

/// Build the experiment document for one flag.
///
/// `platform` is the app the rollout segment targets (e.g. `rider`);
/// `experiment_kind` is the flag kind label (`feature_flag` or
/// `optimistic_feature_flag`). Deterministic and side-effect free.
pub fn build(flag_name: &str, platform: &str, experiment_kind: &str) -> ExperimentDocument {
    let groups = vec![
        treatment_group(CONTROL_GROUP, "", 0.5),
        treatment_group(DISABLED_GROUP, "treatment_description", 0.5),
    ];
    let distribution = groups
        .iter()
        .map(|g| Allocation {
            proportion: g.treatment_group_proportion,
            treatment_group_name: g.treatment_group_name.clone(),
        })
        .collect();

    let mut apps = BTreeMap::new();
    apps.insert(
        platform.to_string(),
        VersionBound {
            min_incl: "current".to_string(),
        },
    );
    let mut launched_app_versions = BTreeMap::new();
    launched_app_versions.insert("android".to_string(), apps);

    ExperimentDocument {
        experiment_name: flag_name.to_string(),
        experiment_type: "experiment".to_string(),
        experiment_description: format!("optimistic feature flag {flag_name}"),
        enabled: "true".to_string(),
        version: DOCUMENT_VERSION,
        is_feature_flag: "false".to_string(),
        experiment_tags: Vec::new(),
        key_metrics: Vec::new(),
        analytics_enabled: "false".to_string(),
        treatment_groups: groups,
        advanced_rollout: AdvancedRollout {
            client_side_bucketing: "False".to_string(),
            platform: vec!["mobile".to_string()],
            bucket_by: "$user".to_string(),
            rollout_type: "$or".to_string(),
            children: vec![RolloutSegment {
                title: "Segment1".to_string(),
                rollout: 1.0,
                bucket_by: "$user".to_string(),
                operator: "$eq".to_string(),
                distribution,
                property: "app".to_string(),
                segment_type: "$constraint".to_string(),
                value: platform.to_string(),
            }],
            experiment_title: String::new(),
            experiment_type: experiment_kind.to_string(),
            launched_app_versions,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_names_document_after_flag() {
        let doc = build("checkout_v2", "rider", "feature_flag");
        assert_eq!(doc.experiment_name, "checkout_v2");
        assert_eq!(doc.experiment_description, "optimistic feature flag checkout_v2");
        assert_eq!(doc.advanced_rollout.experiment_type, "feature_flag");
    }

    #[test]
    fn test_treatment_groups_sum_to_one() {
        let doc = build("checkout_v2", "rider", "feature_flag");
        assert_eq!(doc.treatment_groups.len(), 2);
        assert!((doc.total_proportion() - 1.0).abs() < f64::EPSILON);

        let names: Vec<&str> = doc
            .treatment_groups
            .iter()
            .map(|g| g.treatment_group_name.as_str())
            .collect();
        assert_eq!(names, vec![CONTROL_GROUP, DISABLED_GROUP]);
    }

    #[test]
    fn test_distribution_mirrors_treatment_groups() {
        let doc = build("f", "driver", "optimistic_feature_flag");
        let segment = &doc.advanced_rollout.children[0];
        assert_eq!(segment.rollout, 1.0);
        assert_eq!(segment.value, "driver");
        for (group, alloc) in doc.treatment_groups.iter().zip(&segment.distribution) {
            assert_eq!(group.treatment_group_name, alloc.treatment_group_name);
            assert_eq!(group.treatment_group_proportion, alloc.proportion);
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(
            build("f", "rider", "feature_flag"),
            build("f", "rider", "feature_flag")
        );
    }

    #[test]
    fn test_wire_format() {
        let doc = build("my_flag", "rider", "optimistic_feature_flag");
        let v = serde_json::to_value(&doc).unwrap();

        let expected = json!({
            "experiment_name": "my_flag",
            "experiment_type": "experiment",
            "experiment_description": "optimistic feature flag my_flag",
            "enabled": "true",
            "version": 4,
            "is_feature_flag": "false",
            "experiment_tags": [],
            "key_metrics": [],
            "analytics_enabled": "false",
            "treatment_groups": [
                {
                    "treatment_group_description": "",
                    "treatment_group_value": {},
                    "treatment_group_serial": 0,
                    "treatment_group_name": "control",
                    "treatment_group_proportion": 0.5
                },
                {
                    "treatment_group_description": "treatment_description",
                    "treatment_group_value": {},
                    "treatment_group_serial": 0,
                    "treatment_group_name": "disabled",
                    "treatment_group_proportion": 0.5
                }
            ],
            "advanced_rollout": {
                "client_side_bucketing": "False",
                "platform": ["mobile"],
                "bucket_by": "$user",
                "type": "$or",
                "children": [
                    {
                        "title": "Segment1",
                        "rollout": 1.0,
                        "bucket_by": "$user",
                        "operator": "$eq",
                        "distribution": [
                            {"proportion": 0.5, "treatment_group_name": "control"},
                            {"proportion": 0.5, "treatment_group_name": "disabled"}
                        ],
                        "property": "app",
                        "type": "$constraint",
                        "value": "rider"
                    }
                ],
                "experiment_title": "",
                "experiment_type": "optimistic_feature_flag",
                "launched_app_versions": {
                    "android": {"rider": {"minIncl": "current"}}
                }
            }
        });

        assert_eq!(v, expected);
    }
}
