use std::collections::BTreeMap;

use crate::core::{Recommendation, ZombieResource};
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_potential_savings: f64,
    #[serde(default)]
    pub zombie_resource_count: u64,
    #[serde(default)]
    pub cost_by_zone: BTreeMap<String, f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation_count: Option<u64>,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            total_potential_savings: 0.0,
            zombie_resource_count: 0,
            cost_by_zone: BTreeMap::new(),
            currency: default_currency(),
            recommendation_count: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub zombie_resources: Vec<ZombieResource>,
}

impl Report {
    pub fn recommendation(&self, recommendation_id: &str) -> Option<&Recommendation> {
        self.recommendations
            .iter()
            .find(|r| r.recommendation_id == recommendation_id)
    }

    pub fn zombie(&self, resource_id: &str) -> Option<&ZombieResource> {
        self.zombie_resources
            .iter()
            .find(|z| z.resource_id == resource_id)
    }

    pub fn recommendation_count(&self) -> u64 {
        self.summary
            .recommendation_count
            .unwrap_or(self.recommendations.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_tolerates_missing_sections() {
        let report: Report = serde_json::from_str(r#"{"summary": {}}"#).expect("parse");
        assert!(report.recommendations.is_empty());
        assert!(report.zombie_resources.is_empty());
        assert!(report.summary.cost_by_zone.is_empty());
        assert_eq!(report.summary.currency, "USD");
        assert_eq!(report.recommendation_count(), 0);
    }

    #[test]
    fn report_accepts_backend_echo_fields() {
        let report: Report = serde_json::from_str(
            r#"{
                "project_id": "demo",
                "zone": "us-central1-a",
                "summary": {
                    "total_potential_savings": 42.5,
                    "currency": "EUR",
                    "recommendation_count": 3,
                    "zombie_resource_count": 1,
                    "cost_by_zone": {"us-central1-a": 42.5}
                },
                "recommendations": [],
                "zombie_resources": []
            }"#,
        )
        .expect("parse");
        assert_eq!(report.project_id.as_deref(), Some("demo"));
        assert_eq!(report.summary.currency, "EUR");
        assert_eq!(report.recommendation_count(), 3);
        assert_eq!(report.summary.zombie_resource_count, 1);
    }
}
