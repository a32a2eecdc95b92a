use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSavings {
    pub amount_per_month: f64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Resize,
    Delete,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::Resize => "resize",
            ActionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_savings: Option<CostSavings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommender_subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_kind: Option<ActionKind>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub action_params: BTreeMap<String, String>,
}

impl Recommendation {
    pub fn from_description(
        recommendation_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            recommendation_id: recommendation_id.into(),
            description: description.into(),
            cost_savings: None,
            priority: None,
            recommender_subtype: None,
            zone: None,
            target_resource_id: None,
            action_kind: None,
            action_params: BTreeMap::new(),
        }
    }

    pub fn monthly_savings(&self) -> f64 {
        self.cost_savings
            .as_ref()
            .map(|c| c.amount_per_month.abs())
            .unwrap_or(0.0)
    }

    pub fn description_head(&self) -> &str {
        self.description.split_whitespace().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommendation_parses_without_optional_fields() {
        let rec: Recommendation = serde_json::from_str(
            r#"{"recommendation_id": "r-1", "description": "vm-1 Change machine type"}"#,
        )
        .expect("parse");
        assert!(rec.cost_savings.is_none());
        assert!(rec.action_kind.is_none());
        assert!(rec.action_params.is_empty());
        assert_eq!(rec.monthly_savings(), 0.0);
        assert_eq!(rec.description_head(), "vm-1");
    }

    #[test]
    fn monthly_savings_uses_absolute_value() {
        let rec: Recommendation = serde_json::from_str(
            r#"{
                "recommendation_id": "r-1",
                "description": "x",
                "cost_savings": {"amount_per_month": -12.5, "currency": "USD"}
            }"#,
        )
        .expect("parse");
        assert_eq!(rec.monthly_savings(), 12.5);
    }

    #[test]
    fn structured_fields_round_trip_through_json() {
        let rec: Recommendation = serde_json::from_str(
            r#"{
                "recommendation_id": "r-2",
                "description": "resize",
                "target_resource_id": "vm-2",
                "action_kind": "resize",
                "action_params": {"machine_type": "e2-small"}
            }"#,
        )
        .expect("parse");
        assert_eq!(rec.action_kind, Some(ActionKind::Resize));
        assert_eq!(
            rec.action_params.get("machine_type").map(String::as_str),
            Some("e2-small")
        );
    }
}
