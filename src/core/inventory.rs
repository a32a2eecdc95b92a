use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub create_time: String,
}

impl InventoryItem {
    pub fn is_active(&self) -> bool {
        matches!(self.state.as_str(), "RUNNING" | "IN_USE")
    }
}
