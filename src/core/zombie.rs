use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    GceInstance,
    Disk,
    IpAddress,
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ResourceType::GceInstance => "gce_instance",
            ResourceType::Disk => "disk",
            ResourceType::IpAddress => "ip_address",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gce_instance" | "instance" => Ok(ResourceType::GceInstance),
            "disk" => Ok(ResourceType::Disk),
            "ip_address" | "ip" => Ok(ResourceType::IpAddress),
            "other" => Ok(ResourceType::Other),
            other => Err(format!(
                "リソース種別が不正です: {other}（gce_instance|disk|ip_address|other を指定してください）"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZombieResource {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "ZombieResource::default_type")]
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub waste_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_monthly_waste: Option<f64>,
}

impl ZombieResource {
    fn default_type() -> ResourceType {
        ResourceType::Other
    }

    pub fn monthly_waste(&self) -> f64 {
        self.estimated_monthly_waste.unwrap_or(0.0)
    }

    pub fn zone_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.zone.as_deref().map(str::trim) {
            Some(zone) if !zone.is_empty() => zone,
            _ => fallback,
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}
