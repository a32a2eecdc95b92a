use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::{InventoryItem, Recommendation, ZombieResource};

pub const RIGHTSIZING_LABEL: &str = "Rightsizing";
pub const ZOMBIE_LABEL: &str = "Zombie Resources";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SavingsBreakdown {
    pub rightsizing: f64,
    pub zombie: f64,
}

impl SavingsBreakdown {
    pub fn total(&self) -> f64 {
        self.rightsizing + self.zombie
    }

    pub fn categories(&self) -> [ChartPoint; 2] {
        [
            ChartPoint {
                name: RIGHTSIZING_LABEL.to_string(),
                value: self.rightsizing,
            },
            ChartPoint {
                name: ZOMBIE_LABEL.to_string(),
                value: self.zombie,
            },
        ]
    }
}

pub fn aggregate_savings(
    recommendations: &[Recommendation],
    zombies: &[ZombieResource],
) -> SavingsBreakdown {
    SavingsBreakdown {
        rightsizing: recommendations.iter().map(Recommendation::monthly_savings).sum(),
        zombie: zombies.iter().map(ZombieResource::monthly_waste).sum(),
    }
}

pub fn to_chart_series(cost_by_zone: &BTreeMap<String, f64>) -> Vec<ChartPoint> {
    cost_by_zone
        .iter()
        .map(|(name, value)| ChartPoint {
            name: name.clone(),
            value: *value,
        })
        .collect()
}

fn normalize_query(query: &str) -> Option<String> {
    let q = query.trim();
    if q.is_empty() {
        None
    } else {
        Some(q.to_lowercase())
    }
}

fn item_matches(item: &InventoryItem, needle: &str) -> bool {
    [&item.name, &item.asset_type, &item.location]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

pub fn filtered_indices(items: &[InventoryItem], query: &str) -> Vec<usize> {
    let Some(needle) = normalize_query(query) else {
        return (0..items.len()).collect();
    };
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item_matches(item, &needle))
        .map(|(i, _)| i)
        .collect()
}

pub fn filter_inventory(items: &[InventoryItem], query: &str) -> Vec<InventoryItem> {
    filtered_indices(items, query)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

/// Inventory snapshot plus the current query.
///
/// The visible rows are always re-derived from the full snapshot, so
/// changing the query never narrows an earlier result.
#[derive(Debug, Clone, Default)]
pub struct InventoryView {
    items: Vec<InventoryItem>,
    query: String,
    visible: Vec<usize>,
}

impl InventoryView {
    pub fn new(items: Vec<InventoryItem>) -> Self {
        let visible = (0..items.len()).collect();
        Self {
            items,
            query: String::new(),
            visible,
        }
    }

    pub fn replace_items(&mut self, items: Vec<InventoryItem>) {
        self.items = items;
        self.visible = filtered_indices(&self.items, &self.query);
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.visible = filtered_indices(&self.items, &self.query);
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&InventoryItem> {
        self.items.get(*self.visible.get(row)?)
    }

    pub fn visible(&self) -> impl Iterator<Item = &InventoryItem> {
        self.visible.iter().filter_map(|&i| self.items.get(i))
    }
}
