mod inventory;
mod project;
mod recommendation;
mod report;
mod zombie;

pub use inventory::InventoryItem;
pub use project::Project;
pub use recommendation::{ActionKind, CostSavings, Recommendation};
pub use report::{Report, Summary};
pub use zombie::{ResourceType, ZombieResource};
