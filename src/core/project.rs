use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub display_name: String,
}

impl Project {
    pub fn label(&self) -> String {
        if self.display_name.trim().is_empty() {
            self.project_id.clone()
        } else {
            format!("{} ({})", self.display_name, self.project_id)
        }
    }
}
