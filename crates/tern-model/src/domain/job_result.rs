use serde::{Deserialize, Serialize};

/// Structured output a running workload reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    #[serde(rename = "type")]
    pub r#type: String,
    pub payload: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl JobResult {
    pub fn new(r#type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
