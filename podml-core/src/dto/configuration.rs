//! Configuration DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request to register a new configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConfiguration {
    pub name: String,
    pub dataset_uri: String,
    pub x_column: String,
    pub y_column: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub hyperparams: Option<HashMap<String, serde_json::Value>>,
}
