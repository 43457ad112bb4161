//! Configuration domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_MODEL_TYPE: &str = "linear_regression";

/// Dataset, columns and model settings a training job is launched from
///
/// Immutable once stored; many jobs may reference the same configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub dataset_uri: String,
    pub x_column: String,
    pub y_column: String,
    pub model_type: String,
    pub hyperparams: Option<HashMap<String, serde_json::Value>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Configuration {
    /// `fit_intercept` hyperparameter, defaulting to true
    ///
    /// A string value counts as true only when it reads "true" ignoring case.
    pub fn fit_intercept(&self) -> bool {
        match self
            .hyperparams
            .as_ref()
            .and_then(|hp| hp.get("fit_intercept"))
        {
            None => true,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(_) => false,
        }
    }

    /// Local path of the dataset when it is a `file://` URI
    pub fn local_dataset_path(&self) -> Option<&str> {
        self.dataset_uri.strip_prefix("file://")
    }
}
