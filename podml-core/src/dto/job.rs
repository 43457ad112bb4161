//! Training job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::resources::ResourceOverrides;

/// Request to launch a training job from a stored configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub configuration_id: Uuid,
    #[serde(flatten)]
    pub resources: ResourceOverrides,
    #[serde(flatten)]
    pub urls: DeliveryUrls,
}

/// Presigned URLs for URL-mode delivery
///
/// Either all three are supplied or the job cannot run in URL mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryUrls {
    pub dataset_url: Option<String>,
    pub output_model_url: Option<String>,
    pub output_metrics_url: Option<String>,
}

/// Pagination for list endpoints
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub const MAX_PAGE_LIMIT: i64 = 200;

fn default_limit() -> i64 {
    50
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Page {
    /// Clamps limit to `1..=200` and offset to non-negative
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_PAGE_LIMIT),
            offset: self.offset.max(0),
        }
    }
}
