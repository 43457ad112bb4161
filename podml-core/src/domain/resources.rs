//! Container resource requests and limits

use serde::{Deserialize, Serialize};

pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_MEM_REQUEST: &str = "256Mi";
pub const DEFAULT_CPU_LIMIT: &str = "1";
pub const DEFAULT_MEM_LIMIT: &str = "1Gi";

/// CPU/memory requests and limits for a training workload
///
/// Values are Kubernetes quantity strings (`100m`, `256Mi`, `1`, `1Gi`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuartet {
    pub cpu_request: String,
    pub mem_request: String,
    pub cpu_limit: String,
    pub mem_limit: String,
}

impl Default for ResourceQuartet {
    fn default() -> Self {
        Self {
            cpu_request: DEFAULT_CPU_REQUEST.to_string(),
            mem_request: DEFAULT_MEM_REQUEST.to_string(),
            cpu_limit: DEFAULT_CPU_LIMIT.to_string(),
            mem_limit: DEFAULT_MEM_LIMIT.to_string(),
        }
    }
}

/// Per-field overrides; unset fields fall back to a baseline quartet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOverrides {
    pub cpu_request: Option<String>,
    pub mem_request: Option<String>,
    pub cpu_limit: Option<String>,
    pub mem_limit: Option<String>,
}

impl ResourceOverrides {
    pub fn resolve(self, baseline: &ResourceQuartet) -> ResourceQuartet {
        ResourceQuartet {
            cpu_request: self
                .cpu_request
                .unwrap_or_else(|| baseline.cpu_request.clone()),
            mem_request: self
                .mem_request
                .unwrap_or_else(|| baseline.mem_request.clone()),
            cpu_limit: self.cpu_limit.unwrap_or_else(|| baseline.cpu_limit.clone()),
            mem_limit: self.mem_limit.unwrap_or_else(|| baseline.mem_limit.clone()),
        }
    }
}

impl ResourceQuartet {
    /// Checks every field is a well-formed quantity, naming the first bad one
    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("cpu_request", &self.cpu_request),
            ("mem_request", &self.mem_request),
            ("cpu_limit", &self.cpu_limit),
            ("mem_limit", &self.mem_limit),
        ];

        for (name, value) in fields {
            if !is_quantity(value) {
                return Err(format!("{} is not a valid quantity: {:?}", name, value));
            }
        }

        Ok(())
    }
}

const QUANTITY_SUFFIXES: &[&str] = &[
    "", "m", "k", "M", "G", "T", "P", "E", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei",
];

/// Accepts `<digits>[.<digits>]<suffix>` with a known decimal or binary suffix
fn is_quantity(value: &str) -> bool {
    let number_end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(number_end);

    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let valid_number = match parts.next() {
        Some(fraction) => {
            !(whole.is_empty() && fraction.is_empty())
                && fraction.chars().all(|c| c.is_ascii_digit())
        }
        None => !whole.is_empty(),
    };

    valid_number && QUANTITY_SUFFIXES.contains(&suffix)
}
