//! Training program contract
//!
//! The trainer container image is built separately; this module pins down the
//! environment it reads, the files it writes and the exit codes it uses, so
//! the orchestrator and the image agree on both sides.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Environment variable names read by the trainer
pub mod env {
    pub const X_COLUMN: &str = "X_COLUMN";
    pub const Y_COLUMN: &str = "Y_COLUMN";
    pub const FIT_INTERCEPT: &str = "FIT_INTERCEPT";
    pub const USER_SUB: &str = "USER_SUB";
    pub const JOB_ID: &str = "JOB_ID";
    pub const DATASET_URL: &str = "DATASET_URL";
    pub const DATASET_PATH: &str = "DATASET_PATH";
    pub const OUTPUT_MODEL_URL: &str = "OUTPUT_MODEL_URL";
    pub const OUTPUT_METRICS_URL: &str = "OUTPUT_METRICS_URL";
    pub const OUTPUT_DIR: &str = "OUTPUT_DIR";
}

/// Where the dataset is mounted inside the container in volume mode
pub const DATASET_MOUNT_PATH: &str = "/data/dataset";
/// Where the artifacts directory is mounted inside the container in volume mode
pub const ARTIFACTS_MOUNT_PATH: &str = "/data/artifacts";

pub const MODEL_FILE_NAME: &str = "model.pkl";
pub const METRICS_FILE_NAME: &str = "metrics.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Url(String),
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Urls {
        model_url: String,
        metrics_url: String,
    },
    Directory(String),
}

/// Everything the trainer needs to run one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerInputs {
    pub x_column: String,
    pub y_column: String,
    pub fit_intercept: bool,
    pub owner: String,
    pub job_id: String,
    pub dataset: DatasetSource,
    pub output: OutputDestination,
}

impl TrainerInputs {
    /// Renders the inputs as container environment variables
    ///
    /// Exactly one dataset variable and one output form are ever emitted.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(env::X_COLUMN.to_string(), self.x_column.clone());
        vars.insert(env::Y_COLUMN.to_string(), self.y_column.clone());
        vars.insert(
            env::FIT_INTERCEPT.to_string(),
            self.fit_intercept.to_string(),
        );
        vars.insert(env::USER_SUB.to_string(), self.owner.clone());
        vars.insert(env::JOB_ID.to_string(), self.job_id.clone());

        match &self.dataset {
            DatasetSource::Url(url) => {
                vars.insert(env::DATASET_URL.to_string(), url.clone());
            }
            DatasetSource::Path(path) => {
                vars.insert(env::DATASET_PATH.to_string(), path.clone());
            }
        }

        match &self.output {
            OutputDestination::Urls {
                model_url,
                metrics_url,
            } => {
                vars.insert(env::OUTPUT_MODEL_URL.to_string(), model_url.clone());
                vars.insert(env::OUTPUT_METRICS_URL.to_string(), metrics_url.clone());
            }
            OutputDestination::Directory(dir) => {
                vars.insert(env::OUTPUT_DIR.to_string(), dir.clone());
            }
        }

        vars
    }

    /// Resolves inputs the way the trainer does at startup
    ///
    /// A dataset URL wins over a dataset path, and an upload URL pair wins
    /// over an output directory. Empty values count as unset.
    pub fn from_env(vars: &HashMap<String, String>) -> Result<Self, ContractViolation> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.as_str())
                .filter(|v| !v.is_empty())
        };

        let x_column = get(env::X_COLUMN).ok_or(ContractViolation::MissingInput(env::X_COLUMN))?;
        let y_column = get(env::Y_COLUMN).ok_or(ContractViolation::MissingInput(env::Y_COLUMN))?;
        let fit_intercept = get(env::FIT_INTERCEPT)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let dataset = match (get(env::DATASET_URL), get(env::DATASET_PATH)) {
            (Some(url), _) => DatasetSource::Url(url.to_string()),
            (None, Some(path)) => DatasetSource::Path(path.to_string()),
            (None, None) => return Err(ContractViolation::MissingInput("dataset source")),
        };

        let output = match (
            get(env::OUTPUT_MODEL_URL),
            get(env::OUTPUT_METRICS_URL),
            get(env::OUTPUT_DIR),
        ) {
            (Some(model_url), Some(metrics_url), _) => OutputDestination::Urls {
                model_url: model_url.to_string(),
                metrics_url: metrics_url.to_string(),
            },
            (_, _, Some(dir)) => OutputDestination::Directory(dir.to_string()),
            _ => return Err(ContractViolation::NoOutputDestination),
        };

        Ok(Self {
            x_column: x_column.to_string(),
            y_column: y_column.to_string(),
            fit_intercept,
            owner: get(env::USER_SUB).unwrap_or_default().to_string(),
            job_id: get(env::JOB_ID).unwrap_or_default().to_string(),
            dataset,
            output,
        })
    }

    /// Checks both configured columns are present in the dataset header
    pub fn check_columns(&self, headers: &[&str]) -> Result<(), ContractViolation> {
        for column in [&self.x_column, &self.y_column] {
            if !headers.contains(&column.as_str()) {
                return Err(ContractViolation::ColumnMissing {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Ways the trainer refuses to run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("column not found in dataset: {column}")]
    ColumnMissing { column: String },

    #[error("no output destination provided")]
    NoOutputDestination,
}

impl ContractViolation {
    pub fn exit(&self) -> TrainerExit {
        match self {
            ContractViolation::MissingInput(_) => TrainerExit::MissingInput,
            ContractViolation::ColumnMissing { .. } => TrainerExit::ColumnMissing,
            ContractViolation::NoOutputDestination => TrainerExit::NoOutputDestination,
        }
    }
}

/// Trainer process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerExit {
    Success,
    MissingInput,
    ColumnMissing,
    NoOutputDestination,
}

impl TrainerExit {
    pub fn code(self) -> i32 {
        match self {
            TrainerExit::Success => 0,
            TrainerExit::MissingInput => 2,
            TrainerExit::ColumnMissing => 3,
            TrainerExit::NoOutputDestination => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TrainerExit::Success),
            2 => Some(TrainerExit::MissingInput),
            3 => Some(TrainerExit::ColumnMissing),
            4 => Some(TrainerExit::NoOutputDestination),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TrainerExit::Success => "success",
            TrainerExit::MissingInput => "required input missing",
            TrainerExit::ColumnMissing => "referenced column absent from dataset",
            TrainerExit::NoOutputDestination => "no output destination resolvable",
        }
    }
}

/// Contents of `metrics.json`
///
/// Fields beyond the fixed set are kept in `extra` so nothing the trainer
/// reports is lost. `r2` and `mse` are undefined on tiny datasets, where the
/// trainer writes `NaN`; those come back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub r2: Option<f64>,
    pub mse: Option<f64>,
    pub n_rows: u64,
    pub fit_intercept: bool,
    pub elapsed_sec: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricsReport {
    /// Parses `metrics.json`, accepting the bare `NaN`, `Infinity` and
    /// `-Infinity` tokens Python's `json.dump` emits
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let strict = match serde_json::from_slice(bytes) {
            Ok(report) => return Ok(report),
            Err(e) => e,
        };

        let Ok(text) = std::str::from_utf8(bytes) else {
            return Err(strict);
        };
        match null_non_finite(text) {
            Some(lenient) => serde_json::from_str(&lenient),
            None => Err(strict),
        }
    }
}

/// Replaces non-finite number tokens outside string literals with `null`.
/// Returns `None` when there is nothing to replace.
fn null_non_finite(text: &str) -> Option<String> {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    let mut out = String::with_capacity(text.len());
    let mut replaced = false;
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.into_iter().find(|t| rest.starts_with(*t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            replaced = true;
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    replaced.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_inputs() -> TrainerInputs {
        TrainerInputs {
            x_column: "x".to_string(),
            y_column: "y".to_string(),
            fit_intercept: true,
            owner: "alice".to_string(),
            job_id: "job-1".to_string(),
            dataset: DatasetSource::Path(DATASET_MOUNT_PATH.to_string()),
            output: OutputDestination::Directory(ARTIFACTS_MOUNT_PATH.to_string()),
        }
    }

    fn as_hash_map(vars: BTreeMap<String, String>) -> HashMap<String, String> {
        vars.into_iter().collect()
    }

    #[test]
    fn test_volume_env_has_no_url_slots() {
        let vars = volume_inputs().to_env();
        assert_eq!(vars.get(env::DATASET_PATH).unwrap(), DATASET_MOUNT_PATH);
        assert_eq!(vars.get(env::OUTPUT_DIR).unwrap(), ARTIFACTS_MOUNT_PATH);
        assert_eq!(vars.get(env::FIT_INTERCEPT).unwrap(), "true");
        assert!(!vars.contains_key(env::DATASET_URL));
        assert!(!vars.contains_key(env::OUTPUT_MODEL_URL));
        assert!(!vars.contains_key(env::OUTPUT_METRICS_URL));
    }

    #[test]
    fn test_url_env_has_no_volume_slots() {
        let inputs = TrainerInputs {
            dataset: DatasetSource::Url("https://s3/a.csv".to_string()),
            output: OutputDestination::Urls {
                model_url: "https://s3/model".to_string(),
                metrics_url: "https://s3/metrics".to_string(),
            },
            ..volume_inputs()
        };
        let vars = inputs.to_env();
        assert!(!vars.contains_key(env::DATASET_PATH));
        assert!(!vars.contains_key(env::OUTPUT_DIR));

        let resolved = TrainerInputs::from_env(&as_hash_map(vars)).unwrap();
        assert_eq!(resolved, inputs);
    }

    #[test]
    fn test_missing_column_variable_is_exit_2() {
        let mut vars = as_hash_map(volume_inputs().to_env());
        vars.insert(env::Y_COLUMN.to_string(), String::new());

        let err = TrainerInputs::from_env(&vars).unwrap_err();
        assert_eq!(err, ContractViolation::MissingInput(env::Y_COLUMN));
        assert_eq!(err.exit().code(), 2);
    }

    #[test]
    fn test_missing_dataset_source_is_exit_2() {
        let mut vars = as_hash_map(volume_inputs().to_env());
        vars.remove(env::DATASET_PATH);

        let err = TrainerInputs::from_env(&vars).unwrap_err();
        assert_eq!(err.exit(), TrainerExit::MissingInput);
    }

    #[test]
    fn test_half_url_pair_falls_back_to_directory() {
        let mut vars = as_hash_map(volume_inputs().to_env());
        vars.insert(env::OUTPUT_MODEL_URL.to_string(), "https://s3/model".to_string());

        let resolved = TrainerInputs::from_env(&vars).unwrap();
        assert_eq!(
            resolved.output,
            OutputDestination::Directory(ARTIFACTS_MOUNT_PATH.to_string())
        );

        vars.remove(env::OUTPUT_DIR);
        let err = TrainerInputs::from_env(&vars).unwrap_err();
        assert_eq!(err.exit().code(), 4);
    }

    #[test]
    fn test_dataset_url_wins_over_path() {
        let mut vars = as_hash_map(volume_inputs().to_env());
        vars.insert(env::DATASET_URL.to_string(), "https://s3/a.csv".to_string());

        let resolved = TrainerInputs::from_env(&vars).unwrap();
        assert_eq!(
            resolved.dataset,
            DatasetSource::Url("https://s3/a.csv".to_string())
        );
    }

    #[test]
    fn test_check_columns() {
        let inputs = volume_inputs();
        assert!(inputs.check_columns(&["x", "y", "z"]).is_ok());

        let err = inputs.check_columns(&["x", "z"]).unwrap_err();
        assert_eq!(
            err,
            ContractViolation::ColumnMissing {
                column: "y".to_string()
            }
        );
        assert_eq!(err.exit().code(), 3);
    }

    #[test]
    fn test_exit_codes() {
        for exit in [
            TrainerExit::Success,
            TrainerExit::MissingInput,
            TrainerExit::ColumnMissing,
            TrainerExit::NoOutputDestination,
        ] {
            assert_eq!(TrainerExit::from_code(exit.code()), Some(exit));
        }
        assert_eq!(TrainerExit::from_code(137), None);
    }

    #[test]
    fn test_metrics_parse_keeps_unknown_fields() {
        let raw = br#"{"r2": 0.98, "mse": 0.12, "n_rows": 100, "fit_intercept": true, "elapsed_sec": 1.5, "coef": [2.0]}"#;
        let report = MetricsReport::parse(raw).unwrap();
        assert_eq!(report.n_rows, 100);
        assert!(report.fit_intercept);
        assert!(report.extra.contains_key("coef"));

        let round = serde_json::to_value(&report).unwrap();
        assert_eq!(round["coef"], serde_json::json!([2.0]));
    }

    #[test]
    fn test_metrics_parse_maps_non_finite_to_none() {
        let raw = br#"{"r2": NaN, "mse": 0.0, "n_rows": 1, "fit_intercept": true, "elapsed_sec": 0.01}"#;
        let report = MetricsReport::parse(raw).unwrap();
        assert_eq!(report.r2, None);
        assert_eq!(report.mse, Some(0.0));
        assert_eq!(report.n_rows, 1);

        let raw = br#"{"r2": -Infinity, "mse": Infinity, "n_rows": 2, "fit_intercept": false, "elapsed_sec": 0.1, "note": "NaN stays"}"#;
        let report = MetricsReport::parse(raw).unwrap();
        assert_eq!(report.r2, None);
        assert_eq!(report.mse, None);
        assert_eq!(report.extra["note"], "NaN stays");

        let stored = serde_json::to_value(&report).unwrap();
        assert!(stored["r2"].is_null());
    }

    #[test]
    fn test_metrics_parse_rejects_missing_fields() {
        assert!(MetricsReport::parse(br#"{"r2": 0.5}"#).is_err());
        assert!(MetricsReport::parse(b"not json").is_err());
    }
}
