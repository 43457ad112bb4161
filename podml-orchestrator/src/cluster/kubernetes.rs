//! Kubernetes backend
//!
//! Runs each training workload as a `batch/v1` Job, talking to the API server
//! over plain HTTPS with the pod's service account token.

use anyhow::Context;
use async_trait::async_trait;
use podml_core::contract::{ARTIFACTS_MOUNT_PATH, DATASET_MOUNT_PATH};
use podml_core::domain::phase::Phase;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{ClusterError, WorkloadClient, WorkloadSpec};
use crate::config::Settings;

const VOLUME_NAME: &str = "podml-data";
const APP_LABEL: &str = "podml";
/// Finished Jobs are deleted by the cluster after this many seconds
pub const TTL_SECONDS_AFTER_FINISHED: u64 = 600;

pub struct KubernetesClient {
    client: Client,
    api_url: String,
    namespace: String,
    token: Option<String>,
}

impl KubernetesClient {
    pub fn new(
        client: Client,
        api_url: impl Into<String>,
        namespace: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        let api_url = api_url.into();
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token,
        }
    }

    /// Builds a client from the in-cluster service account files
    ///
    /// Missing token or CA files are tolerated so the client can also talk to
    /// a local `kubectl proxy`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut builder = Client::builder().timeout(settings.cluster_timeout);

        if settings.k8s_ca_path.exists() {
            let pem = std::fs::read(&settings.k8s_ca_path).with_context(|| {
                format!("Failed to read CA bundle {}", settings.k8s_ca_path.display())
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).context("Invalid cluster CA bundle")?;
            builder = builder.add_root_certificate(cert);
        }

        let token = match std::fs::read_to_string(&settings.k8s_token_path) {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                info!(
                    "No service account token at {} ({}), using unauthenticated requests",
                    settings.k8s_token_path.display(),
                    e
                );
                None
            }
        };

        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self::new(
            client,
            settings.k8s_api_url.clone(),
            settings.namespace.clone(),
            token,
        ))
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.api_url, self.namespace
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl WorkloadClient for KubernetesClient {
    async fn submit(&self, spec: &WorkloadSpec) -> Result<String, ClusterError> {
        let manifest = job_manifest(spec);

        let response = self
            .authorized(self.client.post(self.jobs_url()))
            .json(&manifest)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();

        if status == StatusCode::CONFLICT {
            info!("Job {} already exists, treating submit as done", spec.name);
            return Ok(spec.name.clone());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &spec.name, &body));
        }

        let created: Value = response
            .json()
            .await
            .map_err(|e| ClusterError::Transient(format!("unreadable create response: {}", e)))?;

        let name = created["metadata"]["name"]
            .as_str()
            .unwrap_or(&spec.name)
            .to_string();

        info!("Created Kubernetes job {} in {}", name, self.namespace);
        Ok(name)
    }

    async fn get_phase(&self, handle: &str) -> Result<Phase, ClusterError> {
        let url = format!("{}/{}/status", self.jobs_url(), handle);

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, handle, &body));
        }

        let job: Value = response
            .json()
            .await
            .map_err(|e| ClusterError::Transient(format!("unreadable status response: {}", e)))?;

        let phase = phase_from_job(&job);
        debug!("Job {} phase: {:?}", handle, phase);
        Ok(phase)
    }
}

/// Renders the `batch/v1` Job manifest for a workload
pub fn job_manifest(spec: &WorkloadSpec) -> Value {
    let env: Vec<Value> = spec
        .env
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();

    let mut container = json!({
        "name": "trainer",
        "image": spec.image,
        "imagePullPolicy": "IfNotPresent",
        "env": env,
        "resources": {
            "requests": {
                "cpu": spec.resources.cpu_request,
                "memory": spec.resources.mem_request,
            },
            "limits": {
                "cpu": spec.resources.cpu_limit,
                "memory": spec.resources.mem_limit,
            },
        },
    });

    let mut pod_spec = json!({
        "restartPolicy": "Never",
        "containers": [],
        "securityContext": { "runAsNonRoot": true },
    });

    if let Some(volume) = &spec.volume {
        container["volumeMounts"] = json!([
            {
                "name": VOLUME_NAME,
                "mountPath": DATASET_MOUNT_PATH,
                "subPath": volume.dataset_sub_path,
                "readOnly": true,
            },
            {
                "name": VOLUME_NAME,
                "mountPath": ARTIFACTS_MOUNT_PATH,
                "subPath": volume.artifacts_sub_path,
                "readOnly": false,
            },
        ]);
        pod_spec["volumes"] = json!([
            {
                "name": VOLUME_NAME,
                "persistentVolumeClaim": { "claimName": volume.claim_name },
            },
        ]);
    }

    pod_spec["containers"] = json!([container]);

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": spec.name,
            "labels": { "app": APP_LABEL },
        },
        "spec": {
            "backoffLimit": 0,
            "ttlSecondsAfterFinished": TTL_SECONDS_AFTER_FINISHED,
            "template": {
                "metadata": {
                    "labels": { "app": APP_LABEL, "job": spec.name },
                },
                "spec": pod_spec,
            },
        },
    })
}

/// Extracts the phase facts from a Job object's `status`
pub fn phase_from_job(job: &Value) -> Phase {
    let status = &job["status"];

    let has_failure_condition = status["conditions"]
        .as_array()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c["type"] == "Failed" && c["status"] == "True")
        })
        .unwrap_or(false);

    let count = |field: &str| {
        status[field]
            .as_u64()
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0)
    };

    Phase {
        has_failure_condition,
        succeeded_count: count("succeeded"),
        active_count: count("active"),
    }
}

fn request_error(err: reqwest::Error) -> ClusterError {
    if err.is_timeout() {
        ClusterError::Transient(format!("request timed out: {}", err))
    } else {
        ClusterError::Transient(format!("request failed: {}", err))
    }
}

fn classify(status: StatusCode, name: &str, body: &str) -> ClusterError {
    debug!("Kubernetes API returned {} for {}: {}", status, name, body);

    if status == StatusCode::NOT_FOUND {
        ClusterError::NotFound(name.to_string())
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ClusterError::Transient(format!("API server returned {}", status))
    } else {
        ClusterError::Rejected(format!("API server returned {}", status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::VolumePlan;
    use podml_core::domain::resources::ResourceQuartet;
    use std::collections::BTreeMap;

    fn spec(volume: Option<VolumePlan>) -> WorkloadSpec {
        WorkloadSpec {
            name: "train-3fa85f64".to_string(),
            image: "podml-trainer:latest".to_string(),
            env: BTreeMap::from([
                ("X_COLUMN".to_string(), "x".to_string()),
                ("Y_COLUMN".to_string(), "y".to_string()),
            ]),
            resources: ResourceQuartet::default(),
            volume,
        }
    }

    #[test]
    fn test_manifest_without_volume() {
        let manifest = job_manifest(&spec(None));

        assert_eq!(manifest["kind"], "Job");
        assert_eq!(manifest["metadata"]["name"], "train-3fa85f64");
        assert_eq!(manifest["spec"]["backoffLimit"], 0);

        let pod = &manifest["spec"]["template"]["spec"];
        assert_eq!(pod["restartPolicy"], "Never");
        assert!(pod.get("volumes").is_none());

        let container = &pod["containers"][0];
        assert_eq!(container["image"], "podml-trainer:latest");
        assert_eq!(container["resources"]["requests"]["cpu"], "100m");
        assert_eq!(container["resources"]["limits"]["memory"], "1Gi");
        assert_eq!(container["env"][0], json!({ "name": "X_COLUMN", "value": "x" }));
        assert!(container.get("volumeMounts").is_none());
    }

    #[test]
    fn test_manifest_with_volume_mounts_sub_paths() {
        let manifest = job_manifest(&spec(Some(VolumePlan {
            claim_name: "podml-pvc".to_string(),
            dataset_sub_path: "uploads/alice/a.csv".to_string(),
            artifacts_sub_path: "artifacts/alice/job-1".to_string(),
        })));

        let pod = &manifest["spec"]["template"]["spec"];
        assert_eq!(
            pod["volumes"][0]["persistentVolumeClaim"]["claimName"],
            "podml-pvc"
        );

        let mounts = &pod["containers"][0]["volumeMounts"];
        assert_eq!(mounts[0]["mountPath"], DATASET_MOUNT_PATH);
        assert_eq!(mounts[0]["subPath"], "uploads/alice/a.csv");
        assert_eq!(mounts[0]["readOnly"], true);
        assert_eq!(mounts[1]["mountPath"], ARTIFACTS_MOUNT_PATH);
        assert_eq!(mounts[1]["subPath"], "artifacts/alice/job-1");
        assert_eq!(mounts[1]["readOnly"], false);
    }

    #[test]
    fn test_phase_from_job_status() {
        let job = json!({
            "status": {
                "conditions": [
                    { "type": "Complete", "status": "True" },
                    { "type": "Failed", "status": "True" }
                ],
                "succeeded": 1
            }
        });
        let phase = phase_from_job(&job);
        assert!(phase.has_failure_condition);
        assert_eq!(phase.succeeded_count, 1);
        assert_eq!(phase.active_count, 0);
    }

    #[test]
    fn test_phase_ignores_false_failure_condition() {
        let job = json!({
            "status": {
                "conditions": [{ "type": "Failed", "status": "False" }],
                "active": 1
            }
        });
        let phase = phase_from_job(&job);
        assert!(!phase.has_failure_condition);
        assert_eq!(phase.active_count, 1);
    }

    #[test]
    fn test_phase_of_fresh_job_is_empty() {
        assert_eq!(phase_from_job(&json!({ "status": {} })), Phase::default());
        assert_eq!(phase_from_job(&json!({})), Phase::default());
    }

    #[test]
    fn test_classify_status_codes() {
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "train-1", ""),
            ClusterError::NotFound(_)
        ));
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, "train-1", "").is_transient());
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, "train-1", "").is_transient());
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, "train-1", ""),
            ClusterError::Rejected(_)
        ));
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = KubernetesClient::new(Client::new(), "https://k8s.local/", "ml", None);
        assert_eq!(
            client.jobs_url(),
            "https://k8s.local/apis/batch/v1/namespaces/ml/jobs"
        );
    }
}
