//! Shared storage layout
//!
//! Volume-mode jobs read their dataset from, and write their artifacts to,
//! sub-paths of one storage root that is also mounted into the cluster as a
//! persistent volume claim. Paths are compared lexically after
//! normalization. A dataset that already exists is also checked after
//! resolving symlinks, since the podman backend bind-mounts the host path.

use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

const ARTIFACTS_DIR: &str = "artifacts";
const MAX_OWNER_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Resolves `root` to a normalized absolute path
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = normalize(&std::path::absolute(root)?);
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of `dataset` relative to the root
    ///
    /// The dataset must resolve to a location strictly inside the root; the
    /// root itself, siblings sharing its name prefix and `..` escapes are all
    /// rejected. Symlinks under the root must not lead outside it.
    pub fn dataset_sub_path(&self, dataset: &str) -> Result<String, String> {
        let absolute = std::path::absolute(dataset)
            .map_err(|e| format!("Invalid dataset path: {}", e))?;
        let normalized = normalize(&absolute);

        let relative = normalized
            .strip_prefix(&self.root)
            .map_err(|_| "Dataset path is outside the storage root".to_string())?;

        if relative.as_os_str().is_empty() {
            return Err("Dataset path is outside the storage root".to_string());
        }

        self.check_resolved(&normalized)?;

        relative
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| "Dataset path is not valid UTF-8".to_string())
    }

    /// Follows symlinks of an existing dataset and requires the target to be
    /// inside the root as well. A dataset that does not exist yet passes.
    fn check_resolved(&self, dataset: &Path) -> Result<(), String> {
        let resolved = match std::fs::canonicalize(dataset) {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(format!("Invalid dataset path: {}", e)),
        };
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());

        match resolved.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => Ok(()),
            _ => Err("Dataset path resolves outside the storage root".to_string()),
        }
    }

    /// `artifacts/{owner}/{job_id}`, relative to the root
    pub fn artifacts_sub_path(&self, owner: &str, job_id: Uuid) -> String {
        format!("{}/{}/{}", ARTIFACTS_DIR, owner, job_id)
    }

    /// Absolute artifacts directory of a job
    pub fn artifacts_dir(&self, owner: &str, job_id: Uuid) -> PathBuf {
        self.root.join(self.artifacts_sub_path(owner, job_id))
    }
}

/// Checks an owner id can be used as a single storage path segment
pub fn validate_owner(owner: &str) -> Result<(), String> {
    if owner.is_empty() {
        return Err("Owner cannot be empty".to_string());
    }

    if owner.len() > MAX_OWNER_LEN {
        return Err(format!(
            "Owner cannot exceed {} characters",
            MAX_OWNER_LEN
        ));
    }

    if owner == "." || owner == ".." {
        return Err("Owner cannot be a relative path component".to_string());
    }

    if owner
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return Err("Owner contains invalid characters".to_string());
    }

    Ok(())
}

/// Resolves `.` and `..` without following symlinks
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                normalized.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // Never climbs above the filesystem root
                if normalized.parent().is_some() {
                    normalized.pop();
                }
            }
        }
    }

    normalized
}
