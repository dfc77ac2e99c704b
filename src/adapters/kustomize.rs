//! Kustomize overlay adapter
//!
//! Materializes the in-memory filesystem into a temporary directory and runs
//! `kustomize build` on the overlay root. The directory is removed when the
//! run finishes.

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::manifest::{relative, MemoryFs};
use crate::reconcilers::OverlayAdapter;

/// Overlay adapter backed by the `kustomize` binary
#[derive(Clone, Debug)]
pub struct KustomizeCli {
    binary: String,
}

impl Default for KustomizeCli {
    fn default() -> Self {
        Self {
            binary: "kustomize".to_string(),
        }
    }
}

impl KustomizeCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OverlayAdapter for KustomizeCli {
    async fn run(&self, fs: &MemoryFs, root: &str) -> anyhow::Result<String> {
        let workdir = tempfile::tempdir().context("Failed to create kustomize workdir")?;
        fs.write_to_dir(workdir.path())
            .context("Failed to write manifests for kustomize")?;

        let root_dir = workdir.path().join(relative(Path::new(root))?);
        if !root_dir.join("kustomization.yaml").exists() {
            return Err(anyhow!(
                "kustomization.yaml not found at overlay root '{}'",
                root
            ));
        }

        info!(root = %root, files = fs.len(), "Running kustomize build");
        let start = Instant::now();

        let output = Command::new(&self.binary)
            .arg("build")
            .arg(&root_dir)
            .current_dir(workdir.path())
            .output()
            .await
            .with_context(|| format!("Failed to execute {} build", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Kustomize build failed: {}", stderr);
            return Err(anyhow!("Kustomize build failed: {}", stderr.trim()));
        }

        debug!(duration_ms = start.elapsed().as_millis() as u64, "Kustomize build succeeded");
        String::from_utf8(output.stdout).context("Failed to decode kustomize output as UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_kustomization_is_an_error() {
        let mut fs = MemoryFs::new();
        fs.write_file("base/deployment.yaml", b"{}");

        let result = KustomizeCli::new().run(&fs, "base").await;

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("kustomization.yaml not found"));
    }
}
