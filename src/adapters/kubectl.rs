//! `kubectl apply` client
//!
//! Pipes the manifest to `kubectl apply -f -`. Pruning, selectors and
//! whitelists arrive as extra arguments built by the reconciler.

use std::process::Stdio;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::reconcilers::ApplyClient;

/// Apply client backed by the `kubectl` binary
#[derive(Clone, Debug)]
pub struct Kubectl {
    binary: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
        }
    }
}

impl Kubectl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific kubectl binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Full argument list for an apply invocation
    pub fn command_args(namespace: &str, validate: bool, extra_args: &[String]) -> Vec<String> {
        let mut args = vec!["apply".to_string()];
        if !namespace.is_empty() {
            args.push("--namespace".to_string());
            args.push(namespace.to_string());
        }
        if !validate {
            args.push("--validate=false".to_string());
        }
        args.extend(extra_args.iter().cloned());
        args.push("-f".to_string());
        args.push("-".to_string());
        args
    }
}

#[async_trait]
impl ApplyClient for Kubectl {
    async fn apply(
        &self,
        namespace: &str,
        manifest: &str,
        validate: bool,
        extra_args: &[String],
    ) -> anyhow::Result<()> {
        let args = Self::command_args(namespace, validate, extra_args);
        debug!(binary = %self.binary, args = ?args, "Running kubectl");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to execute {}", self.binary))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("kubectl stdin unavailable"))?;
        stdin
            .write_all(manifest.as_bytes())
            .await
            .context("Failed to write manifest to kubectl")?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for kubectl")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("kubectl apply failed: {}", stderr.trim()));
        }

        info!(
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "kubectl apply succeeded"
        );
        Ok(())
    }
}
