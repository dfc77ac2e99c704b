//! Filesystem manifest loader
//!
//! Resolves manifests from a directory laid out as:
//!
//! ```text
//! <root>/channels/<channel>                    # YAML: manifests: [{name, version}]
//! <root>/packages/<package>/<version>/*.yaml   # manifest files
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::reconcilers::{DeclarativeObject, ManifestController};

/// Instances that name a manifest package
pub trait ManifestSource {
    fn package_name(&self) -> String;
    fn channel(&self) -> String;
    /// Pinned version; the channel decides when `None`
    fn version(&self) -> Option<String>;
}

/// Channel file contents
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    manifests: Vec<ChannelEntry>,
}

#[derive(Debug, Deserialize)]
struct ChannelEntry {
    name: String,
    version: String,
}

/// Loads manifest files for an instance from a local directory
pub struct FsManifestLoader<K> {
    base_dir: PathBuf,
    _instance: PhantomData<fn() -> K>,
}

impl<K> FsManifestLoader<K> {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            _instance: PhantomData,
        }
    }

    /// Latest version of a package published on a channel
    pub async fn resolve_version(&self, package: &str, channel: &str) -> anyhow::Result<String> {
        let path = self.base_dir.join("channels").join(channel);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read channel {:?}", path))?;
        let channel_doc: Channel = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid channel file {:?}", path))?;

        channel_doc
            .manifests
            .into_iter()
            .find(|entry| entry.name == package)
            .map(|entry| entry.version)
            .ok_or_else(|| anyhow!("package '{}' not found in channel '{}'", package, channel))
    }

    fn package_dir(&self, package: &str, version: &str) -> anyhow::Result<PathBuf> {
        for part in [package, version] {
            if part.is_empty() || part.contains('/') || part == ".." || part == "." {
                return Err(anyhow!("invalid package path component '{}'", part));
            }
        }
        Ok(self.base_dir.join("packages").join(package).join(version))
    }
}

#[async_trait]
impl<K> ManifestController<K> for FsManifestLoader<K>
where
    K: DeclarativeObject + ManifestSource,
{
    async fn resolve_manifest(&self, instance: &K) -> anyhow::Result<BTreeMap<String, String>> {
        let package = instance.package_name();
        let version = match instance.version() {
            Some(version) => version,
            None => self.resolve_version(&package, &instance.channel()).await?,
        };

        let dir = self.package_dir(&package, &version)?;
        debug!(package = %package, version = %version, dir = ?dir, "Loading manifests");
        read_manifest_dir(&dir).await
    }
}

/// Read every YAML/JSON file directly under `dir`
async fn read_manifest_dir(dir: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read manifest directory {:?}", dir))?;

    let mut manifests = BTreeMap::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_manifest = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "json")
        );
        if !is_manifest || !entry.file_type().await?.is_file() {
            continue;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read manifest {:?}", path))?;
        manifests.insert(path.to_string_lossy().into_owned(), content);
    }

    if manifests.is_empty() {
        return Err(anyhow!("no manifests found in {:?}", dir));
    }
    Ok(manifests)
}
