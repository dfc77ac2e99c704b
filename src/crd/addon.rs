//! Addon Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::adapters::ManifestSource;

/// Desired state of an Addon
///
/// An addon names a manifest package; the operator resolves the package
/// version (directly or through a channel) and keeps its objects applied.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "addons.declarative.dev",
    version = "v1alpha1",
    kind = "Addon",
    plural = "addons",
    singular = "addon",
    shortname = "ad",
    namespaced,
    status = "AddonStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Version", "type": "string", "jsonPath": ".status.version"}"#,
    printcolumn = r#"{"name": "Objects", "type": "integer", "jsonPath": ".status.objectCount"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// Package to deploy; defaults to the resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Release channel used when no version is pinned
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Pinned package version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Suspend reconciliation (useful for maintenance)
    #[serde(default)]
    pub suspend: bool,
}

fn default_channel() -> String {
    "stable".to_string()
}

impl ManifestSource for Addon {
    fn package_name(&self) -> String {
        self.spec
            .package
            .clone()
            .or_else(|| self.metadata.name.clone())
            .unwrap_or_default()
    }

    fn channel(&self) -> String {
        self.spec.channel.clone()
    }

    fn version(&self) -> Option<String> {
        self.spec.version.clone()
    }
}

/// Addon status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// Current phase (Built)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Package version that was last built
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Number of objects in the last built manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_count: Option<u32>,

    /// Objects in the last built manifest, as `Kind/name`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<String>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last time the status changed
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
