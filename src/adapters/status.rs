//! Addon status hook
//!
//! Vetoes passes for suspended addons and records what the last pass built.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::{
    api::{Patch, PatchParams},
    Api, Client, ResourceExt,
};
use serde_json::json;
use tracing::{debug, info};

use crate::crd::{Addon, AddonStatus, Condition};
use crate::manifest::Objects;
use crate::reconcilers::Status;

/// Field manager used for status patches
const FIELD_MANAGER: &str = "declarative-reconciler";

/// Status hook writing [`crate::crd::AddonStatus`]
#[derive(Clone)]
pub struct AddonStatusWriter {
    client: Client,
}

impl AddonStatusWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Condition type reported after a successful build
pub const BUILT_CONDITION: &str = "ManifestBuilt";

/// Status describing a built object set
///
/// Contains no per-pass data: the condition keeps its previous transition time
/// unless its status flips, so an unchanged addon yields an unchanged status.
pub fn desired_status(addon: &Addon, objects: &Objects, now: DateTime<Utc>) -> AddonStatus {
    let components: Vec<String> = objects
        .items
        .iter()
        .map(|o| format!("{}/{}", o.kind(), o.name()))
        .collect();

    let previous = addon
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.type_ == BUILT_CONDITION))
        .filter(|c| c.status == "True");

    AddonStatus {
        phase: Some("Built".to_string()),
        message: Some(format!("Built {} objects", components.len())),
        version: addon.spec.version.clone(),
        object_count: Some(components.len() as u32),
        objects: components,
        observed_generation: addon.metadata.generation,
        conditions: vec![Condition {
            type_: BUILT_CONDITION.to_string(),
            status: "True".to_string(),
            last_transition_time: previous.map(|c| c.last_transition_time).unwrap_or(now),
            reason: Some("ObjectsBuilt".to_string()),
            message: Some("Manifest was built and submitted for apply".to_string()),
        }],
    }
}

/// Merge patch for the addon status, `None` when nothing changed
pub fn status_patch(addon: &Addon, objects: &Objects) -> Option<serde_json::Value> {
    let status = desired_status(addon, objects, Utc::now());
    if addon.status.as_ref() == Some(&status) {
        return None;
    }
    Some(json!({ "status": status }))
}

#[async_trait]
impl Status<Addon> for AddonStatusWriter {
    async fn preflight(&self, addon: &Addon) -> anyhow::Result<()> {
        if addon.spec.suspend {
            info!(name = %addon.name_any(), "Addon is suspended, skipping");
            anyhow::bail!("addon {} is suspended", addon.name_any());
        }
        Ok(())
    }

    async fn reconciled(&self, addon: &Addon, objects: &Objects) -> anyhow::Result<()> {
        let name = addon.name_any();
        let namespace = addon.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Addon> = Api::namespaced(self.client.clone(), &namespace);

        let Some(status) = status_patch(addon, objects) else {
            debug!(name = %name, "Addon status unchanged");
            return Ok(());
        };
        api.patch_status(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(status))
            .await?;

        debug!(name = %name, objects = objects.items.len(), "Updated addon status");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::crd::AddonSpec;
    use crate::manifest::parse_objects;

    fn addon() -> Addon {
        Addon {
            metadata: ObjectMeta {
                name: Some("dashboard".to_string()),
                generation: Some(3),
                ..Default::default()
            },
            spec: AddonSpec {
                package: None,
                channel: "stable".to_string(),
                version: Some("1.0.0".to_string()),
                suspend: false,
            },
            status: None,
        }
    }

    fn objects() -> Objects {
        parse_objects(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: dash\n---\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n",
        )
        .unwrap()
    }

    #[test]
    fn test_status_lists_built_objects() {
        let patch = status_patch(&addon(), &objects()).unwrap();

        assert_eq!(patch["status"]["phase"], "Built");
        assert_eq!(patch["status"]["objectCount"], 2);
        assert_eq!(patch["status"]["objects"][1], "Deployment/web");
        assert_eq!(patch["status"]["observedGeneration"], 3);
        assert_eq!(patch["status"]["version"], "1.0.0");
        assert_eq!(patch["status"]["conditions"][0]["type"], BUILT_CONDITION);
    }

    #[test]
    fn test_unchanged_addon_is_not_patched_again() {
        let mut addon = addon();
        let first = status_patch(&addon, &objects()).unwrap();

        // What the API server hands back on the next watch event
        addon.status = Some(serde_json::from_value(first["status"].clone()).unwrap());

        let later = Utc::now() + chrono::Duration::minutes(5);
        let again = desired_status(&addon, &objects(), later);
        assert_eq!(serde_json::to_value(&again).unwrap(), first["status"]);
        assert!(status_patch(&addon, &objects()).is_none());
    }

    #[test]
    fn test_changed_objects_are_patched() {
        let mut addon = addon();
        let first = status_patch(&addon, &objects()).unwrap();
        addon.status = Some(serde_json::from_value(first["status"].clone()).unwrap());

        let fewer = parse_objects("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: dash\n").unwrap();
        let patch = status_patch(&addon, &fewer).unwrap();

        assert_eq!(patch["status"]["objectCount"], 1);
        assert_eq!(
            patch["status"]["conditions"][0]["lastTransitionTime"],
            first["status"]["conditions"][0]["lastTransitionTime"]
        );
    }
}
