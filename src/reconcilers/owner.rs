//! Owner reference injection
//!
//! Every eligible target object gets a single controller owner reference so
//! the cluster's garbage collector removes it together with its owner.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::manifest::{Object, Objects};
use crate::metrics;

use super::hooks::DeclarativeObject;
use super::options::OwnerFn;

/// Kinds that are cluster scoped and cannot carry a namespaced owner
const OWNER_EXEMPT_KINDS: &[&str] = &["ClusterRole", "ClusterRoleBinding"];

/// Groups of overlay configuration files; these never reach the cluster and
/// their schemas reject `ownerReferences`
const OWNER_EXEMPT_GROUPS: &[&str] = &["kustomize.config.k8s.io"];

/// Kind registry used to resolve an owner's group/version/kind
#[derive(Clone, Debug, Default)]
pub struct Scheme {
    kinds: HashMap<String, GroupVersionKind>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed resource
    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.kinds.insert(gvk.kind.clone(), gvk);
        self
    }

    pub fn register_gvk(mut self, gvk: GroupVersionKind) -> Self {
        self.kinds.insert(gvk.kind.clone(), gvk);
        self
    }

    /// Resolve the group/version/kind of an owner
    ///
    /// The owner's own `apiVersion`/`kind` win; an owner carrying only a kind
    /// falls back to the registered entry for that kind.
    pub fn gvk_for(&self, owner: &DynamicObject) -> Option<GroupVersionKind> {
        let types = owner.types.as_ref()?;
        if types.kind.is_empty() {
            return None;
        }
        if types.api_version.is_empty() {
            return self.kinds.get(&types.kind).cloned();
        }

        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        Some(GroupVersionKind::gvk(group, version, &types.kind))
    }
}

/// Build an owner candidate from a typed resource
pub fn owner_for<K: Resource<DynamicType = ()>>(resource: &K) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        }),
        metadata: resource.meta().clone(),
        data: serde_json::Value::Object(Default::default()),
    }
}

/// Owner function naming the resource instance itself as owner of every object
pub fn source_as_owner<K: DeclarativeObject>() -> OwnerFn<K> {
    Arc::new(
        |instance: &K, _: &Object, _: &Objects| -> anyhow::Result<Option<DynamicObject>> {
            Ok(Some(owner_for(instance)))
        },
    )
}

/// Attach owner references to every eligible object in the set
///
/// Per-object problems (no owner, missing name or UID, unresolvable type) skip
/// that object; an error from the owner function aborts the whole pass.
pub fn inject_owner_refs<K: DeclarativeObject>(
    owner_fn: Option<&OwnerFn<K>>,
    scheme: &Scheme,
    instance: &K,
    objects: &mut Objects,
) -> Result<()> {
    let Some(owner_fn) = owner_fn else {
        return Ok(());
    };

    info!(
        name = %instance.name_any(),
        namespace = %instance.namespace().unwrap_or_default(),
        "Injecting owner references"
    );

    for index in 0..objects.items.len() {
        let object = &objects.items[index];
        let object_id = format!("{}/{}", object.kind(), object.name());

        if OWNER_EXEMPT_KINDS.contains(&object.kind())
            || OWNER_EXEMPT_GROUPS.contains(&object.group())
        {
            continue;
        }

        let owner = owner_fn(instance, object, objects).map_err(|e| {
            error!(object = %object_id, error = %e, "Resolving owner reference");
            Error::OwnerResolution(e)
        })?;

        let Some(owner) = owner else {
            info!(object = %object_id, "No owner resolved");
            skipped("no_owner");
            continue;
        };

        let name = owner.metadata.name.clone().unwrap_or_default();
        if name.is_empty() {
            info!(object = %object_id, "Owner has no name");
            skipped("no_name");
            continue;
        }

        let uid = owner.metadata.uid.clone().unwrap_or_default();
        if uid.is_empty() {
            info!(object = %object_id, "Owner has no UID");
            skipped("no_uid");
            continue;
        }

        let gvk = match scheme.gvk_for(&owner) {
            Some(gvk) if !gvk.group.is_empty() && !gvk.version.is_empty() => gvk,
            other => {
                info!(object = %object_id, gvk = ?other, "Owner GroupVersionKind is not valid");
                skipped("invalid_gvk");
                continue;
            }
        };

        // TODO: skip when the owner is namespaced and the object is not, or when
        // they live in different namespaces; both are rejected by the API server.
        let owner_ref = OwnerReference {
            api_version: format!("{}/{}", gvk.group, gvk.version),
            kind: gvk.kind,
            name,
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        debug!(object = %object_id, owner = %owner_ref.name, "Setting owner reference");
        objects.items[index].set_owner_references(vec![owner_ref])?;
    }

    Ok(())
}

fn skipped(reason: &str) {
    metrics::OWNER_REFS_SKIPPED.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn instance() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("source".to_string()),
                namespace: Some("demo".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn objects(kinds: &[(&str, &str)]) -> Objects {
        Objects {
            items: kinds
                .iter()
                .map(|(api_version, kind)| {
                    Object::from_value(json!({
                        "apiVersion": api_version,
                        "kind": kind,
                        "metadata": { "name": "x", "namespace": "demo" }
                    }))
                    .unwrap()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn owner(api_version: &str, kind: &str, name: &str, uid: &str) -> DynamicObject {
        let mut owner = DynamicObject {
            types: Some(TypeMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            }),
            metadata: ObjectMeta::default(),
            data: json!({}),
        };
        if !name.is_empty() {
            owner.metadata.name = Some(name.to_string());
        }
        if !uid.is_empty() {
            owner.metadata.uid = Some(uid.to_string());
        }
        owner
    }

    fn fixed(owner: Option<DynamicObject>) -> OwnerFn<ConfigMap> {
        Arc::new(
            move |_: &ConfigMap, _: &Object, _: &Objects| -> anyhow::Result<Option<DynamicObject>> {
                Ok(owner.clone())
            },
        )
    }

    #[test]
    fn test_sets_single_controller_reference() {
        let mut set = objects(&[("apps/v1", "Deployment")]);
        set.items[0]
            .set_owner_references(vec![OwnerReference {
                api_version: "v1".to_string(),
                kind: "Stale".to_string(),
                name: "old".to_string(),
                uid: "old".to_string(),
                ..Default::default()
            }])
            .unwrap();

        let f = fixed(Some(owner("addons.example.com/v1", "Addon", "a", "u1")));
        inject_owner_refs(Some(&f), &Scheme::new(), &instance(), &mut set).unwrap();

        let refs = set.items[0].owner_references();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].api_version, "addons.example.com/v1");
        assert_eq!(refs[0].kind, "Addon");
        assert_eq!(refs[0].name, "a");
        assert_eq!(refs[0].uid, "u1");
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn test_cluster_scoped_rbac_is_exempt() {
        let mut set = objects(&[
            ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding"),
            ("rbac.authorization.k8s.io/v1", "ClusterRole"),
        ]);
        let before = set.clone();

        let f = fixed(Some(owner("addons.example.com/v1", "Addon", "a", "u1")));
        inject_owner_refs(Some(&f), &Scheme::new(), &instance(), &mut set).unwrap();

        assert_eq!(set, before);
    }

    #[test]
    fn test_kustomization_files_are_exempt() {
        let mut set = objects(&[
            ("kustomize.config.k8s.io/v1beta1", "Kustomization"),
            ("kustomize.config.k8s.io/v1alpha1", "Component"),
            ("apps/v1", "Deployment"),
        ]);

        let f = fixed(Some(owner("addons.example.com/v1", "Addon", "a", "u1")));
        inject_owner_refs(Some(&f), &Scheme::new(), &instance(), &mut set).unwrap();

        assert!(set.items[0].owner_references().is_empty());
        assert!(set.items[0].nested_field(&["metadata", "ownerReferences"]).is_none());
        assert!(set.items[1].owner_references().is_empty());
        assert_eq!(set.items[2].owner_references().len(), 1);
    }

    #[test]
    fn test_invalid_owners_leave_metadata_unchanged() {
        let cases = vec![
            None,
            Some(owner("addons.example.com/v1", "Addon", "", "u1")),
            Some(owner("addons.example.com/v1", "Addon", "a", "")),
            // core group owners cannot be resolved to a full group/version
            Some(owner("v1", "ConfigMap", "a", "u1")),
            // kind only, not registered
            Some(owner("", "Addon", "a", "u1")),
        ];

        for case in cases {
            let mut set = objects(&[("apps/v1", "Deployment")]);
            let before = set.clone();
            let f = fixed(case.clone());
            inject_owner_refs(Some(&f), &Scheme::new(), &instance(), &mut set).unwrap();
            assert_eq!(set, before, "owner {:?} should be skipped", case);
        }
    }

    #[test]
    fn test_kind_only_owner_resolved_through_scheme() {
        let scheme = Scheme::new().register_gvk(GroupVersionKind::gvk(
            "addons.example.com",
            "v1",
            "Addon",
        ));
        let mut set = objects(&[("apps/v1", "Deployment")]);
        let f = fixed(Some(owner("", "Addon", "a", "u1")));

        inject_owner_refs(Some(&f), &scheme, &instance(), &mut set).unwrap();

        assert_eq!(
            set.items[0].owner_references()[0].api_version,
            "addons.example.com/v1"
        );
    }

    #[test]
    fn test_owner_fn_error_aborts() {
        let mut set = objects(&[("apps/v1", "Deployment")]);
        let f: OwnerFn<ConfigMap> = Arc::new(
            |_: &ConfigMap, _: &Object, _: &Objects| -> anyhow::Result<Option<DynamicObject>> {
                Err(anyhow::anyhow!("lookup failed"))
            },
        );

        let result = inject_owner_refs(Some(&f), &Scheme::new(), &instance(), &mut set);

        assert!(matches!(result, Err(Error::OwnerResolution(_))));
    }

    #[test]
    fn test_no_owner_fn_is_noop() {
        let mut set = objects(&[("apps/v1", "Deployment")]);
        let before = set.clone();
        inject_owner_refs::<ConfigMap>(None, &Scheme::new(), &instance(), &mut set).unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn test_owner_for_typed_resource() {
        let owner = owner_for(&instance());
        let gvk = Scheme::new().gvk_for(&owner).unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
        assert_eq!(owner.metadata.uid.as_deref(), Some("uid-1"));
    }
}
