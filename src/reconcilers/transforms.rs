//! Built-in object transformations and label makers

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::{Resource, ResourceExt};

use crate::manifest::Objects;

use super::hooks::DeclarativeObject;
use super::options::ObjectTransform;

/// Stamp every object with the given labels
///
/// The reconciler appends this transform automatically when a label maker is
/// configured, so prune selectors always match what was applied.
pub fn add_labels<K: DeclarativeObject>(labels: BTreeMap<String, String>) -> ObjectTransform<K> {
    Arc::new(move |_: &K, objects: &mut Objects| -> anyhow::Result<()> {
        for item in &mut objects.items {
            item.add_labels(&labels)?;
        }
        Ok(())
    })
}

/// Label identifying the resource instance that produced an object
///
/// The key is `<group>/<lowercase kind>` and the value the instance name, e.g.
/// `addons.declarative.dev/addon: dashboard`. Core group kinds use the bare
/// lowercase kind.
pub fn source_label<K: Resource<DynamicType = ()>>(instance: &K) -> BTreeMap<String, String> {
    let kind = K::kind(&()).to_lowercase();
    let group = K::group(&());
    let key = if group.is_empty() {
        kind
    } else {
        format!("{}/{}", group, kind)
    };
    BTreeMap::from([(key, instance.name_any())])
}
