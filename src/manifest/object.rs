//! Target objects, blobs and object sets

use std::collections::BTreeMap;
use std::path::Path;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::fs::MemoryFs;

/// Document separator used when rendering several objects into one manifest
pub const DOCUMENT_SEPARATOR: &str = "\n---\n";

/// A single structured resource resolved from a manifest
///
/// The field tree is kept as a [`serde_json::Value`]; identity fields are read
/// from the tree on demand so in-place mutations are always reflected.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    tree: Value,
    origin: Option<String>,
}

impl Object {
    /// Wrap a field tree, checking that it carries a usable identity
    pub fn from_value(tree: Value) -> Result<Self> {
        let map = tree
            .as_object()
            .ok_or_else(|| Error::parse("object must be a mapping"))?;

        for key in ["apiVersion", "kind"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.is_empty() => {}
                Some(other) => {
                    return Err(Error::parse(format!(
                        "field '{}' must be a non-empty string, got {}",
                        key, other
                    )))
                }
                None => return Err(Error::parse(format!("missing field '{}'", key))),
            }
        }

        if let Some(metadata) = map.get("metadata") {
            let metadata = metadata
                .as_object()
                .ok_or_else(|| Error::parse("field 'metadata' must be a mapping"))?;
            for key in ["name", "namespace"] {
                if let Some(value) = metadata.get(key) {
                    if !value.is_string() {
                        return Err(Error::parse(format!(
                            "field 'metadata.{}' must be a string",
                            key
                        )));
                    }
                }
            }
        }

        Ok(Self { tree, origin: None })
    }

    /// Record the manifest path this object was parsed from
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Manifest path this object was parsed from, if known
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn kind(&self) -> &str {
        self.tree["kind"].as_str().unwrap_or_default()
    }

    pub fn api_version(&self) -> &str {
        self.tree["apiVersion"].as_str().unwrap_or_default()
    }

    /// API group; empty for the core group
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn group_version_kind(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group(), self.version(), self.kind())
    }

    pub fn name(&self) -> &str {
        self.tree["metadata"]["name"].as_str().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.tree["metadata"]["namespace"].as_str()
    }

    /// Full field tree
    pub fn as_value(&self) -> &Value {
        &self.tree
    }

    /// Look up a nested field by path
    pub fn nested_field(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.tree, |node, key| node.as_object()?.get(*key))
    }

    /// Write a nested field, creating intermediate mappings as needed
    pub fn set_nested_field(&mut self, path: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::parse("cannot replace the root of an object"));
        };

        let mut node = &mut self.tree;
        for key in parents {
            let map = node.as_object_mut().ok_or_else(|| {
                Error::parse(format!("field '{}' is not a mapping", path.join(".")))
            })?;
            node = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        let map = node.as_object_mut().ok_or_else(|| {
            Error::parse(format!("field '{}' is not a mapping", path.join(".")))
        })?;
        map.insert(last.to_string(), value);
        Ok(())
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.nested_field(&["metadata", "labels"])
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge labels into `metadata.labels`, overwriting existing keys
    pub fn add_labels(&mut self, labels: &BTreeMap<String, String>) -> Result<()> {
        let mut merged = self.labels();
        merged.extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.set_nested_field(&["metadata", "labels"], serde_json::to_value(merged)?)
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.nested_field(&["metadata", "ownerReferences"])
            .cloned()
            .and_then(|refs| serde_json::from_value(refs).ok())
            .unwrap_or_default()
    }

    /// Replace `metadata.ownerReferences`
    pub fn set_owner_references(&mut self, refs: Vec<OwnerReference>) -> Result<()> {
        self.set_nested_field(&["metadata", "ownerReferences"], serde_json::to_value(refs)?)
    }

    /// Render as JSON with stable key order
    pub fn json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.tree)?)
    }
}

/// A document the parser could not interpret as an object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub origin: Option<String>,
}

/// An ordered set of target objects and blobs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Objects {
    /// Target objects, in parse order until sorted
    pub items: Vec<Object>,
    /// Unparsed documents
    pub blobs: Vec<Blob>,
    /// Directory used as the overlay root
    pub path: String,
}

impl Objects {
    /// Reorder items by a priority key. Ties keep their relative order.
    pub fn sort<F>(&mut self, order: F)
    where
        F: Fn(&Object) -> i32,
    {
        self.items.sort_by_key(|o| order(o));
    }

    /// Render every item as JSON, joined into a multi-document manifest
    pub fn json_manifest(&self) -> Result<String> {
        let mut documents = Vec::with_capacity(self.items.len());
        for item in &self.items {
            documents.push(String::from_utf8_lossy(&item.json()?).into_owned());
        }
        Ok(documents.join(DOCUMENT_SEPARATOR))
    }

    /// Tag every item and blob with the manifest path it came from
    pub fn set_origin(&mut self, origin: &str) {
        for item in &mut self.items {
            item.origin = Some(origin.to_string());
        }
        for blob in &mut self.blobs {
            blob.origin = Some(origin.to_string());
        }
    }

    /// Append another set's items and blobs, leaving `path` untouched
    pub fn append(&mut self, other: Objects) {
        self.items.extend(other.items);
        self.blobs.extend(other.blobs);
    }

    /// Write every item (as JSON) and every blob under its originating path
    ///
    /// Documents sharing a path are concatenated. Entries without an origin
    /// land in `manifest.yaml` under the set's path.
    pub fn materialize(&self, fs: &mut MemoryFs) -> Result<()> {
        let fallback = Path::new(&self.path).join("manifest.yaml");
        let fallback = fallback.to_string_lossy();

        for item in &self.items {
            fs.append_document(item.origin().unwrap_or(&*fallback), &item.json()?);
        }
        for blob in &self.blobs {
            fs.append_document(blob.origin.as_deref().unwrap_or(&*fallback), &blob.data);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(name: &str) -> Object {
        Object::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "namespace": "apps" },
            "spec": { "replicas": 1 }
        }))
        .unwrap()
    }

    #[test]
    fn test_identity_accessors() {
        let obj = deployment("web");
        assert_eq!(obj.kind(), "Deployment");
        assert_eq!(obj.group(), "apps");
        assert_eq!(obj.version(), "v1");
        assert_eq!(obj.name(), "web");
        assert_eq!(obj.namespace(), Some("apps"));

        let cm = Object::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
        assert_eq!(cm.group(), "");
        assert_eq!(cm.version(), "v1");
        assert_eq!(cm.name(), "");
        assert_eq!(cm.namespace(), None);
    }

    #[test]
    fn test_from_value_rejects_bad_identity() {
        assert!(Object::from_value(json!({"kind": "ConfigMap"})).is_err());
        assert!(Object::from_value(json!({"apiVersion": "v1", "kind": 3})).is_err());
        assert!(Object::from_value(
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": "oops"})
        )
        .is_err());
    }

    #[test]
    fn test_set_nested_field_creates_parents() {
        let mut obj = Object::from_value(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
        obj.set_nested_field(&["metadata", "annotations", "a"], json!("b"))
            .unwrap();
        assert_eq!(
            obj.nested_field(&["metadata", "annotations", "a"]),
            Some(&json!("b"))
        );

        obj.set_nested_field(&["data"], json!("scalar")).unwrap();
        assert!(obj.set_nested_field(&["data", "key"], json!(1)).is_err());
    }

    #[test]
    fn test_add_labels_merges() {
        let mut obj = deployment("web");
        obj.set_nested_field(&["metadata", "labels"], json!({"team": "a", "app": "old"}))
            .unwrap();

        let labels = BTreeMap::from([("app".to_string(), "web".to_string())]);
        obj.add_labels(&labels).unwrap();

        let result = obj.labels();
        assert_eq!(result.get("app").map(String::as_str), Some("web"));
        assert_eq!(result.get("team").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_json_has_stable_key_order() {
        let a = Object::from_value(json!({"kind": "ConfigMap", "apiVersion": "v1", "data": {"b": "2", "a": "1"}})).unwrap();
        let b = Object::from_value(json!({"data": {"a": "1", "b": "2"}, "apiVersion": "v1", "kind": "ConfigMap"})).unwrap();
        assert_eq!(a.json().unwrap(), b.json().unwrap());
    }

    #[test]
    fn test_json_manifest_joins_documents() {
        let objects = Objects {
            items: vec![deployment("a"), deployment("b")],
            ..Default::default()
        };
        let manifest = objects.json_manifest().unwrap();
        assert_eq!(manifest.matches(DOCUMENT_SEPARATOR).count(), 1);
        assert!(manifest.starts_with('{'));
    }

    #[test]
    fn test_materialize_groups_by_origin() {
        let mut objects = Objects {
            items: vec![
                deployment("a").with_origin("base/a.yaml"),
                deployment("b").with_origin("base/a.yaml"),
            ],
            blobs: vec![Blob {
                data: b"resources:\n- a.yaml".to_vec(),
                origin: Some("base/kustomization.yaml".to_string()),
            }],
            path: "base".to_string(),
        };
        objects.items.push(deployment("c"));

        let mut fs = MemoryFs::new();
        objects.materialize(&mut fs).unwrap();

        let a = String::from_utf8(fs.read_file("base/a.yaml").unwrap().to_vec()).unwrap();
        assert!(a.contains("\"name\":\"a\"") && a.contains("\"name\":\"b\""));
        assert!(fs.read_file("base/kustomization.yaml").is_some());
        assert!(fs.read_file("base/manifest.yaml").is_some());
    }
}
