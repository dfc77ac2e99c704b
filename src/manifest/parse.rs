//! Multi-document manifest parsing

use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::error::{Error, Result};

use super::object::{Blob, Object, Objects};

/// Parse a multi-document manifest into objects and blobs
///
/// Documents that are not YAML mappings carrying both `apiVersion` and `kind`
/// are kept as blobs. A document that looks like an object but has a malformed
/// identity fails the whole parse.
pub fn parse_objects(manifest: &str) -> Result<Objects> {
    let mut objects = Objects::default();

    for (index, document) in split_documents(manifest).into_iter().enumerate() {
        let raw = document.trim();
        if raw.is_empty() {
            continue;
        }

        let value = match serde_yaml::from_str::<YamlValue>(raw) {
            Ok(YamlValue::Null) => continue,
            Ok(value) => value,
            Err(e) => {
                debug!(document = index, error = %e, "Unable to decode document, treating as blob");
                objects.blobs.push(blob(raw));
                continue;
            }
        };

        let looks_like_object = value
            .as_mapping()
            .map(|m| m.contains_key("kind") && m.contains_key("apiVersion"))
            .unwrap_or(false);
        if !looks_like_object {
            debug!(document = index, "Document is not an object, treating as blob");
            objects.blobs.push(blob(raw));
            continue;
        }

        let tree = serde_json::to_value(&value)
            .map_err(|e| Error::parse(format!("document {}: {}", index, e)))?;
        let object = Object::from_value(tree)
            .map_err(|e| Error::parse(format!("document {}: {}", index, e)))?;
        objects.items.push(object);
    }

    Ok(objects)
}

fn blob(raw: &str) -> Blob {
    Blob {
        data: raw.as_bytes().to_vec(),
        origin: None,
    }
}

/// Split on `---` document markers at the start of a line
fn split_documents(manifest: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        let marker = line.trim_end();
        if marker == "---" || marker.starts_with("--- ") {
            documents.push(std::mem::take(&mut current));
            let rest = marker.trim_start_matches("---").trim_start();
            if !rest.is_empty() && !rest.starts_with('#') {
                current.push_str(rest);
                current.push('\n');
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    documents.push(current);

    documents
}
