//! In-memory filesystem handed to the overlay engine

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Separator placed between documents appended to the same file
const YAML_SEPARATOR: &[u8] = b"\n---\n";

/// A flat map of file paths to contents
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file
    pub fn write_file(&mut self, path: impl AsRef<Path>, data: &[u8]) {
        self.files.insert(path.as_ref().to_path_buf(), data.to_vec());
    }

    /// Append a YAML document to a file, creating it if needed
    pub fn append_document(&mut self, path: impl AsRef<Path>, data: &[u8]) {
        let file = self.files.entry(path.as_ref().to_path_buf()).or_default();
        if !file.is_empty() {
            file.extend_from_slice(YAML_SEPARATOR);
        }
        file.extend_from_slice(data);
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<&[u8]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&Path, &[u8])> {
        self.files.iter().map(|(p, d)| (p.as_path(), d.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copy every file below `dir`, re-rooting absolute paths
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        for (path, data) in &self.files {
            let target = dir.join(relative(path)?);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, data)?;
        }
        Ok(())
    }
}

/// Strip root components and reject paths escaping the root
pub fn relative(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::config(format!(
                    "path {:?} escapes the filesystem root",
                    path
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_document_separates_documents() {
        let mut fs = MemoryFs::new();
        fs.append_document("a.yaml", b"one");
        fs.append_document("a.yaml", b"two");
        assert_eq!(fs.read_file("a.yaml").unwrap(), b"one\n---\ntwo");
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn test_write_to_dir_reroots_absolute_paths() {
        let dir = tempdir().unwrap();
        let mut fs = MemoryFs::new();
        fs.write_file("/manifests/base/a.yaml", b"kind: ConfigMap");

        fs.write_to_dir(dir.path()).unwrap();

        let written = std::fs::read_to_string(dir.path().join("manifests/base/a.yaml")).unwrap();
        assert_eq!(written, "kind: ConfigMap");
    }

    #[test]
    fn test_relative_rejects_parent_dir() {
        assert!(relative(Path::new("../etc/passwd")).is_err());
        assert_eq!(
            relative(Path::new("/a/./b")).unwrap(),
            PathBuf::from("a/b")
        );
    }
}
