//! Document storage rooted at the configured documents directory

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::ServerError;

/// Reads and writes PDFs by name, relative to a root directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a client-supplied name to a path inside the root.
    ///
    /// Absolute paths and any `..`, root or drive-prefix component are
    /// rejected, so a resolved path can never leave the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ServerError> {
        let relative = Path::new(name.trim());
        if relative.as_os_str().is_empty() {
            return Err(ServerError::InvalidRequest("Document name is empty".into()));
        }
        let mut clean = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ServerError::InvalidRequest(format!(
                        "Document name '{}' must be a relative path inside the documents directory",
                        name
                    )));
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(ServerError::InvalidRequest("Document name is empty".into()));
        }
        Ok(self.root.join(clean))
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.resolve(name)?;
        debug!("Reading {}", path.display());
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ServerError::DocumentNotFound(name.to_string()),
            _ => ServerError::Internal(format!("Failed to read '{}': {}", name, e)),
        })
    }

    /// Write `bytes` as `filename` in the directory holding `source`.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place,
    /// so readers never observe a partially written file. Returns the stored
    /// name relative to the root.
    pub async fn write_beside(
        &self,
        source: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, ServerError> {
        let source_path = self.resolve(source)?;
        let target_path = self.resolve(filename)?;
        let target_name = target_path
            .file_name()
            .ok_or_else(|| ServerError::InvalidRequest(format!("Invalid filename '{}'", filename)))?;
        let dir = source_path.parent().unwrap_or(self.root.as_path());
        let target = dir.join(target_name);
        let temp = dir.join(format!(
            ".{}.{}.tmp",
            target_name.to_string_lossy(),
            uuid::Uuid::new_v4()
        ));

        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            return Err(ServerError::Internal(format!(
                "Failed to write {}: {}",
                temp.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(ServerError::Internal(format!(
                "Failed to move {} into place: {}",
                target.display(),
                e
            )));
        }
        info!("Persisted {} ({} bytes)", target.display(), bytes.len());

        let stored = target
            .strip_prefix(&self.root)
            .unwrap_or(&target)
            .to_string_lossy()
            .replace('\\', "/");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_stays_inside_root() {
        let store = DocumentStore::new("/srv/docs");
        assert_eq!(
            store.resolve("plans/site.pdf").unwrap(),
            PathBuf::from("/srv/docs/plans/site.pdf")
        );
        assert_eq!(
            store.resolve("./site.pdf").unwrap(),
            PathBuf::from("/srv/docs/site.pdf")
        );
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = DocumentStore::new("/srv/docs");
        for name in ["../etc/passwd", "plans/../../x.pdf", "/etc/passwd", "", "  ", "."] {
            assert!(
                matches!(store.resolve(name), Err(ServerError::InvalidRequest(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        assert!(matches!(
            store.read("absent.pdf").await,
            Err(ServerError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_beside_places_file_next_to_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("plans")).unwrap();
        let store = DocumentStore::new(dir.path());

        let stored = store
            .write_beside("plans/site.pdf", "annotated_site.pdf", b"%PDF-1.7")
            .await
            .unwrap();

        assert_eq!(stored, "plans/annotated_site.pdf");
        assert_eq!(
            std::fs::read(dir.path().join("plans/annotated_site.pdf")).unwrap(),
            b"%PDF-1.7"
        );
        // No temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("plans"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
