//! Filesystem side of the gateway: the upload directory written on submit
//! and the generated-output directory scanned for model artifacts.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Extensions listed as generated model artifacts
pub const ARTIFACT_EXTENSIONS: [&str; 3] = ["glb", "obj", "stl"];

/// Directory of uploaded documents, one file per job
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Storage name for a job's upload: `{id}.{ext}`, or `{id}` when the
    /// client name has no usable extension
    pub fn file_name(id: Uuid, original_name: Option<&str>) -> String {
        let extension = original_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

        match extension {
            Some(ext) => format!("{}.{}", id, ext),
            None => id.to_string(),
        }
    }

    /// Write an upload, creating the directory if needed
    pub async fn save(
        &self,
        id: Uuid,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(Self::file_name(id, original_name));
        tokio::fs::write(&path, bytes).await?;

        debug!("Stored upload for job {} at {} ({} bytes)", id, path.display(), bytes.len());
        Ok(path)
    }
}

/// A generated model file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub filename: String,
    pub size: u64,
    /// Creation time in seconds since the Unix epoch
    pub created: f64,
}

fn is_artifact(name: &str) -> bool {
    ARTIFACT_EXTENSIONS
        .iter()
        .any(|ext| name.strip_suffix(ext).is_some_and(|stem| stem.ends_with('.')))
}

fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// List model artifacts in `dir` in directory order
///
/// A missing directory yields an empty list. Entries that are not regular
/// files are skipped.
pub async fn list_artifacts(dir: &Path) -> io::Result<Vec<Artifact>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut artifacts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !is_artifact(&filename) {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        // Birth time is not recorded on every filesystem
        let created = metadata.created().or_else(|_| metadata.modified())?;

        artifacts.push(Artifact {
            filename,
            size: metadata.len(),
            created: epoch_seconds(created),
        });
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_keeps_the_last_extension() {
        let id = Uuid::new_v4();
        assert_eq!(UploadStore::file_name(id, Some("invoice.pdf")), format!("{}.pdf", id));
        assert_eq!(UploadStore::file_name(id, Some("mail.backup.eml")), format!("{}.eml", id));
    }

    #[test]
    fn file_name_without_usable_extension_is_the_id() {
        let id = Uuid::new_v4();
        assert_eq!(UploadStore::file_name(id, Some("README")), id.to_string());
        assert_eq!(UploadStore::file_name(id, Some("trailing.")), id.to_string());
        assert_eq!(UploadStore::file_name(id, Some("x./../../etc")), id.to_string());
        assert_eq!(UploadStore::file_name(id, None), id.to_string());
    }

    #[tokio::test]
    async fn save_creates_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let store = UploadStore::new(root.path().join("nested/uploads"));
        let id = Uuid::new_v4();

        let path = store.save(id, Some("invoice.pdf"), b"%PDF-1.7").await.unwrap();

        assert_eq!(path, store.dir().join(format!("{}.pdf", id)));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn lists_only_model_files_with_their_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chair.glb"), vec![0u8; 12]).unwrap();
        std::fs::write(dir.path().join("table.obj"), b"v 0 0 0\n").unwrap();
        std::fs::write(dir.path().join("part.stl"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignore").unwrap();
        std::fs::write(dir.path().join("archive.glb.zip"), b"ignore").unwrap();
        std::fs::write(dir.path().join("glb"), b"ignore").unwrap();
        std::fs::create_dir(dir.path().join("folder.obj")).unwrap();

        let mut artifacts = list_artifacts(dir.path()).await.unwrap();
        artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));

        let listed: Vec<(&str, u64)> = artifacts
            .iter()
            .map(|a| (a.filename.as_str(), a.size))
            .collect();
        assert_eq!(listed, vec![("chair.glb", 12), ("part.stl", 0), ("table.obj", 8)]);
        assert!(artifacts.iter().all(|a| a.created > 0.0));
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = list_artifacts(&dir.path().join("absent")).await.unwrap();
        assert!(artifacts.is_empty());
    }
}
