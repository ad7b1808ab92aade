//! Artifact store implementation.
//!
//! All sessions share one directory. Safety relies on generated names
//! (`<uuid>_...`) rather than locking.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vdub_models::{ArtifactKind, ArtifactRef};

use crate::error::{StorageError, StorageResult};
use crate::sanitize::{is_valid_artifact_name, secure_filename};

/// Configuration for the artifact store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Content directory
    pub root: PathBuf,
    /// URL prefix artifacts are served under
    pub public_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("static/uploads"),
            public_prefix: "/static/uploads".to_string(),
        }
    }
}

/// Content directory holding every uploaded and generated artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    public_prefix: String,
}

impl ArtifactStore {
    /// Open the store, creating its directory if needed.
    pub async fn open(config: StoreConfig) -> StorageResult<Self> {
        fs::create_dir_all(&config.root).await.map_err(|e| {
            StorageError::config_error(format!(
                "cannot create upload directory {}: {}",
                config.root.display(),
                e
            ))
        })?;
        let root = fs::canonicalize(&config.root).await?;
        info!("Artifact store at {}", root.display());

        Ok(Self {
            root,
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL for an artifact name.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.public_prefix, name)
    }

    /// Reserve a reference for an uploaded file. Nothing is written yet.
    pub fn allocate_upload(&self, original_filename: &str) -> StorageResult<ArtifactRef> {
        let safe = secure_filename(original_filename);
        if safe.is_empty() {
            return Err(StorageError::invalid_name(original_filename));
        }
        self.allocate_named(
            ArtifactKind::SourceVideo,
            format!("{}_{}", Uuid::new_v4(), safe),
        )
    }

    /// Reserve a reference for a generated file of the given kind.
    pub fn allocate(&self, kind: ArtifactKind, extension: &str) -> StorageResult<ArtifactRef> {
        let extension = extension.trim_start_matches('.');
        let name = match kind {
            ArtifactKind::MergedVideo => format!("{}_merged.{}", Uuid::new_v4(), extension),
            _ => format!("{}.{}", Uuid::new_v4(), extension),
        };
        self.allocate_named(kind, name)
    }

    fn allocate_named(&self, kind: ArtifactKind, name: String) -> StorageResult<ArtifactRef> {
        if !is_valid_artifact_name(&name) {
            return Err(StorageError::invalid_name(name));
        }
        let path = self.root.join(&name);
        let url = self.public_url(&name);
        Ok(ArtifactRef::new(kind, name, path, url))
    }

    /// Stream bytes into an allocated artifact.
    ///
    /// Data goes to a `.part` sibling first and is renamed into place only
    /// after the stream ends cleanly, so a failed upload leaves no file.
    pub async fn write_stream<S, B, E>(&self, artifact: &ArtifactRef, mut stream: S) -> StorageResult<u64>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.ensure_inside(artifact.path())?;
        let part = partial_path(artifact.path());

        let result: StorageResult<u64> = async {
            let mut file = fs::File::create(&part).await?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| StorageError::write_failed(e.to_string()))?;
                let bytes = chunk.as_ref();
                file.write_all(bytes).await?;
                written += bytes.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok(written)
        }
        .await;

        match result {
            Ok(written) => {
                fs::rename(&part, artifact.path()).await?;
                debug!("Stored {} ({} bytes)", artifact.name, written);
                Ok(written)
            }
            Err(e) => {
                remove_quietly(&part).await;
                Err(e)
            }
        }
    }

    /// Write a complete buffer into an allocated artifact.
    pub async fn write_bytes(&self, artifact: &ArtifactRef, data: &[u8]) -> StorageResult<u64> {
        let chunks = futures_util::stream::iter([Ok::<_, std::io::Error>(data)]);
        self.write_stream(artifact, chunks).await
    }

    /// Delete an artifact. Returns `false` if it was already gone.
    pub async fn delete(&self, artifact: &ArtifactRef) -> StorageResult<bool> {
        self.ensure_inside(artifact.path())?;
        match fs::remove_file(artifact.path()).await {
            Ok(()) => {
                debug!("Deleted artifact {}", artifact.name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", artifact.name, e))),
        }
    }

    /// Create a scoped transient directory inside the store.
    pub fn work_dir(&self, prefix: &str) -> StorageResult<WorkDir> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.root)?;
        debug!("Created work dir {}", dir.path().display());
        Ok(WorkDir { dir })
    }

    /// Confirm the content directory accepts writes.
    pub async fn check_writable(&self) -> StorageResult<()> {
        let probe = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        fs::write(&probe, b"ok").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }

    fn ensure_inside(&self, path: &Path) -> StorageResult<()> {
        match path.parent() {
            Some(parent) if parent == self.root => Ok(()),
            _ => Err(StorageError::OutsideStore(path.to_path_buf())),
        }
    }
}

/// Transient directory owned by one stage invocation.
///
/// Removed by [`WorkDir::cleanup`], or on drop as a fallback.
#[derive(Debug)]
pub struct WorkDir {
    dir: tempfile::TempDir,
}

impl WorkDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory and everything in it, logging failures.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove work dir {}: {}", path.display(), e);
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::open(StoreConfig {
            root: dir.path().join("uploads"),
            public_prefix: "/static/uploads/".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_names_are_unique_and_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let a = store.allocate_upload("my video.mp4").unwrap();
        let b = store.allocate_upload("my video.mp4").unwrap();

        assert_ne!(a.name, b.name);
        assert!(a.name.ends_with("_my_video.mp4"));
        assert_eq!(a.url, format!("/static/uploads/{}", a.name));
        assert_eq!(a.kind, ArtifactKind::SourceVideo);
        assert_eq!(a.path().parent().unwrap(), store.root());

        let dotted = store.allocate_upload("my..clip.mp4").unwrap();
        assert!(dotted.name.ends_with("_my.clip.mp4"));
    }

    #[tokio::test]
    async fn test_empty_filename_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        assert!(matches!(
            store.allocate_upload(""),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_generated_names() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let audio = store.allocate(ArtifactKind::NarrationAudio, ".wav").unwrap();
        assert!(audio.name.ends_with(".wav"));
        assert!(!audio.name.contains(".."));

        let merged = store.allocate(ArtifactKind::MergedVideo, "mp4").unwrap();
        assert!(merged.name.ends_with("_merged.mp4"));
    }

    #[tokio::test]
    async fn test_write_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let artifact = store.allocate_upload("clip.mp4").unwrap();
        let written = store.write_bytes(&artifact, b"video bytes").await.unwrap();
        assert_eq!(written, 11);
        assert!(artifact.exists());

        assert!(store.delete(&artifact).await.unwrap());
        assert!(!artifact.exists());
        assert!(!store.delete(&artifact).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let artifact = store.allocate_upload("clip.mp4").unwrap();

        let chunks = futures_util::stream::iter(vec![
            Ok(b"first".to_vec()),
            Err("connection reset"),
        ]);
        let result = store.write_stream(&artifact, chunks).await;

        assert!(matches!(result, Err(StorageError::WriteFailed(_))));
        assert!(!artifact.exists());
        assert!(!partial_path(artifact.path()).exists());
    }

    #[tokio::test]
    async fn test_refuses_paths_outside_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let outside = ArtifactRef::new(
            ArtifactKind::SourceVideo,
            "x.mp4",
            dir.path().join("x.mp4"),
            "/static/uploads/x.mp4",
        );
        assert!(matches!(
            store.delete(&outside).await,
            Err(StorageError::OutsideStore(_))
        ));
    }

    #[tokio::test]
    async fn test_work_dir_cleanup() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        let work = store.work_dir("temp_analysis_").unwrap();
        let path = work.path().to_path_buf();
        std::fs::write(path.join("frame_0000.jpg"), b"jpg").unwrap();
        assert!(path.exists());

        work.cleanup();
        assert!(!path.exists());
    }
}
