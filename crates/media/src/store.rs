use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use {tokio::io::AsyncWriteExt, tracing::debug, wagate_common::TenantId};

use crate::mime;

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment has an empty identifier")]
    EmptyId,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode history payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writes attachment bytes under `<root>/user_<id>/`.
pub struct AttachmentStore {
    root: PathBuf,
    history_seq: AtomicU64,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            history_seq: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tenant_dir(&self, tenant: TenantId) -> PathBuf {
        self.root.join(format!("user_{tenant}"))
    }

    /// Persist one media payload as `<event_id>.<ext>` and return its path.
    ///
    /// The extension comes from `mime_type`, falling back to `file_name`.
    pub async fn save(
        &self,
        tenant: TenantId,
        event_id: &str,
        mime_type: &str,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<PathBuf, AttachmentError> {
        let stem = sanitize_id(event_id);
        if stem.is_empty() {
            return Err(AttachmentError::EmptyId);
        }
        let dir = self.ensure_tenant_dir(tenant).await?;
        let ext = mime::choose_extension(mime_type, file_name);
        let path = dir.join(format!("{stem}.{ext}"));
        write_private(&path, bytes).await?;
        debug!(tenant = %tenant, path = %path.display(), size = bytes.len(), "attachment saved");
        Ok(path)
    }

    /// Dump a history sync payload to `history-<n>.json` and return its path.
    pub async fn save_history(
        &self,
        tenant: TenantId,
        payload: &serde_json::Value,
    ) -> Result<PathBuf, AttachmentError> {
        let dir = self.ensure_tenant_dir(tenant).await?;
        let n = self.history_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let path = dir.join(format!("history-{n}.json"));
        let body = serde_json::to_vec_pretty(payload)?;
        write_private(&path, &body).await?;
        debug!(tenant = %tenant, path = %path.display(), "history sync saved");
        Ok(path)
    }

    async fn ensure_tenant_dir(&self, tenant: TenantId) -> Result<PathBuf, AttachmentError> {
        let dir = self.tenant_dir(tenant);
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o751);
        builder.create(&dir).await.map_err(|source| AttachmentError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }
}

/// Keep only characters that are safe in a file name.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

async fn write_private(path: &Path, bytes: &[u8]) -> Result<(), AttachmentError> {
    let io_err = |source| AttachmentError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saves_under_tenant_dir_with_mime_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path().join("files"));

        let path = store
            .save(TenantId(1), "3EB0ABC", "image/jpeg", None, b"\xff\xd8jpeg")
            .await
            .unwrap();

        assert_eq!(path, tmp.path().join("files/user_1/3EB0ABC.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\xff\xd8jpeg");
        let entries = std::fs::read_dir(store.tenant_dir(TenantId(1)))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        let path = store
            .save(TenantId(2), "m1", "audio/ogg; codecs=opus", None, b"ogg")
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(path.to_string_lossy().ends_with("m1.ogg"));
    }

    #[tokio::test]
    async fn document_uses_file_name_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        let path = store
            .save(
                TenantId(3),
                "doc1",
                "application/octet-stream",
                Some("notes.odt"),
                b"x",
            )
            .await
            .unwrap();
        assert_eq!(path.extension().unwrap(), "odt");
    }

    #[tokio::test]
    async fn rejects_unusable_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        let err = store
            .save(TenantId(1), "../..", "image/png", None, b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::EmptyId));
    }

    #[tokio::test]
    async fn history_files_are_numbered() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path());
        let a = store
            .save_history(TenantId(1), &serde_json::json!({"conversations": []}))
            .await
            .unwrap();
        let b = store
            .save_history(TenantId(1), &serde_json::json!({}))
            .await
            .unwrap();
        assert!(a.ends_with("user_1/history-1.json"));
        assert!(b.ends_with("user_1/history-2.json"));
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&a).unwrap()).unwrap();
        assert_eq!(back["conversations"], serde_json::json!([]));
    }
}
