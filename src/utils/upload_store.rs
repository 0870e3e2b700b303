use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

/// Justification files kept in a local directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` as `<uuid>_<original name>` and returns the stored path.
    ///
    /// An existing file with the same name is overwritten.
    pub async fn store(&self, original_filename: &str, bytes: &[u8]) -> io::Result<String> {
        fs::create_dir_all(&self.root).await?;

        let file_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_filename));
        let path = self.root.join(file_name);
        fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored justification file");
        Ok(path.to_string_lossy().into_owned())
    }

    pub async fn read(&self, stored_path: &str) -> io::Result<Vec<u8>> {
        fs::read(stored_path).await
    }

    /// Removes a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, stored_path: &str) -> io::Result<()> {
        match fs::remove_file(stored_path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Keeps only the final path component of a client supplied file name.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();

    match last {
        "" | "." | ".." => "file".to_string(),
        other => other.to_string(),
    }
}

/// Name the client originally uploaded, recovered from a stored path.
pub fn original_filename(stored_path: &str) -> String {
    let file_name = sanitize_filename(stored_path);
    match file_name.split_once('_') {
        Some((_, original)) if !original.is_empty() => original.to_string(),
        _ => file_name,
    }
}
