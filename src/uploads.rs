use std::path::{Component, Path as FsPath, PathBuf};

use axum::body::{boxed, Full};
use axum::extract::Path;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::Extension;
use chrono::Utc;
use tokio::fs::{create_dir_all, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::err::Error;

/// Append-only storage for uploaded application documents. Filenames
/// embed a millisecond timestamp, so nothing is ever overwritten.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: PathBuf) -> UploadStore {
        UploadStore { root }
    }

    pub async fn prepare(&self) -> anyhow::Result<()> {
        create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Writes one upload under `{field}_{timestamp}{extension}` and
    /// returns the relative path stored in the record's documents
    /// block. Bytes are written verbatim, never interpreted.
    pub async fn save(
        &self,
        field: &str,
        original_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        let name = stamped_name(field, original_name, None, Utc::now().timestamp_millis());
        self.write(&name, bytes).await?;
        Ok(name)
    }

    /// Variant for multi-file fields: `{field}_{timestamp}_{index}_{originalName}`.
    pub async fn save_indexed(
        &self,
        field: &str,
        index: usize,
        original_name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        let name = stamped_name(
            field,
            original_name,
            Some(index),
            Utc::now().timestamp_millis(),
        );
        self.write(&name, bytes).await?;
        Ok(name)
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        create_dir_all(&self.root).await?;
        let file = File::create(self.root.join(name)).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Maps a stored relative path back to a location under the
    /// uploads root. Absolute paths and any `..` component are
    /// rejected before the join, so a crafted path can never resolve
    /// outside the root.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let rel = FsPath::new(relative);
        if rel.is_absolute() || relative.is_empty() {
            return None;
        }
        let mut resolved = self.root.clone();
        for component in rel.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => continue,
                _ => return None,
            }
        }
        Some(resolved)
    }

    /// Reads a stored upload; `None` covers both "outside the root"
    /// and "no such file", so the caller leaks nothing either way.
    pub async fn read(&self, relative: &str) -> Option<Vec<u8>> {
        let path = self.resolve(relative)?;
        let file = File::open(path).await.ok()?;
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes).await.ok()?;
        Some(bytes)
    }
}

fn stamped_name(field: &str, original_name: &str, index: Option<usize>, millis: i64) -> String {
    // Only the final path component of the client-supplied name is
    // ever used.
    let original = FsPath::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    match index {
        Some(index) => format!("{}_{}_{}_{}", field, millis, index, original),
        None => {
            let extension = FsPath::new(original)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{}", e))
                .unwrap_or_default();
            format!("{}_{}{}", field, millis, extension)
        }
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    let extension = FsPath::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

pub async fn serve_upload(
    Path(path): Path<String>,
    Extension(store): Extension<UploadStore>,
) -> Result<Response, Error> {
    let bytes = match store.read(&path).await {
        Some(bytes) => bytes,
        None => return Err(Error::not_found("No such upload")),
    };
    Response::builder()
        .header(CONTENT_TYPE, content_type_for(&path))
        .body(boxed(Full::from(bytes)))
        .map_err(|err| Error::internal("ResponseError", err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> UploadStore {
        let root = std::env::temp_dir().join(format!(
            "admissions-uploads-{}-{}",
            tag,
            uuid::Uuid::new_v4()
        ));
        UploadStore::new(root)
    }

    #[test]
    fn single_file_name_keeps_extension_only() {
        let name = stamped_name("passport", "scan.pdf", None, 1_700_000_000_000);
        assert_eq!(name, "passport_1700000000000.pdf");

        let name = stamped_name("passport", "noextension", None, 1_700_000_000_000);
        assert_eq!(name, "passport_1700000000000");
    }

    #[test]
    fn indexed_name_keeps_original() {
        let name = stamped_name("workExperience", "reference letter.pdf", Some(2), 42);
        assert_eq!(name, "workExperience_42_2_reference letter.pdf");
    }

    #[test]
    fn client_path_segments_are_stripped() {
        let name = stamped_name("passport", "../../etc/passwd", None, 42);
        assert_eq!(name, "passport_42");
        let name = stamped_name("workExperience", "/tmp/evil.sh", Some(0), 42);
        assert_eq!(name, "workExperience_42_0_evil.sh");
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = UploadStore::new(PathBuf::from("/srv/uploads"));
        assert!(store.resolve("../etc/passwd").is_none());
        assert!(store.resolve("a/../../x").is_none());
        assert!(store.resolve("/etc/passwd").is_none());
        assert!(store.resolve("").is_none());
        assert_eq!(
            store.resolve("passport_42.pdf"),
            Some(PathBuf::from("/srv/uploads/passport_42.pdf"))
        );
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.gif"), "image/gif");
        assert_eq!(content_type_for("a.docx"), "application/octet-stream");
        assert_eq!(content_type_for("nodot"), "application/octet-stream");
    }

    #[tokio::test]
    async fn save_then_read_round_trips() {
        let store = temp_store("roundtrip");
        store.prepare().await.unwrap();
        let payload = b"%PDF-1.4 not really".to_vec();
        let relative = store.save("passport", "scan.pdf", &payload).await.unwrap();
        assert_eq!(store.read(&relative).await, Some(payload));
        tokio::fs::remove_dir_all(store.root).await.ok();
    }

    #[tokio::test]
    async fn read_missing_file_is_none() {
        let store = temp_store("missing");
        store.prepare().await.unwrap();
        assert_eq!(store.read("passport_1.pdf").await, None);
        tokio::fs::remove_dir_all(store.root).await.ok();
    }
}
