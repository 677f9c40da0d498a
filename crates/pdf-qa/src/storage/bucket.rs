//! Filesystem document bucket
//!
//! Objects live at `{root}/source/{user_id}/{filename}` and are addressed by
//! the key `source/{user_id}/{filename}`. Public URLs are the configured base
//! URL followed by the key, with the filename percent-encoded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Source;

/// Key prefix for uploaded documents
pub const SOURCE_PREFIX: &str = "source";

/// Longest accepted user id
const MAX_USER_ID_LEN: usize = 128;

/// A stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

/// Local bucket of user documents
#[derive(Debug, Clone)]
pub struct DocumentBucket {
    root: PathBuf,
    base_url: String,
}

impl DocumentBucket {
    /// Open a bucket rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(SOURCE_PREFIX)).map_err(|e| {
            Error::storage(format!("Failed to create bucket {}: {}", root.display(), e))
        })?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { root, base_url })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Directory holding a user's documents
    pub fn user_source_dir(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.root.join(SOURCE_PREFIX).join(user_id))
    }

    /// Store a document, replacing any object with the same name
    pub async fn put_object(&self, user_id: &str, filename: &str, data: &[u8]) -> Result<ObjectInfo> {
        let filename = sanitize_filename(filename)?;
        let dir = self.user_source_dir(user_id)?;

        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&filename), data).await?;

        tracing::info!("[{}] Stored {} bytes for {}", filename, data.len(), user_id);

        Ok(ObjectInfo {
            key: object_key(user_id, &filename),
            url: self.object_url(user_id, &filename),
            size: data.len() as u64,
            filename,
        })
    }

    /// A user's documents, sorted by filename
    pub async fn list_objects(&self, user_id: &str) -> Result<Vec<ObjectInfo>> {
        let dir = self.user_source_dir(user_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            objects.push(ObjectInfo {
                key: object_key(user_id, &filename),
                url: self.object_url(user_id, &filename),
                size: metadata.len(),
                filename,
            });
        }

        objects.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(objects)
    }

    /// Public URL of a user's document
    pub fn object_url(&self, user_id: &str, filename: &str) -> String {
        format!(
            "{}{}/{}/{}",
            self.base_url,
            SOURCE_PREFIX,
            user_id,
            urlencoding::encode(filename)
        )
    }

    /// Citation link to one page of a source document
    pub fn citation_url(&self, user_id: &str, source: &Source) -> String {
        citation_link(&self.base_url, user_id, source)
    }
}

/// `source/{user_id}/{filename}`
pub fn object_key(user_id: &str, filename: &str) -> String {
    format!("{}/{}/{}", SOURCE_PREFIX, user_id, filename)
}

/// `{base}source/{user_id}/{encoded filename}#page={page}`
pub fn citation_link(base_url: &str, user_id: &str, source: &Source) -> String {
    let separator = if base_url.ends_with('/') { "" } else { "/" };
    format!(
        "{}{}{}/{}/{}#page={}",
        base_url,
        separator,
        SOURCE_PREFIX,
        user_id,
        urlencoding::encode(&source.filename),
        source.page
    )
}

/// User ids name directories and collections, so only `[A-Za-z0-9_-]` is
/// accepted
pub fn validate_user_id(user_id: &str) -> Result<()> {
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(Error::bad_request(format!("Invalid user id: {:?}", user_id)))
    }
}

/// Reduce an uploaded file name to a safe final path component
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    if name.is_empty() || name == "." || name == ".." || name.chars().any(char::is_control) {
        return Err(Error::bad_request(format!("Invalid filename: {:?}", filename)));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_link() {
        let link = citation_link(
            "https://bucket.example.com/",
            "alice",
            &Source::new("my report.pdf", 4),
        );
        assert_eq!(
            link,
            "https://bucket.example.com/source/alice/my%20report.pdf#page=4"
        );

        let link = citation_link("http://h/files", "bob", &Source::new("a.pdf", 1));
        assert_eq!(link, "http://h/files/source/bob/a.pdf#page=1");
    }

    #[test]
    fn test_citation_url_uses_bucket_base() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = DocumentBucket::new(dir.path(), "http://localhost:8000/files/").unwrap();

        assert_eq!(
            bucket.citation_url("alice", &Source::new("q3 notes.pdf", 2)),
            "http://localhost:8000/files/source/alice/q3%20notes.pdf#page=2"
        );
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("nobody").is_ok());
        assert!(validate_user_id("user_42-x").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id("a/b").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf").unwrap(), "report.pdf");
        assert_eq!(sanitize_filename("../../x.pdf").unwrap(), "x.pdf");
        assert_eq!(sanitize_filename("C:\\fakepath\\y.pdf").unwrap(), "y.pdf");
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("dir/").is_err());
    }

    #[tokio::test]
    async fn test_put_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = DocumentBucket::new(dir.path(), "http://localhost:8000/files").unwrap();

        let info = bucket.put_object("alice", "b doc.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(info.key, "source/alice/b doc.pdf");
        assert_eq!(info.url, "http://localhost:8000/files/source/alice/b%20doc.pdf");
        assert!(dir.path().join("source/alice/b doc.pdf").exists());

        bucket.put_object("alice", "a.pdf", b"x").await.unwrap();
        bucket.put_object("bob", "c.pdf", b"y").await.unwrap();

        let names: Vec<String> = bucket
            .list_objects("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.filename)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b doc.pdf"]);
        assert!(bucket.list_objects("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_rejects_bad_user() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = DocumentBucket::new(dir.path(), "http://h/").unwrap();
        assert!(bucket.put_object("../x", "a.pdf", b"x").await.is_err());
    }
}
