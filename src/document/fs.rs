//! Directory-backed document source
//!
//! Keys are paths relative to the root, `/`-separated. Directories are listed
//! as container entries. Archiving copies into a mirror tree under the
//! archive directory.
//!
//! The tree is walked once per listing: a call without a page token walks
//! and caches the sorted entries, and later pages are cut from that cache.

use super::traits::{Document, DocumentError, DocumentPage, DocumentRef, DocumentResult, DocumentStore};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct FsDocumentStore {
    root: PathBuf,
    archive_dir: PathBuf,
    page_size: usize,
    listing: Mutex<Option<Arc<Vec<DocumentRef>>>>,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            archive_dir: archive_dir.into(),
            page_size: 1_000,
            listing: Mutex::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Map a key to a path under `base`, refusing anything that escapes it.
    fn resolve(base: &Path, key: &str) -> DocumentResult<PathBuf> {
        let relative = Path::new(key.trim_end_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(DocumentError::InvalidKey(key.to_string()));
        }
        Ok(base.join(relative))
    }

    fn cached_listing(&self) -> Option<Arc<Vec<DocumentRef>>> {
        self.listing.lock().unwrap().clone()
    }

    /// Every entry under the root, sorted by key.
    async fn walk(&self) -> DocumentResult<Vec<DocumentRef>> {
        let mut entries = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut read = tokio::fs::read_dir(&dir).await.map_err(|source| DocumentError::Io {
                key: prefix.clone(),
                source,
            })?;
            while let Some(entry) = read.next_entry().await.map_err(|source| DocumentError::Io {
                key: prefix.clone(),
                source,
            })? {
                let name = entry.file_name().to_string_lossy().to_string();
                let meta = entry.metadata().await.map_err(|source| DocumentError::Io {
                    key: format!("{}{}", prefix, name),
                    source,
                })?;
                if meta.is_dir() {
                    let key = format!("{}{}/", prefix, name);
                    entries.push(DocumentRef::container(key.clone()));
                    pending.push((entry.path(), key));
                } else {
                    entries.push(DocumentRef::file(format!("{}{}", prefix, name), meta.len()));
                }
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> DocumentResult<DocumentPage> {
        let entries = match (page_token, self.cached_listing()) {
            (Some(_), Some(cached)) => cached,
            _ => {
                let walked = Arc::new(self.walk().await?);
                *self.listing.lock().unwrap() = Some(walked.clone());
                walked
            }
        };

        // Keys under a prefix are contiguous in sorted order.
        let start = match page_token {
            Some(after) if after >= prefix => entries.partition_point(|r| r.key.as_str() <= after),
            _ => entries.partition_point(|r| r.key.as_str() < prefix),
        };
        let mut matching = entries[start..]
            .iter()
            .take_while(|r| r.key.starts_with(prefix))
            .take(self.page_size + 1)
            .cloned()
            .collect::<Vec<_>>();

        let has_more = matching.len() > self.page_size;
        matching.truncate(self.page_size);
        let next_token = if has_more {
            matching.last().map(|r| r.key.clone())
        } else {
            None
        };
        Ok(DocumentPage {
            refs: matching,
            next_token,
        })
    }

    async fn fetch(&self, doc: &DocumentRef) -> DocumentResult<Document> {
        let path = Self::resolve(&self.root, &doc.key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                DocumentError::NotFound(doc.key.clone())
            } else {
                DocumentError::Io {
                    key: doc.key.clone(),
                    source,
                }
            }
        })?;
        Document::from_json(&doc.key, &bytes)
    }

    async fn archive(&self, doc: &DocumentRef) -> DocumentResult<()> {
        let from = Self::resolve(&self.root, &doc.key)?;
        let to = Self::resolve(&self.archive_dir, &doc.key)?;
        let io_err = |source| DocumentError::Io {
            key: doc.key.clone(),
            source,
        };
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::copy(&from, &to).await.map_err(io_err)?;
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> DocumentResult<()> {
        let path = Self::resolve(&self.root, &doc.key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| DocumentError::Io {
                key: doc.key.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, key: &str, body: &str) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn lists_files_and_containers_in_key_order() {
        let root = tempfile::tempdir().unwrap();
        write(root.path(), "b.json", r#"{"title":"B","text":"b"}"#);
        write(root.path(), "a.json", r#"{"title":"A","text":"a"}"#);
        write(root.path(), "wiki/c.json", r#"{"title":"C","text":"c"}"#);
        write(root.path(), "empty.json", "");

        let store = FsDocumentStore::new(root.path(), root.path().join("../archive"));
        let page = store.list("", None).await.unwrap();
        let keys: Vec<&str> = page.refs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a.json", "b.json", "empty.json", "wiki/", "wiki/c.json"]);
        assert!(page.next_token.is_none());
        assert!(page.refs[3].is_container);
        assert!(!page.refs[2].is_processable());
    }

    #[tokio::test]
    async fn pages_follow_the_token() {
        let root = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(root.path(), &format!("{}.json", i), r#"{"title":"T","text":"x"}"#);
        }
        let store = FsDocumentStore::new(root.path(), root.path().join("archive")).with_page_size(2);

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store.list("", token.as_deref()).await.unwrap();
            keys.extend(page.refs.into_iter().map(|r| r.key));
            match page.next_token {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        assert_eq!(keys, vec!["0.json", "1.json", "2.json", "3.json", "4.json"]);
    }

    #[tokio::test]
    async fn later_pages_come_from_the_first_walk() {
        let root = tempfile::tempdir().unwrap();
        for key in ["a/1.json", "a/2.json", "a/3.json", "b/1.json"] {
            write(root.path(), key, r#"{"title":"T","text":"x"}"#);
        }
        let store = FsDocumentStore::new(root.path(), root.path().join("../archive")).with_page_size(2);

        let first = store.list("a/", None).await.unwrap();
        let keys: Vec<&str> = first.refs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "a/1.json"]);

        // Files added mid-listing are not seen until the next listing starts.
        write(root.path(), "a/4.json", r#"{"title":"T","text":"x"}"#);
        let second = store.list("a/", first.next_token.as_deref()).await.unwrap();
        let keys: Vec<&str> = second.refs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a/2.json", "a/3.json"]);
        assert!(second.next_token.is_none());

        let fresh = store.list("a/4", None).await.unwrap();
        assert_eq!(fresh.refs.len(), 1);
    }

    #[tokio::test]
    async fn archive_then_delete_moves_the_file() {
        let root = tempfile::tempdir().unwrap();
        let archive = tempfile::tempdir().unwrap();
        write(root.path(), "wiki/t.json", r#"{"title":"Transistor","text":"A transistor"}"#);
        let store = FsDocumentStore::new(root.path(), archive.path());
        let doc = DocumentRef::file("wiki/t.json", 10);

        let fetched = store.fetch(&doc).await.unwrap();
        assert_eq!(fetched.title, "Transistor");

        store.archive(&doc).await.unwrap();
        store.delete(&doc).await.unwrap();
        assert!(archive.path().join("wiki/t.json").exists());
        assert!(!root.path().join("wiki/t.json").exists());
        assert!(matches!(store.fetch(&doc).await, Err(DocumentError::NotFound(_))));
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let root = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(root.path(), root.path().join("archive"));
        let err = store.fetch(&DocumentRef::file("../secret.json", 1)).await.unwrap_err();
        assert!(matches!(err, DocumentError::InvalidKey(_)));
    }
}
