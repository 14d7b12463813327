//! In-memory document source for tests and dry runs

use super::traits::{Document, DocumentError, DocumentPage, DocumentRef, DocumentResult, DocumentStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryDocumentStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    containers: Mutex<BTreeSet<String>>,
    archived: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            ..Default::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Store a JSON document with the given title and text.
    pub fn insert_article(&self, key: &str, title: &str, text: &str) {
        let body = serde_json::json!({ "title": title, "text": text }).to_string();
        self.insert_raw(key, body.into_bytes());
    }

    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn insert_container(&self, key: &str) {
        self.containers.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn archived_keys(&self) -> Vec<String> {
        self.archived.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, prefix: &str, page_token: Option<&str>) -> DocumentResult<DocumentPage> {
        let mut entries: Vec<DocumentRef> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| DocumentRef::file(k.clone(), v.len() as u64))
            .collect();
        entries.extend(
            self.containers
                .lock()
                .unwrap()
                .iter()
                .map(|k| DocumentRef::container(k.clone())),
        );
        entries.retain(|r| r.key.starts_with(prefix));
        entries.retain(|r| page_token.map_or(true, |after| r.key.as_str() > after));
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let has_more = entries.len() > self.page_size;
        entries.truncate(self.page_size);
        let next_token = if has_more {
            entries.last().map(|r| r.key.clone())
        } else {
            None
        };
        Ok(DocumentPage {
            refs: entries,
            next_token,
        })
    }

    async fn fetch(&self, doc: &DocumentRef) -> DocumentResult<Document> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&doc.key)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(doc.key.clone()))?;
        Document::from_json(&doc.key, &bytes)
    }

    async fn archive(&self, doc: &DocumentRef) -> DocumentResult<()> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&doc.key)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(doc.key.clone()))?;
        self.archived.lock().unwrap().insert(doc.key.clone(), bytes);
        Ok(())
    }

    async fn delete(&self, doc: &DocumentRef) -> DocumentResult<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&doc.key)
            .map(|_| ())
            .ok_or_else(|| DocumentError::NotFound(doc.key.clone()))
    }
}
