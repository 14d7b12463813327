//! Raw document sources

mod fs;
mod memory;
mod traits;

pub use fs::FsDocumentStore;
pub use memory::MemoryDocumentStore;
pub use traits::{Document, DocumentError, DocumentPage, DocumentRef, DocumentResult, DocumentStore};
