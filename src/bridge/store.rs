//! In-memory document store
//!
//! Default [`DocumentHandler`] used by the daemon and by tests. Real hosts
//! supply their own handler backed by the application's open editors.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::DocumentHandler;
use super::command::{Selection, TimeState, ViewportState};
use crate::error::{BridgeError, BridgeResult};

#[derive(Default)]
struct DocumentState {
    time: Option<TimeState>,
    viewport: Option<ViewportState>,
    selection: Selection,
}

/// Thread-safe in-memory store keyed by filename. Documents must be opened
/// before state commands can target them.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, DocumentState>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document, making it a candidate for target resolution.
    pub fn open(&self, filename: impl Into<String>) {
        self.documents
            .write()
            .entry(filename.into())
            .or_default();
    }

    /// Close a document, discarding its state.
    pub fn close(&self, filename: &str) {
        self.documents.write().remove(filename);
    }

    fn with_document<T>(
        &self,
        filename: &str,
        read: impl FnOnce(&DocumentState) -> T,
    ) -> BridgeResult<T> {
        let documents = self.documents.read();
        documents
            .get(filename)
            .map(read)
            .ok_or_else(|| BridgeError::NotFound(format!("document '{filename}' is not open")))
    }

    fn with_document_mut(
        &self,
        filename: &str,
        write: impl FnOnce(&mut DocumentState),
    ) -> BridgeResult<()> {
        let mut documents = self.documents.write();
        match documents.get_mut(filename) {
            Some(document) => {
                write(document);
                Ok(())
            }
            None => Err(BridgeError::NotFound(format!(
                "document '{filename}' is not open"
            ))),
        }
    }
}

#[async_trait]
impl DocumentHandler for MemoryDocumentStore {
    async fn open_documents(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    async fn time_state(&self, filename: &str) -> BridgeResult<TimeState> {
        self.with_document(filename, |document| document.time.clone())?
            .ok_or_else(|| BridgeError::NotFound(format!("'{filename}' has no time state")))
    }

    async fn set_time_state(&self, filename: &str, state: TimeState) -> BridgeResult<()> {
        self.with_document_mut(filename, |document| document.time = Some(state))
    }

    async fn viewport(&self, filename: &str) -> BridgeResult<ViewportState> {
        self.with_document(filename, |document| document.viewport.clone())?
            .ok_or_else(|| BridgeError::NotFound(format!("'{filename}' has no viewport")))
    }

    async fn set_viewport(&self, filename: &str, state: ViewportState) -> BridgeResult<()> {
        self.with_document_mut(filename, |document| document.viewport = Some(state))
    }

    async fn selection(&self, filename: &str) -> BridgeResult<Selection> {
        self.with_document(filename, |document| document.selection.clone())
    }

    async fn set_selection(&self, filename: &str, selection: Selection) -> BridgeResult<()> {
        self.with_document_mut(filename, |document| document.selection = selection)
    }

    async fn notify(&self, message: &str) -> BridgeResult<()> {
        tracing::info!(message, "notification");
        Ok(())
    }
}
