//! In-process [`BlogStore`] for handler and streaming tests.
//!
//! Documents are kept in insertion order, which is also the scan order.
//! Failures can be injected per operation class to exercise the error
//! mapping without a live MongoDB.

use super::{BlogScan, BlogStore, StoreError};
use blog_tonic_core::{BlogFields, BlogId, BlogItem, bson::oid::ObjectId};
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Where a scan should fail, if at all.
#[derive(Clone, Copy, Debug, Default)]
pub enum ScanFailure {
    #[default]
    None,
    /// The cursor cannot be opened.
    Open,
    /// The document at this position fails to decode.
    DecodeAt(usize),
    /// The cursor reports a backend error after yielding this many documents.
    CursorAfter(usize),
}

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<BlogItem>>,
    writes_fail: Mutex<bool>,
    reads_fail: Mutex<bool>,
    scan_failure: Mutex<ScanFailure>,
    calls: AtomicUsize,
    /// Number of documents handed out by scans so far.
    pulled: Arc<AtomicUsize>,
    closed: AtomicBool,
    read_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self) {
        *self.writes_fail.lock() = true;
    }

    pub fn fail_reads(&self) {
        *self.reads_fail.lock() = true;
    }

    pub fn fail_scan(&self, failure: ScanFailure) {
        *self.scan_failure.lock() = failure;
    }

    /// Total number of trait calls made against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total number of documents pulled out of scans.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Makes every later `find_by_id` wait until the returned gate is
    /// notified once per call.
    pub fn gate_reads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.read_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn snapshot(&self) -> Vec<BlogItem> {
        self.docs.lock().clone()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable {
            context: "injected backend failure".to_string(),
        }
    }

    /// A closed store must not be used again.
    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Unavailable {
                context: "store used after close".to_string(),
            });
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        self.check_open()?;
        if *self.writes_fail.lock() {
            return Err(Self::unavailable());
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl BlogStore for MemoryStore {
    async fn insert(&self, item: BlogItem) -> Result<BlogId, StoreError> {
        self.record_call();
        self.check_writes()?;

        let id = BlogId::from(ObjectId::new());
        self.docs.lock().push(item.with_id(id));
        Ok(id)
    }

    async fn find_by_id(&self, id: BlogId) -> Result<BlogItem, StoreError> {
        self.record_call();
        let gate = self.read_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_open()?;
        if *self.reads_fail.lock() {
            return Err(Self::unavailable());
        }

        self.docs
            .lock()
            .iter()
            .find(|doc| doc.blog_id() == Some(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_by_id(&self, id: BlogId, fields: BlogFields) -> Result<BlogItem, StoreError> {
        self.record_call();
        self.check_writes()?;

        let mut docs = self.docs.lock();
        let doc = docs
            .iter_mut()
            .find(|doc| doc.blog_id() == Some(id))
            .ok_or(StoreError::NotFound)?;
        doc.author_id = fields.author_id;
        doc.title = fields.title;
        doc.content = fields.content;
        Ok(doc.clone())
    }

    async fn delete_by_id(&self, id: BlogId) -> Result<(), StoreError> {
        self.record_call();
        self.check_writes()?;

        let mut docs = self.docs.lock();
        let before = docs.len();
        docs.retain(|doc| doc.blog_id() != Some(id));
        if docs.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn scan_all(&self) -> Result<BlogScan, StoreError> {
        self.record_call();
        self.check_open()?;

        let failure = *self.scan_failure.lock();
        if matches!(failure, ScanFailure::Open) {
            return Err(Self::unavailable());
        }

        let mut items: Vec<Result<BlogItem, StoreError>> =
            self.snapshot().into_iter().map(Ok).collect();
        match failure {
            ScanFailure::DecodeAt(at) if at < items.len() => {
                items[at] = Err(StoreError::Decode {
                    context: format!("document {at} is missing field `title`"),
                });
            }
            ScanFailure::CursorAfter(after) => {
                items.truncate(after);
                items.push(Err(Self::unavailable()));
            }
            _ => {}
        }

        let pulled = Arc::clone(&self.pulled);
        // Counting happens on pull, so the counter tracks how far a consumer
        // actually advanced the scan.
        let scan = futures::stream::iter(items).inspect(move |_| {
            pulled.fetch_add(1, Ordering::SeqCst);
        });
        Ok(scan.boxed())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
