use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use canopy_types::{Change, ChangeOrigin, Document, ListenerId};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{DeepObservable, Doc, MapRef, Origin, ReadTxn, StateVector, Subscription, Transact, Update};

use crate::error::SyncError;
use crate::inbound::Replay;
use crate::options::SyncOptions;
use crate::outbound::{apply_change, GcBatch};
use crate::snapshot::{read_graph, write_graph};

/// Where the outbound side of a provider is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// Local changes are queued and not yet written to the CRDT document.
    Batching,
    Flushing,
}

struct Shared {
    ydoc: Doc,
    doc_map: MapRef,
    origin: Origin,
    /// Set while remote events are replayed into the document.
    synchronizing: Cell<bool>,
    attached: Cell<bool>,
    phase: Cell<SyncPhase>,
    queue: RefCell<Vec<Change>>,
    options: SyncOptions,
}

impl Shared {
    /// Write every queued change to the CRDT document in one transaction.
    /// The queue is kept if the CRDT document is busy.
    fn flush(&self, doc: &Document) -> Result<(), SyncError> {
        if self.queue.borrow().is_empty() {
            self.phase.set(SyncPhase::Idle);
            return Ok(());
        }
        let Ok(mut txn) = self.ydoc.try_transact_mut_with(self.origin.clone()) else {
            self.phase.set(SyncPhase::Batching);
            return Err(SyncError::Busy);
        };
        self.phase.set(SyncPhase::Flushing);
        let changes = std::mem::take(&mut *self.queue.borrow_mut());
        let mut gc = GcBatch::default();
        for change in &changes {
            apply_change(&mut txn, &self.doc_map, doc, change, &mut gc);
        }
        gc.commit(&mut txn, &self.doc_map, doc, self.options.collect_unreachable);
        drop(txn);
        tracing::trace!(changes = changes.len(), "flushed local changes");
        self.phase.set(SyncPhase::Idle);
        Ok(())
    }

    fn replay(&self, document: &RefCell<Document>, txn: &yrs::TransactionMut, events: &yrs::types::Events) {
        if txn.origin() == Some(&self.origin) {
            return;
        }
        let Ok(mut doc) = document.try_borrow_mut() else {
            tracing::warn!("document is borrowed during a remote update; dropping events");
            return;
        };
        self.synchronizing.set(true);
        Replay::new(txn, &self.doc_map).run(&mut doc, events);
        self.synchronizing.set(false);
    }
}

/// Keeps a [`Document`] and a `yrs` [`Doc`] in step in both directions.
///
/// Local change batches are written to the CRDT document under the
/// provider's own origin; CRDT transactions from any other origin are
/// replayed into the document tagged [`ChangeOrigin::Remote`].
pub struct SyncProvider {
    shared: Rc<Shared>,
    document: Rc<RefCell<Document>>,
    listener: Option<ListenerId>,
    subscription: Option<Subscription>,
}

impl SyncProvider {
    /// Attach `document` to `ydoc`. A CRDT document that already holds a
    /// graph replaces the local content; otherwise the local graph, if it
    /// has a root, seeds the CRDT document.
    pub fn new(document: Rc<RefCell<Document>>, ydoc: Doc, options: SyncOptions) -> Result<Self, SyncError> {
        let doc_map = ydoc.get_or_insert_map(options.document_key.as_str());
        let origin = match &options.origin {
            Some(origin) => Origin::from(origin.as_str()),
            None => Origin::from(format!("canopy-sync:{}", ydoc.client_id()).as_str()),
        };
        let shared = Rc::new(Shared {
            ydoc,
            doc_map,
            origin,
            synchronizing: Cell::new(false),
            attached: Cell::new(true),
            phase: Cell::new(SyncPhase::Idle),
            queue: RefCell::new(Vec::new()),
            options,
        });
        let mut provider = Self {
            shared,
            document,
            listener: None,
            subscription: None,
        };
        provider.init()?;
        Ok(provider)
    }

    fn init(&mut self) -> Result<(), SyncError> {
        let shared = &self.shared;
        let graph = {
            let txn = shared.ydoc.try_transact().map_err(|_| SyncError::Busy)?;
            read_graph(&txn, &shared.doc_map)?
        };
        {
            let mut doc = self.document.try_borrow_mut().map_err(|_| SyncError::Busy)?;
            match graph {
                Some(graph) => {
                    tracing::debug!(nodes = graph.types.len(), "loading graph from crdt document");
                    doc.transaction_with_origin(ChangeOrigin::Remote).load(&graph)?;
                }
                None if doc.root().is_some() => {
                    let graph = doc.to_flattened()?;
                    tracing::debug!(nodes = graph.types.len(), "seeding crdt document");
                    let mut txn = shared
                        .ydoc
                        .try_transact_mut_with(shared.origin.clone())
                        .map_err(|_| SyncError::Busy)?;
                    write_graph(&mut txn, &shared.doc_map, &graph);
                }
                None => {}
            }

            let weak: Weak<Shared> = Rc::downgrade(shared);
            self.listener = Some(doc.on_change(move |doc, batch| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.attached.get() || batch.origin == ChangeOrigin::Remote || shared.synchronizing.get() {
                    return;
                }
                shared.queue.borrow_mut().extend(batch.changes.iter().cloned());
                shared.phase.set(SyncPhase::Batching);
                if let Err(err) = shared.flush(doc) {
                    tracing::debug!(error = %err, "deferring flush");
                }
            }));
        }

        let weak_shared = Rc::downgrade(shared);
        let weak_document = Rc::downgrade(&self.document);
        self.subscription = Some(shared.doc_map.observe_deep(move |txn, events| {
            let (Some(shared), Some(document)) = (weak_shared.upgrade(), weak_document.upgrade()) else {
                return;
            };
            shared.replay(&document, txn, events);
        }));
        Ok(())
    }

    pub fn document(&self) -> &Rc<RefCell<Document>> {
        &self.document
    }

    pub fn ydoc(&self) -> &Doc {
        &self.shared.ydoc
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.phase.get()
    }

    /// Number of local changes waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    /// Retry writing changes that were queued while the CRDT document was
    /// busy.
    pub fn flush(&self) -> Result<(), SyncError> {
        let doc = self.document.try_borrow().map_err(|_| SyncError::Busy)?;
        self.shared.flush(&doc)
    }

    /// Encoded state vector of the CRDT document.
    pub fn state_vector(&self) -> Result<Vec<u8>, SyncError> {
        let txn = self.shared.ydoc.try_transact().map_err(|_| SyncError::Busy)?;
        Ok(txn.state_vector().encode_v1())
    }

    /// Update carrying everything the peer behind `state_vector` lacks.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>, SyncError> {
        let state_vector = StateVector::decode_v1(state_vector).map_err(|err| SyncError::Decode(err.to_string()))?;
        let txn = self.shared.ydoc.try_transact().map_err(|_| SyncError::Busy)?;
        Ok(txn.encode_state_as_update_v1(&state_vector))
    }

    /// Full CRDT state as a single update.
    pub fn encode_state(&self) -> Result<Vec<u8>, SyncError> {
        let txn = self.shared.ydoc.try_transact().map_err(|_| SyncError::Busy)?;
        Ok(txn.encode_state_as_update_v1(&StateVector::default()))
    }

    /// Apply a peer's update. The resulting events are replayed into the
    /// document before this returns.
    pub fn apply_update(&self, update: &[u8]) -> Result<(), SyncError> {
        let update = Update::decode_v1(update).map_err(|err| SyncError::Decode(err.to_string()))?;
        let mut txn = self.shared.ydoc.try_transact_mut().map_err(|_| SyncError::Busy)?;
        txn.apply_update(update).map_err(|err| SyncError::Apply(err.to_string()))?;
        Ok(())
    }

    /// Detach both directions. Further changes on either side are not
    /// propagated.
    pub fn dispose(&mut self) {
        self.shared.attached.set(false);
        self.subscription = None;
        if let Some(listener) = self.listener.take() {
            match self.document.try_borrow_mut() {
                Ok(mut doc) => {
                    doc.off_change(listener);
                }
                Err(_) => tracing::debug!("document is borrowed; leaving an inert listener registered"),
            }
        }
        self.shared.queue.borrow_mut().clear();
        self.shared.phase.set(SyncPhase::Idle);
    }
}

impl Drop for SyncProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SyncProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProvider")
            .field("client_id", &self.shared.ydoc.client_id())
            .field("phase", &self.shared.phase.get())
            .field("pending", &self.shared.queue.borrow().len())
            .finish_non_exhaustive()
    }
}
