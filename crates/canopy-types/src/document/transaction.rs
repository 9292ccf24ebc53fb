use std::ops::{Deref, DerefMut};

use super::{ChangeOrigin, Document};

/// Batching scope over a [`Document`].
///
/// Every change made through the guard (or through nested guards) is
/// delivered to listeners as a single batch when the outermost guard drops.
pub struct Transaction<'a> {
    document: &'a mut Document,
}

impl<'a> Transaction<'a> {
    pub(super) fn begin(document: &'a mut Document, origin: Option<ChangeOrigin>) -> Self {
        document.begin_batch(origin);
        Self { document }
    }
}

impl Deref for Transaction<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.document
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.document
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.document.end_batch();
    }
}

impl Document {
    pub fn transaction(&mut self) -> Transaction<'_> {
        Transaction::begin(self, None)
    }

    /// Like [`Document::transaction`], tagging the batch with `origin`. Only
    /// the outermost scope decides the origin.
    pub fn transaction_with_origin(&mut self, origin: ChangeOrigin) -> Transaction<'_> {
        Transaction::begin(self, Some(origin))
    }

    /// Run `f` inside one transaction.
    pub fn change<T>(&mut self, f: impl FnOnce(&mut Document) -> T) -> T {
        let mut tx = self.transaction();
        f(&mut tx)
    }
}
