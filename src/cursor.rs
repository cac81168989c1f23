//! Lazy, single-pass cursors over query and aggregation results.

use std::collections::VecDeque;
use std::marker::PhantomData;

use bson::Document;
use log::trace;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Default number of documents pulled per batch, matching the server's
/// first-batch size.
pub const DEFAULT_BATCH_SIZE: usize = 101;

/// A forward-only cursor over raw documents.
///
/// Matched documents are handed out one batch at a time; once consumed the
/// cursor is exhausted and cannot be restarted.
#[derive(Debug)]
pub struct RawCursor {
    batches: VecDeque<Vec<Document>>,
    current: std::vec::IntoIter<Document>,
}

impl RawCursor {
    pub(crate) fn new(docs: Vec<Document>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let mut docs = docs;
        let mut batches = VecDeque::new();
        while docs.len() > batch_size {
            let rest = docs.split_off(batch_size);
            batches.push_back(std::mem::replace(&mut docs, rest));
        }
        batches.push_back(docs);
        RawCursor {
            batches,
            current: Vec::new().into_iter(),
        }
    }

    /// Converts into a cursor that decodes each document into `T`.
    pub fn deserializing<T: DeserializeOwned>(self) -> DeserializingCursor<T> {
        DeserializingCursor {
            raw: self,
            _record: PhantomData,
        }
    }
}

impl Iterator for RawCursor {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        loop {
            if let Some(doc) = self.current.next() {
                return Some(doc);
            }
            let batch = self.batches.pop_front()?;
            trace!("cursor pulled batch of {} documents", batch.len());
            self.current = batch.into_iter();
        }
    }
}

/// A cursor decoding each raw document into a record type on demand.
///
/// Decoding happens at the point a document is produced, so one document
/// the record type cannot represent yields a single `Err` item and
/// iteration continues with the next document.
#[derive(Debug)]
pub struct DeserializingCursor<T> {
    raw: RawCursor,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for DeserializingCursor<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        let doc = self.raw.next()?;
        Some(bson::from_document(doc).map_err(Error::decode::<T>))
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn raw(docs: Vec<Document>, batch_size: usize) -> RawCursor {
        RawCursor::new(docs, batch_size)
    }

    #[test]
    fn yields_all_documents_across_batches() {
        let docs: Vec<Document> = (0..10).map(|i| doc! { "i": i }).collect();
        let cursor = raw(docs, 3);
        assert_eq!(cursor.count(), 10);
    }

    #[test]
    fn empty_cursor_is_empty() {
        assert_eq!(raw(Vec::new(), 101).count(), 0);
    }

    #[test]
    fn decodes_lazily_and_localizes_failures() {
        let docs = vec![
            doc! { "x": 1, "y": 2 },
            doc! { "x": "oops", "y": 2 },
            doc! { "x": 3, "y": 4 },
        ];
        let mut cursor = raw(docs, 2).deserializing::<Point>();

        assert_eq!(cursor.next().unwrap().unwrap(), Point { x: 1, y: 2 });
        let failure = cursor.next().unwrap().unwrap_err();
        assert!(failure.is_marshalling());
        // The bad document does not poison the rest of the stream.
        assert_eq!(cursor.next().unwrap().unwrap(), Point { x: 3, y: 4 });
        assert!(cursor.next().is_none());
    }
}
