//! Document-level collection operations.
//!
//! A [`Collection`] is a handle to one namespace of the store. Everything
//! here works on raw documents; the typed layer in [`crate::typed`] sits
//! on top.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bson::oid::ObjectId;
use bson::{Bson, Document};
use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::aggregate;
use crate::cursor::{RawCursor, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::filter;
use crate::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use crate::typed::TypedCollection;
use crate::update;
use crate::utils::{documents_equal, values_equal};

/// Options for find operations.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort specification applied before skip/limit; keys map to `1` or `-1`.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Cursor batch size; defaults to [`DEFAULT_BATCH_SIZE`].
    pub batch_size: Option<usize>,
}

/// Options for update operations.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Insert a document synthesized from the filter and update when the
    /// filter matches nothing.
    pub upsert: bool,
}

/// A handle to one collection of documents.
///
/// Handles are cheap to clone and share the underlying data. Each call is
/// an independent, synchronous request; the handle keeps no state across
/// calls.
#[derive(Debug, Clone)]
pub struct Collection {
    namespace: String,
    data: Arc<RwLock<Vec<Document>>>,
}

impl Collection {
    pub(crate) fn new(namespace: String, data: Arc<RwLock<Vec<Document>>>) -> Self {
        Collection { namespace, data }
    }

    /// The full `database.collection` namespace of this handle.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Binds a record type to this handle.
    pub fn typed<T: Serialize + DeserializeOwned>(&self) -> TypedCollection<T> {
        TypedCollection::new(self.clone())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Document>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Document>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts one document, assigning a fresh `ObjectId` under `_id` when
    /// the document does not carry one.
    pub fn insert_one(&self, mut doc: Document) -> Result<InsertOneResult> {
        let id = ensure_id(&mut doc);
        let mut docs = self.write();
        check_duplicate(&docs, &id)?;
        docs.push(doc);
        debug!("{}: inserted document with _id {}", self.namespace, id);
        Ok(InsertOneResult { inserted_id: id })
    }

    /// Inserts a batch of documents. Ids are assigned and checked for the
    /// whole batch before anything is written, so a duplicate key leaves
    /// the collection untouched.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyResult> {
        let mut prepared = docs;
        let mut ids = Vec::with_capacity(prepared.len());
        for doc in &mut prepared {
            ids.push(ensure_id(doc));
        }

        let mut existing = self.write();
        for (index, id) in ids.iter().enumerate() {
            check_duplicate(&existing, id)?;
            if ids[..index].iter().any(|earlier| values_equal(earlier, id)) {
                return Err(Error::DuplicateKey(id.clone()));
            }
        }
        let inserted_count = prepared.len() as u64;
        existing.extend(prepared);
        debug!("{}: inserted {} documents", self.namespace, inserted_count);
        Ok(InsertManyResult {
            inserted_count,
            inserted_ids: ids,
        })
    }

    /// Finds all documents matching `filter`.
    pub fn find(&self, filter: Document) -> Result<RawCursor> {
        self.find_with_options(filter, FindOptions::default())
    }

    /// Finds matching documents with sort, skip, limit, and batch size
    /// applied in that order.
    pub fn find_with_options(&self, filter: Document, options: FindOptions) -> Result<RawCursor> {
        let mut matched = {
            let docs = self.read();
            let mut matched = Vec::new();
            for doc in docs.iter() {
                if filter::matches(doc, &filter)? {
                    matched.push(doc.clone());
                }
            }
            matched
        };
        if let Some(sort) = &options.sort {
            aggregate::sort_documents(&mut matched, sort)?;
        }
        if let Some(skip) = options.skip {
            matched = if skip >= matched.len() {
                Vec::new()
            } else {
                matched.split_off(skip)
            };
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }
        trace!("{}: find matched {} documents", self.namespace, matched.len());
        Ok(RawCursor::new(
            matched,
            options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        ))
    }

    /// Returns the first document matching `filter`, if any.
    pub fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        let docs = self.read();
        for doc in docs.iter() {
            if filter::matches(doc, &filter)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    /// Removes and returns the first document matching `filter`.
    pub fn find_one_and_delete(&self, filter: Document) -> Result<Option<Document>> {
        let mut docs = self.write();
        match position(&docs, &filter)? {
            Some(index) => {
                let removed = docs.remove(index);
                debug!("{}: deleted one document", self.namespace);
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    }

    /// Replaces the first document matching `filter` and returns the prior
    /// document. The stored `_id` is preserved; a replacement carrying a
    /// different `_id` is rejected.
    pub fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
    ) -> Result<Option<Document>> {
        let mut docs = self.write();
        match position(&docs, &filter)? {
            Some(index) => {
                let previous = docs[index].clone();
                let id = previous.get("_id").cloned().unwrap_or(Bson::Null);
                docs[index] = replacement_with_id(id, replacement)?;
                debug!("{}: replaced one document", self.namespace);
                Ok(Some(previous))
            }
            None => Ok(None),
        }
    }

    /// Replaces the first document matching `filter`, reporting matched
    /// and modified counts.
    pub fn replace_one(&self, filter: Document, replacement: Document) -> Result<UpdateResult> {
        let mut docs = self.write();
        match position(&docs, &filter)? {
            Some(index) => {
                let id = docs[index].get("_id").cloned().unwrap_or(Bson::Null);
                let staged = replacement_with_id(id, replacement)?;
                let modified = !documents_equal(&staged, &docs[index]);
                docs[index] = staged;
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: u64::from(modified),
                    upserted_id: None,
                })
            }
            None => Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            }),
        }
    }

    /// Applies an update document to the first match.
    pub fn update_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.update_one_with_options(filter, update, UpdateOptions::default())
    }

    /// Applies an update document to the first match, optionally upserting.
    pub fn update_one_with_options(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        update::validate(&update)?;
        let mut docs = self.write();
        if let Some(index) = position(&docs, &filter)? {
            let changed = update::apply_update(&mut docs[index], &update)?;
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(changed),
                upserted_id: None,
            });
        }
        if !options.upsert {
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            });
        }
        let mut synthesized = update::synthesize_upsert(&filter, &update)?;
        let id = ensure_id(&mut synthesized);
        check_duplicate(&docs, &id)?;
        docs.push(synthesized);
        debug!("{}: upserted document with _id {}", self.namespace, id);
        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    /// Applies an update document to every match.
    pub fn update_many(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        update::validate(&update)?;
        let mut docs = self.write();
        let mut matched = 0;
        let mut modified = 0;
        for doc in docs.iter_mut() {
            if filter::matches(doc, &filter)? {
                matched += 1;
                if update::apply_update(doc, &update)? {
                    modified += 1;
                }
            }
        }
        Ok(UpdateResult {
            matched_count: matched,
            modified_count: modified,
            upserted_id: None,
        })
    }

    /// Removes the first document matching `filter`.
    pub fn delete_one(&self, filter: Document) -> Result<DeleteResult> {
        let deleted = self.find_one_and_delete(filter)?.is_some();
        Ok(DeleteResult {
            deleted_count: u64::from(deleted),
        })
    }

    /// Removes every document matching `filter`. The empty filter clears
    /// the collection.
    pub fn delete_many(&self, filter: Document) -> Result<DeleteResult> {
        let mut docs = self.write();
        let mut kept = Vec::with_capacity(docs.len());
        let mut deleted = 0;
        for doc in docs.drain(..) {
            if filter::matches(&doc, &filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        *docs = kept;
        if deleted > 0 {
            debug!("{}: deleted {} documents", self.namespace, deleted);
        }
        Ok(DeleteResult {
            deleted_count: deleted,
        })
    }

    /// Counts documents matching `filter`.
    pub fn count_documents(&self, filter: Document) -> Result<u64> {
        let docs = self.read();
        let mut count = 0;
        for doc in docs.iter() {
            if filter::matches(doc, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Drops every document in the collection.
    pub fn drop(&self) {
        let mut docs = self.write();
        docs.clear();
        debug!("{}: dropped", self.namespace);
    }

    /// Runs an aggregation pipeline over a snapshot of the collection.
    pub fn aggregate(&self, pipeline: impl IntoIterator<Item = Document>) -> Result<RawCursor> {
        let stages: Vec<Document> = pipeline.into_iter().collect();
        let snapshot = self.read().clone();
        let results = aggregate::run_pipeline(snapshot, &stages)?;
        trace!(
            "{}: aggregation produced {} documents",
            self.namespace,
            results.len()
        );
        Ok(RawCursor::new(results, DEFAULT_BATCH_SIZE))
    }
}

fn ensure_id(doc: &mut Document) -> Bson {
    match doc.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            doc.insert("_id", id.clone());
            id
        }
    }
}

fn check_duplicate(docs: &[Document], id: &Bson) -> Result<()> {
    for doc in docs {
        if doc.get("_id").is_some_and(|existing| values_equal(existing, id)) {
            return Err(Error::DuplicateKey(id.clone()));
        }
    }
    Ok(())
}

fn position(docs: &[Document], filter: &Document) -> Result<Option<usize>> {
    for (index, doc) in docs.iter().enumerate() {
        if filter::matches(doc, filter)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn replacement_with_id(id: Bson, replacement: Document) -> Result<Document> {
    if let Some(supplied) = replacement.get("_id") {
        if !values_equal(supplied, &id) {
            return Err(Error::InvalidUpdate(
                "the _id field is immutable and cannot be replaced".into(),
            ));
        }
    }
    let mut staged = Document::new();
    staged.insert("_id", id);
    for (key, value) in replacement.iter() {
        if key != "_id" {
            staged.insert(key.as_str(), value.clone());
        }
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use crate::store::Store;

    use super::*;

    fn collection() -> Collection {
        Store::new().database("testdb").collection("testcollection")
    }

    #[test]
    fn insert_assigns_object_ids() {
        let coll = collection();
        let result = coll.insert_one(doc! { "a": 1 }).unwrap();
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

        let stored = coll.find_one(doc! { "a": 1 }).unwrap().unwrap();
        assert_eq!(stored.get("_id"), Some(&result.inserted_id));
    }

    #[test]
    fn explicit_ids_are_kept_and_deduplicated() {
        let coll = collection();
        coll.insert_one(doc! { "_id": 7, "a": 1 }).unwrap();
        let err = coll.insert_one(doc! { "_id": 7, "a": 2 }).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 1);
    }

    #[test]
    fn insert_many_is_all_or_nothing_on_duplicates() {
        let coll = collection();
        let err = coll
            .insert_many(vec![doc! { "_id": 1 }, doc! { "_id": 1 }])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 0);
    }

    #[test]
    fn find_with_sort_skip_limit() {
        let coll = collection();
        for n in [5, 3, 1, 4, 2] {
            coll.insert_one(doc! { "n": n }).unwrap();
        }
        let options = FindOptions {
            sort: Some(doc! { "n": 1 }),
            skip: Some(1),
            limit: Some(2),
            batch_size: Some(1),
        };
        let values: Vec<i32> = coll
            .find_with_options(doc! {}, options)
            .unwrap()
            .map(|d| d.get_i32("n").unwrap())
            .collect();
        assert_eq!(values, vec![2, 3]);
    }

    #[test]
    fn replace_preserves_id_and_counts_real_changes() {
        let coll = collection();
        let inserted = coll.insert_one(doc! { "a": 1, "b": 2 }).unwrap();

        let unchanged = coll
            .replace_one(doc! { "a": 1 }, doc! { "a": 1, "b": 2 })
            .unwrap();
        assert_eq!(unchanged.matched_count, 1);
        assert_eq!(unchanged.modified_count, 0);

        let changed = coll
            .replace_one(doc! { "a": 1 }, doc! { "a": 1, "b": 99 })
            .unwrap();
        assert_eq!(changed.modified_count, 1);

        let stored = coll.find_one(doc! { "b": 99 }).unwrap().unwrap();
        assert_eq!(stored.get("_id"), Some(&inserted.inserted_id));
    }

    #[test]
    fn replace_rejects_new_id() {
        let coll = collection();
        coll.insert_one(doc! { "_id": 1, "a": 1 }).unwrap();
        let err = coll
            .replace_one(doc! { "a": 1 }, doc! { "_id": 2, "a": 1 })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUpdate(_)));
    }

    #[test]
    fn update_one_upserts_when_asked() {
        let coll = collection();
        let plain = coll
            .update_one(doc! { "name": "ghost" }, doc! { "$set": { "seen": true } })
            .unwrap();
        assert_eq!(plain.matched_count, 0);
        assert!(plain.upserted_id.is_none());
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 0);

        let upserted = coll
            .update_one_with_options(
                doc! { "name": "ghost" },
                doc! { "$set": { "seen": true } },
                UpdateOptions { upsert: true },
            )
            .unwrap();
        assert!(upserted.upserted_id.is_some());
        let stored = coll.find_one(doc! { "name": "ghost" }).unwrap().unwrap();
        assert_eq!(stored.get_bool("seen").unwrap(), true);
    }

    #[test]
    fn update_many_touches_every_match() {
        let coll = collection();
        for i in 0..4 {
            coll.insert_one(doc! { "group": i % 2, "hits": 0 }).unwrap();
        }
        let result = coll
            .update_many(doc! { "group": 0 }, doc! { "$inc": { "hits": 1 } })
            .unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);
        assert_eq!(coll.count_documents(doc! { "hits": 1 }).unwrap(), 2);
    }

    #[test]
    fn delete_many_with_empty_filter_clears() {
        let coll = collection();
        for i in 0..3 {
            coll.insert_one(doc! { "i": i }).unwrap();
        }
        let result = coll.delete_many(doc! {}).unwrap();
        assert_eq!(result.deleted_count, 3);
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 0);
    }

    #[test]
    fn drop_empties_the_collection() {
        let coll = collection();
        coll.insert_one(doc! { "x": 1 }).unwrap();
        coll.drop();
        assert_eq!(coll.count_documents(doc! {}).unwrap(), 0);
    }

    #[test]
    fn filter_errors_surface_from_the_call() {
        let coll = collection();
        coll.insert_one(doc! { "x": 1 }).unwrap();
        assert!(coll.find(doc! { "x": { "$bogus": 1 } }).is_err());
        assert!(coll.count_documents(doc! { "$weird": [] }).is_err());
    }
}
