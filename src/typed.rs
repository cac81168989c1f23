//! The typed collection wrapper.
//!
//! [`TypedCollection`] binds a record type to a [`Collection`] handle and
//! forwards every operation, encoding arguments into documents and
//! decoding results back. It holds no state of its own beyond the handle.

use std::marker::PhantomData;

use bson::Document;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collection::{Collection, FindOptions, UpdateOptions};
use crate::cursor::DeserializingCursor;
use crate::error::{Error, Result};
use crate::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};

/// A collection view that speaks a record type instead of raw documents.
///
/// # Example
///
/// ```
/// use odmap::{doc, Store, TypedCollection};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct Foo {
///     a: i32,
///     b: i32,
///     c: i32,
/// }
///
/// let store = Store::new();
/// let foos: TypedCollection<Foo> =
///     store.database("testdb").collection("testcollection").typed();
///
/// foos.insert_one(&Foo { a: 1, b: 4, c: 9 }).unwrap();
/// let found = foos.find_one(doc! { "a": 1 }).unwrap();
/// assert_eq!(found, Some(Foo { a: 1, b: 4, c: 9 }));
/// ```
#[derive(Debug, Clone)]
pub struct TypedCollection<T> {
    collection: Collection,
    _record: PhantomData<fn() -> T>,
}

impl<T> TypedCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wraps a raw collection handle.
    pub fn new(collection: Collection) -> Self {
        TypedCollection {
            collection,
            _record: PhantomData,
        }
    }

    /// The underlying raw handle, for document-level operations the typed
    /// surface does not cover.
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    fn encode(value: &T) -> Result<Document> {
        bson::to_document(value).map_err(Error::encode::<T>)
    }

    fn decode(doc: Document) -> Result<T> {
        bson::from_document(doc).map_err(Error::decode::<T>)
    }

    /// Finds matching records; each document is decoded as the cursor is
    /// advanced, so a decode failure surfaces at that item, not eagerly.
    pub fn find(&self, filter: Document) -> Result<DeserializingCursor<T>> {
        Ok(self.collection.find(filter)?.deserializing())
    }

    /// [`find`](Self::find) with sort, skip, limit, and batch size.
    pub fn find_with_options(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> Result<DeserializingCursor<T>> {
        Ok(self
            .collection
            .find_with_options(filter, options)?
            .deserializing())
    }

    /// Decodes the first matching record; `None` when nothing matches.
    pub fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.collection.find_one(filter)?.map(Self::decode).transpose()
    }

    /// Removes the first matching document and decodes it.
    pub fn find_one_and_delete(&self, filter: Document) -> Result<Option<T>> {
        self.collection
            .find_one_and_delete(filter)?
            .map(Self::decode)
            .transpose()
    }

    /// Replaces the first matching document with `replacement` and decodes
    /// the prior document.
    pub fn find_one_and_replace(&self, filter: Document, replacement: &T) -> Result<Option<T>> {
        self.collection
            .find_one_and_replace(filter, Self::encode(replacement)?)?
            .map(Self::decode)
            .transpose()
    }

    /// Serializes and inserts one record.
    pub fn insert_one(&self, value: &T) -> Result<InsertOneResult> {
        self.collection.insert_one(Self::encode(value)?)
    }

    /// Serializes and inserts every record. All elements are encoded
    /// before anything is forwarded, so an encoding failure writes nothing.
    pub fn insert_many<'a, I>(&self, values: I) -> Result<InsertManyResult>
    where
        T: 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let docs: Result<Vec<Document>> = values.into_iter().map(Self::encode).collect();
        self.collection.insert_many(docs?)
    }

    /// Replaces the first matching document with the serialized record.
    pub fn replace_one(&self, filter: Document, replacement: &T) -> Result<UpdateResult> {
        self.collection
            .replace_one(filter, Self::encode(replacement)?)
    }

    /// Applies a raw update document to the first match.
    pub fn update_one(&self, filter: Document, update: Document) -> Result<UpdateResult> {
        self.collection.update_one(filter, update)
    }

    /// [`update_one`](Self::update_one) with upsert control.
    pub fn update_one_with_options(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        self.collection
            .update_one_with_options(filter, update, options)
    }

    /// Removes the first matching document.
    pub fn delete_one(&self, filter: Document) -> Result<DeleteResult> {
        self.collection.delete_one(filter)
    }

    /// Removes every matching document.
    pub fn delete_many(&self, filter: Document) -> Result<DeleteResult> {
        self.collection.delete_many(filter)
    }

    /// Counts matching documents.
    pub fn count_documents(&self, filter: Document) -> Result<u64> {
        self.collection.count_documents(filter)
    }

    /// Runs an aggregation pipeline, decoding each result into `R`, which
    /// may be a different shape from the stored record type.
    pub fn aggregate<R>(
        &self,
        pipeline: impl IntoIterator<Item = Document>,
    ) -> Result<DeserializingCursor<R>>
    where
        R: DeserializeOwned,
    {
        Ok(self.collection.aggregate(pipeline)?.deserializing())
    }
}
