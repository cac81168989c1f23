//! The in-memory store and its database/collection handle chain.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bson::Document;
use log::debug;

use crate::collection::Collection;

type CollectionData = Arc<RwLock<Vec<Document>>>;

/// An in-memory document store.
///
/// The store is a namespace registry: each `database.collection` pair maps
/// to one shared document vector. Handles are cheap clones; every handle
/// for a namespace observes the same data.
///
/// # Example
///
/// ```
/// use odmap::{doc, Store};
///
/// let store = Store::new();
/// let coll = store.database("testdb").collection("testcollection");
/// coll.insert_one(doc! { "a": 1 }).unwrap();
/// assert_eq!(coll.count_documents(doc! {}).unwrap(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Store {
    namespaces: Arc<RwLock<HashMap<String, CollectionData>>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the named database, creating nothing yet;
    /// namespaces materialize on first collection access.
    pub fn database(&self, name: &str) -> Database {
        Database {
            store: self.clone(),
            name: name.to_string(),
        }
    }

    fn namespace(&self, namespace: &str) -> CollectionData {
        let mut namespaces = self
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| {
                debug!("creating namespace {}", namespace);
                Arc::new(RwLock::new(Vec::new()))
            })
            .clone()
    }
}

/// A handle to one named database within a [`Store`].
#[derive(Debug, Clone)]
pub struct Database {
    store: Store,
    name: String,
}

impl Database {
    /// The database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a handle to the named collection.
    pub fn collection(&self, name: &str) -> Collection {
        let namespace = format!("{}.{}", self.name, name);
        let data = self.store.namespace(&namespace);
        Collection::new(namespace, data)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn handles_for_one_namespace_share_data() {
        let store = Store::new();
        let a = store.database("db").collection("things");
        let b = store.database("db").collection("things");
        a.insert_one(doc! { "x": 1 }).unwrap();
        assert_eq!(b.count_documents(doc! {}).unwrap(), 1);
    }

    #[test]
    fn namespaces_are_isolated() {
        let store = Store::new();
        let things = store.database("db").collection("things");
        let others = store.database("db").collection("others");
        let elsewhere = store.database("other_db").collection("things");
        things.insert_one(doc! { "x": 1 }).unwrap();
        assert_eq!(others.count_documents(doc! {}).unwrap(), 0);
        assert_eq!(elsewhere.count_documents(doc! {}).unwrap(), 0);
    }
}
