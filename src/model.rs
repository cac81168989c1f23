//! Active-record style convenience on top of the typed wrapper.

use bson::{doc, Bson};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collection::UpdateOptions;
use crate::error::{Error, Result};
use crate::results::{DeleteResult, UpdateResult};
use crate::store::Database;
use crate::typed::TypedCollection;

/// A record type that knows its collection and its identity.
///
/// Implementors get `save` and `remove` keyed on `_id`, plus a shortcut to
/// the typed collection. `save` upserts, so an instance not yet in the
/// collection is inserted.
///
/// # Example
///
/// ```
/// use odmap::{doc, Bson, Model, Store};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct User {
///     #[serde(rename = "_id")]
///     id: i64,
///     name: String,
/// }
///
/// impl Model for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///     fn id(&self) -> Bson {
///         Bson::Int64(self.id)
///     }
/// }
///
/// let store = Store::new();
/// let db = store.database("app");
/// let user = User { id: 1, name: "alice".into() };
/// user.save(&db).unwrap();
/// assert_eq!(User::collection(&db).count_documents(doc! {}).unwrap(), 1);
/// ```
pub trait Model: Serialize + DeserializeOwned {
    /// Name of the collection instances live in.
    fn collection_name() -> &'static str;

    /// The `_id` value identifying this instance.
    fn id(&self) -> Bson;

    /// The typed collection for this model within `db`.
    fn collection(db: &Database) -> TypedCollection<Self>
    where
        Self: Sized,
    {
        db.collection(Self::collection_name()).typed()
    }

    /// Writes this instance to the collection: an update of the document
    /// with this `_id`, inserting it when absent.
    fn save(&self, db: &Database) -> Result<UpdateResult>
    where
        Self: Sized,
    {
        let mut fields = bson::to_document(self).map_err(Error::encode::<Self>)?;
        fields.remove("_id");
        db.collection(Self::collection_name()).update_one_with_options(
            doc! { "_id": self.id() },
            doc! { "$set": fields },
            UpdateOptions { upsert: true },
        )
    }

    /// Deletes the document with this instance's `_id`.
    fn remove(&self, db: &Database) -> Result<DeleteResult>
    where
        Self: Sized,
    {
        db.collection(Self::collection_name())
            .delete_one(doc! { "_id": self.id() })
    }
}
