//! odmap: typed object-document mapping.
//!
//! This crate binds plain serde record types to document collections. A
//! [`TypedCollection`] forwards CRUD and aggregation calls to the
//! underlying [`Collection`] handle, encoding typed arguments into BSON
//! documents on the way in and decoding documents back into records on
//! the way out. Multi-document results come back as lazy, single-pass
//! [`DeserializingCursor`]s that decode each document at the point it is
//! produced.
//!
//! The backing [`Store`] is an in-memory collection engine with query
//! filters, update operators, and an aggregation pipeline executor, which
//! makes the whole surface usable without any external service.
//!
//! # Example
//!
//! ```
//! use odmap::{doc, Pipeline, Store};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, PartialEq)]
//! struct Measurement {
//!     sensor: String,
//!     value: i32,
//! }
//!
//! #[derive(Debug, Deserialize)]
//! struct Total {
//!     #[serde(rename = "_id")]
//!     sensor: String,
//!     total: i64,
//! }
//!
//! # fn main() -> odmap::Result<()> {
//! let store = Store::new();
//! let readings = store.database("telemetry").collection("readings").typed();
//!
//! readings.insert_many(&[
//!     Measurement { sensor: "a".into(), value: 3 },
//!     Measurement { sensor: "a".into(), value: 4 },
//!     Measurement { sensor: "b".into(), value: 10 },
//! ])?;
//!
//! let pipeline = Pipeline::new()
//!     .group(doc! { "_id": "$sensor", "total": { "$sum": "$value" } })
//!     .sort(doc! { "_id": 1 });
//! let totals: Vec<Total> = readings.aggregate(pipeline)?.collect::<odmap::Result<_>>()?;
//! assert_eq!(totals[0].total, 7);
//! assert_eq!(totals[1].total, 10);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod aggregate;
mod collection;
mod cursor;
mod error;
mod filter;
mod model;
mod pipeline;
mod results;
mod store;
mod typed;
mod update;
mod utils;

pub use collection::{Collection, FindOptions, UpdateOptions};
pub use cursor::{DeserializingCursor, RawCursor, DEFAULT_BATCH_SIZE};
pub use error::{Error, Result};
pub use model::Model;
pub use pipeline::Pipeline;
pub use results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
pub use store::{Database, Store};
pub use typed::TypedCollection;

// Document format re-exports so callers need not depend on bson directly.
pub use bson::{doc, Bson, Document};
