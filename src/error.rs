//! Error types for marshalling and database-layer failures.

use bson::Bson;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by collection operations.
///
/// There are two classes: marshalling errors (`Encode`, `Decode`) raised
/// when a record type and a document disagree, and database-layer errors
/// raised by the collection engine itself. A filter that matches nothing is
/// not an error; reads report that as `None` or an empty cursor.
#[derive(Error, Debug)]
pub enum Error {
    /// A record value could not be serialized into a document.
    #[error("failed to encode `{type_name}` into a document: {source}")]
    Encode {
        /// Name of the record type being serialized.
        type_name: &'static str,
        /// Underlying serializer error.
        #[source]
        source: bson::ser::Error,
    },

    /// A document could not be deserialized into the target record type,
    /// e.g. a required field is missing or has a mismatched type.
    #[error("failed to decode document into `{type_name}`: {source}")]
    Decode {
        /// Name of the record type being deserialized.
        type_name: &'static str,
        /// Underlying deserializer error.
        #[source]
        source: bson::de::Error,
    },

    /// The filter document is malformed (unknown operator, wrong operand shape).
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The update document is malformed (non-operator top-level key, bad operand).
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// An aggregation stage is unknown or its specification is malformed.
    #[error("invalid aggregation stage `{stage}`: {reason}")]
    InvalidPipeline {
        /// The offending stage name.
        stage: String,
        /// Why the stage was rejected.
        reason: String,
    },

    /// An insert would create a second document with the same `_id`.
    #[error("duplicate key: a document with _id {0} already exists")]
    DuplicateKey(Bson),

    /// A `$regex` operand failed to compile.
    #[error("invalid regular expression in filter: {0}")]
    Regex(#[from] regex::Error),
}

impl Error {
    pub(crate) fn encode<T>(source: bson::ser::Error) -> Self {
        Error::Encode {
            type_name: std::any::type_name::<T>(),
            source,
        }
    }

    pub(crate) fn decode<T>(source: bson::de::Error) -> Self {
        Error::Decode {
            type_name: std::any::type_name::<T>(),
            source,
        }
    }

    /// True for the marshalling class of errors (`Encode` / `Decode`).
    pub fn is_marshalling(&self) -> bool {
        matches!(self, Error::Encode { .. } | Error::Decode { .. })
    }
}
