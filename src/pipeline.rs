//! Builder for aggregation pipelines.
//!
//! Stages are plain documents, so anything the builder does not cover can
//! be appended with [`Pipeline::stage`].

use bson::{doc, Document};

/// An ordered sequence of aggregation stages.
///
/// # Example
///
/// ```
/// use odmap::{doc, Pipeline};
///
/// let pipeline = Pipeline::new()
///     .match_stage(doc! { "status": "active" })
///     .group(doc! { "_id": "$team", "total": { "$sum": "$points" } })
///     .sort(doc! { "total": -1 })
///     .limit(10);
/// assert_eq!(pipeline.stages().len(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Document>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `$match` stage filtering documents with query syntax.
    pub fn match_stage(mut self, filter: Document) -> Self {
        self.stages.push(doc! { "$match": filter });
        self
    }

    /// Appends a `$group` stage. The spec must carry an `_id` key
    /// expression; the remaining fields are accumulator documents.
    pub fn group(mut self, spec: Document) -> Self {
        self.stages.push(doc! { "$group": spec });
        self
    }

    /// Appends a `$project` stage reshaping each document.
    pub fn project(mut self, spec: Document) -> Self {
        self.stages.push(doc! { "$project": spec });
        self
    }

    /// Appends a `$sort` stage; each key maps to `1` or `-1`.
    pub fn sort(mut self, spec: Document) -> Self {
        self.stages.push(doc! { "$sort": spec });
        self
    }

    /// Appends a `$limit` stage.
    pub fn limit(mut self, n: i64) -> Self {
        self.stages.push(doc! { "$limit": n });
        self
    }

    /// Appends a `$skip` stage.
    pub fn skip(mut self, n: i64) -> Self {
        self.stages.push(doc! { "$skip": n });
        self
    }

    /// Appends a `$count` stage emitting a single document with the tally
    /// under `field`.
    pub fn count(mut self, field: &str) -> Self {
        self.stages.push(doc! { "$count": field });
        self
    }

    /// Appends a raw stage document.
    pub fn stage(mut self, stage: Document) -> Self {
        self.stages.push(stage);
        self
    }

    /// The accumulated stages, in order.
    pub fn stages(&self) -> &[Document] {
        &self.stages
    }
}

impl IntoIterator for Pipeline {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.into_iter()
    }
}

impl From<Pipeline> for Vec<Document> {
    fn from(pipeline: Pipeline) -> Self {
        pipeline.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_stage_order() {
        let pipeline = Pipeline::new()
            .match_stage(doc! { "a": 1 })
            .group(doc! { "_id": "$a", "n": { "$sum": 1 } })
            .sort(doc! { "n": -1 })
            .skip(2)
            .limit(5)
            .count("total");
        let stages: Vec<Document> = pipeline.into();
        assert_eq!(stages.len(), 6);
        assert!(stages[0].contains_key("$match"));
        assert!(stages[1].contains_key("$group"));
        assert!(stages[2].contains_key("$sort"));
        assert!(stages[3].contains_key("$skip"));
        assert!(stages[4].contains_key("$limit"));
        assert_eq!(stages[5].get_str("$count").unwrap(), "total");
    }
}
