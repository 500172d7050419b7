use crate::error::Result;
use crate::wire::{Readable, StreamInput, StreamOutput, Writeable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one document independently of any query
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    /// Collection (index) the document lives in
    pub collection: String,
    /// Document identifier within the collection
    pub doc_id: String,
}

impl DocumentKey {
    pub fn new(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.doc_id)
    }
}

impl Writeable for DocumentKey {
    fn write_to(&self, out: &mut StreamOutput) {
        out.write_string(&self.collection);
        out.write_string(&self.doc_id);
    }
}

impl Readable for DocumentKey {
    fn read_from(input: &mut StreamInput) -> Result<Self> {
        let collection = input.read_string()?;
        let doc_id = input.read_string()?;
        Ok(Self { collection, doc_id })
    }
}
