use crate::collection::Document;
use crate::common::Value;

/// An upserted document reported by an `update` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    /// Position of the update statement that inserted the document.
    pub index: usize,
    pub id: Value,
}

/// Structured reply of the command-execution layer.
///
/// For writes, `n` counts matched (update) or affected (insert/delete)
/// documents and `n_modified` counts documents actually changed. For `find`,
/// `documents` holds the result set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub n: u64,
    pub n_modified: u64,
    pub upserted: Vec<Upserted>,
    pub documents: Vec<Document>,
}

impl Reply {
    /// A bare acknowledgement.
    pub fn ok() -> Self {
        Reply::default()
    }

    pub fn with_n(n: u64) -> Self {
        Reply {
            n,
            ..Reply::default()
        }
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        Reply {
            n: documents.len() as u64,
            documents,
            ..Reply::default()
        }
    }

    /// Id of the first upserted document, if any.
    pub fn upserted_id(&self) -> Option<&Value> {
        self.upserted.first().map(|u| &u.id)
    }
}
