use crate::collection::Document;
use crate::common::Value;
use im::OrdMap;
use std::collections::HashMap;

/// Storage key of a document, derived from its `_id`.
///
/// Numeric ids of different widths map to the same key, so `1` and `1i64`
/// address the same document.
pub(crate) fn id_key(id: &Value) -> String {
    match id {
        v if v.is_number() => format!("n:{}", v.as_f64().unwrap_or_default()),
        Value::String(s) => format!("s:{}", s),
        other => format!("{}:{}", other.type_name(), other),
    }
}

/// Committed contents of one namespace.
///
/// `versions` remembers the commit clock of the last write to every key,
/// including removed ones, so transactions can detect write conflicts.
#[derive(Default)]
pub(crate) struct NamespaceData {
    docs: OrdMap<String, Document>,
    versions: HashMap<String, u64>,
}

impl NamespaceData {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the committed documents. O(1).
    pub(crate) fn snapshot(&self) -> OrdMap<String, Document> {
        self.docs.clone()
    }

    pub(crate) fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn apply(&mut self, key: String, document: Option<Document>, version: u64) {
        match document {
            Some(document) => {
                self.docs.insert(key.clone(), document);
            }
            None => {
                self.docs.remove(&key);
            }
        }
        self.versions.insert(key, version);
    }

    pub(crate) fn len(&self) -> usize {
        self.docs.len()
    }
}
