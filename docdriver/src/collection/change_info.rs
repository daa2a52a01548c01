use crate::common::Value;

/// Outcome of a multi-document write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeInfo {
    /// Documents matched by the selector
    pub matched: u64,
    /// Documents actually modified
    pub updated: u64,
    /// Documents removed
    pub removed: u64,
    /// `_id` of the document an upsert inserted
    pub upserted_id: Option<Value>,
}
