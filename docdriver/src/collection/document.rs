use im::OrdMap;
use smallvec::SmallVec;

use crate::common::{Value, DOC_ID};
use crate::errors::{DriverError, DriverResult, ErrorKind};
use std::fmt::{Debug, Display};

/// Separator used by the `*_path` accessors to reach into embedded documents.
pub const FIELD_SEPARATOR: char = '.';

type PathVec<'a> = SmallVec<[&'a str; 4]>;

/// A document: an ordered map of field names to [Value]s.
///
/// Keys are stored literally, so a query such as `{"a.b": 1}` keeps its dotted
/// key intact. The `*_path` accessors interpret dots as steps into embedded
/// documents, which is what query matching and update operators need.
///
/// Backed by `im::OrdMap`, so cloning a document is O(1) and the in-memory
/// server can hand out snapshots without copying.
#[derive(Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Document {
    data: OrdMap<String, Value>,
}

impl Document {
    /// Creates a new empty document.
    pub fn new() -> Self {
        Document { data: OrdMap::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with the literal field `key`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the key is empty.
    pub fn put<T: Into<Value>>(&mut self, key: &str, value: T) -> DriverResult<()> {
        if key.is_empty() {
            log::error!("Document does not support empty key");
            return Err(DriverError::new(
                "Document does not support empty key",
                ErrorKind::ValidationError,
            ));
        }
        self.data.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Returns the value of the literal field `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the `_id` of the document, if it has one.
    pub fn id(&self) -> Option<&Value> {
        self.data.get(DOC_ID)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Resolves a dotted path through embedded documents.
    ///
    /// ```ignore
    /// let doc = doc! { "a": { "b": 1 } };
    /// assert_eq!(doc.get_path("a.b"), Some(&Value::I32(1)));
    /// ```
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let steps: PathVec = path.split(FIELD_SEPARATOR).collect();
        let (last, parents) = steps.split_last()?;
        let mut current = self;
        for step in parents {
            current = current.data.get(*step)?.as_document()?;
        }
        current.data.get(*last)
    }

    /// Sets the value at a dotted path, creating embedded documents as needed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUpdate` if an intermediate field exists and is not a document.
    pub fn set_path<T: Into<Value>>(&mut self, path: &str, value: T) -> DriverResult<()> {
        match path.split_once(FIELD_SEPARATOR) {
            None => self.put(path, value),
            Some((head, rest)) => {
                let mut child = match self.data.get(head) {
                    Some(Value::Document(d)) => d.clone(),
                    Some(Value::Null) | None => Document::new(),
                    Some(other) => {
                        log::error!("Cannot create field '{}' in element {{{}: {}}}", rest, head, other);
                        return Err(DriverError::new(
                            &format!("Cannot create field '{}' in element {{{}: {}}}", rest, head, other),
                            ErrorKind::InvalidUpdate,
                        ));
                    }
                };
                child.set_path(rest, value)?;
                self.put(head, child)
            }
        }
    }

    /// Removes the value at a dotted path. Missing intermediate documents are ignored.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        match path.split_once(FIELD_SEPARATOR) {
            None => self.remove(path),
            Some((head, rest)) => {
                let mut child = self.data.get(head)?.as_document()?.clone();
                let removed = child.remove_path(rest);
                if removed.is_some() {
                    self.data.insert(head.to_string(), Value::Document(child));
                }
                removed
            }
        }
    }

    /// Copies every field of `other` into this document, overwriting existing ones.
    pub fn merge(&mut self, other: &Document) {
        for (k, v) in other.iter() {
            self.data.insert(k.clone(), v.clone());
        }
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Document {
            data: iter.into_iter().collect(),
        }
    }
}

/// Strips the quotes `stringify!` leaves around string-literal keys.
#[doc(hidden)]
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] from a JSON-like literal.
///
/// ```ignore
/// let doc = doc! {
///     "a": "a",
///     "$set": { "b": "c" },
///     "tags": ["x", "y"],
/// };
/// ```
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::collection::Document::new()
    };

    () => {
        $crate::collection::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            let mut doc = $crate::collection::Document::new();
            $(
                doc.put(&$crate::collection::normalize(stringify!($key)), $crate::doc_value!($value))
                .expect(&format!("Failed to put value {} in document", stringify!($value)));
            )*
            doc
        }
    };
}

/// Helper macro converting values for [doc!]: nested documents, arrays and expressions.
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}
