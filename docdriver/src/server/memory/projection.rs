use crate::collection::Document;
use crate::common::DOC_ID;
use crate::errors::{DriverError, DriverResult, ErrorKind};

/// Restricts `document` to the fields selected by `projection`.
///
/// Either every non-`_id` field is included (`{a: 1}`) or every one is
/// excluded (`{a: 0}`); `_id` is kept unless explicitly excluded.
pub(crate) fn project(document: &Document, projection: &Document) -> DriverResult<Document> {
    if projection.is_empty() {
        return Ok(document.clone());
    }

    let keep_id = projection.get(DOC_ID).map(|v| v.is_truthy()).unwrap_or(true);
    let fields: Vec<(&String, bool)> = projection
        .iter()
        .filter(|(k, _)| k.as_str() != DOC_ID)
        .map(|(k, v)| (k, v.is_truthy()))
        .collect();

    let inclusive = fields.iter().filter(|(_, include)| *include).count();
    if inclusive > 0 && inclusive != fields.len() {
        log::error!("Projection cannot mix inclusion and exclusion");
        return Err(DriverError::new(
            "Projection cannot mix inclusion and exclusion",
            ErrorKind::InvalidQuery,
        ));
    }

    let mut result = if inclusive > 0 {
        let mut selected = Document::new();
        for (path, _) in &fields {
            if let Some(value) = document.get_path(path) {
                selected.set_path(path, value.clone())?;
            }
        }
        if let Some(id) = document.id() {
            selected.put(DOC_ID, id.clone())?;
        }
        selected
    } else {
        let mut remaining = document.clone();
        for (path, _) in &fields {
            remaining.remove_path(path);
        }
        remaining
    };

    if !keep_id {
        result.remove(DOC_ID);
    }
    Ok(result)
}
