use crate::collection::Document;
use crate::common::{Value, DOC_ID};
use crate::errors::{DriverError, DriverResult, ErrorKind};

/// Applies an update document to `target`.
///
/// An update made only of `$`-operators (`$set`, `$unset`, `$inc`, `$push`)
/// modifies fields in place; any other document replaces every field except
/// `_id`. Mixing both forms, or changing `_id`, is rejected.
pub(crate) fn apply_update(target: &Document, update: &Document) -> DriverResult<Document> {
    if is_operator_update(update)? {
        apply_operators(target, update)
    } else {
        replace(target, update)
    }
}

/// Builds the document an upsert inserts when its selector matched nothing:
/// the selector's equality fields, then the update applied on top.
pub(crate) fn upsert_seed(selector: &Document, update: &Document) -> DriverResult<Document> {
    let mut seed = Document::new();
    for (key, value) in selector.iter() {
        if key.starts_with('$') {
            continue;
        }
        match value.as_document() {
            Some(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                if let Some(eq) = ops.get("$eq") {
                    seed.set_path(key, eq.clone())?;
                }
            }
            _ => seed.set_path(key, value.clone())?,
        }
    }

    if is_operator_update(update)? {
        apply_operators(&seed, update)
    } else {
        let mut replacement = update.clone();
        if let Some(id) = seed.id() {
            if replacement.id().is_none() {
                replacement.put(DOC_ID, id.clone())?;
            }
        }
        Ok(replacement)
    }
}

fn is_operator_update(update: &Document) -> DriverResult<bool> {
    let operators = update.keys().filter(|k| k.starts_with('$')).count();
    if operators > 0 && operators != update.size() {
        return Err(invalid("Update document mixes operators and fields"));
    }
    Ok(operators > 0)
}

fn replace(target: &Document, replacement: &Document) -> DriverResult<Document> {
    if let (Some(old), Some(new)) = (target.id(), replacement.id()) {
        if old != new {
            return Err(invalid("Cannot change the _id of a document"));
        }
    }
    let mut result = replacement.clone();
    if let Some(id) = target.id() {
        result.put(DOC_ID, id.clone())?;
    }
    Ok(result)
}

fn apply_operators(target: &Document, update: &Document) -> DriverResult<Document> {
    let mut result = target.clone();
    for (op, fields) in update.iter() {
        let fields = match fields.as_document() {
            Some(fields) => fields,
            None => return Err(invalid(&format!("Modifier {} needs a document", op))),
        };
        for (path, operand) in fields.iter() {
            if path == DOC_ID || path.starts_with("_id.") {
                if op != "$set" || result.get_path(path) != Some(operand) {
                    return Err(invalid("Cannot change the _id of a document"));
                }
                continue;
            }
            match op.as_str() {
                "$set" => result.set_path(path, operand.clone())?,
                "$unset" => {
                    result.remove_path(path);
                }
                "$inc" => {
                    let current = result.get_path(path).cloned().unwrap_or(Value::I32(0));
                    result.set_path(path, increment(&current, operand, path)?)?;
                }
                "$push" => {
                    let mut items = match result.get_path(path) {
                        None | Some(Value::Null) => Vec::new(),
                        Some(Value::Array(items)) => items.clone(),
                        Some(_) => {
                            return Err(invalid(&format!("Cannot $push to non-array field {}", path)))
                        }
                    };
                    items.push(operand.clone());
                    result.set_path(path, Value::Array(items))?;
                }
                other => return Err(invalid(&format!("Unknown modifier: {}", other))),
            }
        }
    }
    Ok(result)
}

fn increment(current: &Value, by: &Value, path: &str) -> DriverResult<Value> {
    match (current, by) {
        (Value::I32(a), Value::I32(b)) => Ok(a
            .checked_add(*b)
            .map(Value::I32)
            .unwrap_or(Value::I64(*a as i64 + *b as i64))),
        (Value::F64(_), _) | (_, Value::F64(_)) if current.is_number() && by.is_number() => Ok(
            Value::F64(current.as_f64().unwrap_or_default() + by.as_f64().unwrap_or_default()),
        ),
        (a, b) if a.is_number() && b.is_number() => Ok(Value::I64(
            a.as_i64().unwrap_or_default().wrapping_add(b.as_i64().unwrap_or_default()),
        )),
        _ => Err(invalid(&format!("Cannot apply $inc to non-numeric field {}", path))),
    }
}

fn invalid(message: &str) -> DriverError {
    log::error!("{}", message);
    DriverError::new(message, ErrorKind::InvalidUpdate)
}
