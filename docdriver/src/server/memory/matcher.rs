use crate::collection::Document;
use crate::common::Value;
use crate::errors::{DriverError, DriverResult, ErrorKind};
use regex::RegexBuilder;
use std::cmp::Ordering;

/// Whether `document` satisfies the query `filter`.
///
/// Supported: field equality (with array membership), `$eq`, `$ne`, `$gt`,
/// `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$regex` with `$options`,
/// and the logical `$and`, `$or`, `$nor`. Field names may be dotted paths.
pub(crate) fn matches(document: &Document, filter: &Document) -> DriverResult<bool> {
    for (key, condition) in filter.iter() {
        let matched = match key.as_str() {
            "$and" => logical(document, condition, key)?.iter().all(|m| *m),
            "$or" => logical(document, condition, key)?.iter().any(|m| *m),
            "$nor" => !logical(document, condition, key)?.iter().any(|m| *m),
            op if op.starts_with('$') => {
                return Err(invalid(&format!("Unknown top level operator: {}", op)));
            }
            path => field_matches(document.get_path(path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn logical(document: &Document, condition: &Value, op: &str) -> DriverResult<Vec<bool>> {
    let clauses = match condition.as_array() {
        Some(clauses) if !clauses.is_empty() => clauses,
        _ => return Err(invalid(&format!("{} must be a nonempty array", op))),
    };
    clauses
        .iter()
        .map(|clause| match clause.as_document() {
            Some(sub) => matches(document, sub),
            None => Err(invalid(&format!("{} entries must be documents", op))),
        })
        .collect()
}

fn is_operator_document(condition: &Value) -> bool {
    match condition.as_document() {
        Some(doc) => !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn field_matches(value: Option<&Value>, condition: &Value) -> DriverResult<bool> {
    let operators = match condition.as_document() {
        Some(operators) if is_operator_document(condition) => operators,
        _ => return Ok(equals(value, condition)),
    };
    for (op, operand) in operators.iter() {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => ordered(value, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(value, operand, |o| o != Ordering::Less),
            "$lt" => ordered(value, operand, |o| o == Ordering::Less),
            "$lte" => ordered(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand, op)?,
            "$nin" => !in_list(value, operand, op)?,
            "$exists" => value.is_some() == operand.is_truthy(),
            "$regex" => {
                let options = operators.get("$options").and_then(|o| o.as_str()).unwrap_or("");
                regex_matches(value, operand, options)?
            }
            "$options" => true,
            other => return Err(invalid(&format!("Unknown operator: {}", other))),
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

// Missing fields equal null; an array field matches if any element does.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    (a.is_number() && b.is_number()) || a.type_name() == b.type_name()
}

fn ordered(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Value| comparable(v, operand) && accept(v.compare(operand));
    match value {
        None => false,
        Some(Value::Array(items)) if operand.as_array().is_none() => items.iter().any(check),
        Some(v) => check(v),
    }
}

fn in_list(value: Option<&Value>, operand: &Value, op: &str) -> DriverResult<bool> {
    match operand.as_array() {
        Some(candidates) => Ok(candidates.iter().any(|c| equals(value, c))),
        None => Err(invalid(&format!("{} needs an array", op))),
    }
}

fn regex_matches(value: Option<&Value>, pattern: &Value, options: &str) -> DriverResult<bool> {
    let pattern = match pattern.as_str() {
        Some(p) => p,
        None => return Err(invalid("$regex has to be a string")),
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()?;
    let test = |v: &Value| v.as_str().map(|s| regex.is_match(s)).unwrap_or(false);
    Ok(match value {
        Some(Value::Array(items)) => items.iter().any(test),
        Some(v) => test(v),
        None => false,
    })
}

fn invalid(message: &str) -> DriverError {
    log::error!("{}", message);
    DriverError::new(message, ErrorKind::InvalidQuery)
}
