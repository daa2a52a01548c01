use super::matcher::matches;
use super::projection::project;
use super::store::id_key;
use super::update::{apply_update, upsert_seed};
use crate::collection::Document;
use crate::command::{Command, DeleteStatement, Reply, UpdateStatement, Upserted};
use crate::common::{Value, CODE_DUPLICATE_KEY, DOC_ID};
use crate::errors::{DriverError, DriverResult, ErrorKind};
use im::OrdMap;
use uuid::Uuid;

/// A single-document write produced by a data command: `None` removes.
pub(crate) type Change = (String, Option<Document>);

/// Runs a data command against `view`, updating it in place.
///
/// Returns the reply and the writes to persist, in order. Nothing is written
/// if the command fails.
pub(crate) fn execute(command: &Command, view: &mut OrdMap<String, Document>) -> DriverResult<(Reply, Vec<Change>)> {
    match command {
        Command::Find { filter, projection, limit, .. } => {
            let mut documents = Vec::new();
            for document in view.values() {
                if limit.is_some_and(|l| l > 0 && documents.len() >= l) {
                    break;
                }
                if matches(document, filter)? {
                    documents.push(match projection {
                        Some(projection) => project(document, projection)?,
                        None => document.clone(),
                    });
                }
            }
            Ok((Reply::with_documents(documents), Vec::new()))
        }
        Command::Insert { documents, .. } => insert(documents, view),
        Command::Update { updates, .. } => update(updates, view),
        Command::Delete { deletes, .. } => delete(deletes, view),
        other => {
            log::error!("{} is not a data command", other.name());
            Err(DriverError::new(
                &format!("{} is not a data command", other.name()),
                ErrorKind::InvalidOperation,
            ))
        }
    }
}

fn insert(documents: &[Document], view: &mut OrdMap<String, Document>) -> DriverResult<(Reply, Vec<Change>)> {
    let mut changes = Vec::with_capacity(documents.len());
    for document in documents {
        let (key, document) = with_id(document.clone())?;
        check_unique(&key, view)?;
        view.insert(key.clone(), document.clone());
        changes.push((key, Some(document)));
    }
    Ok((Reply::with_n(changes.len() as u64), changes))
}

fn update(updates: &[UpdateStatement], view: &mut OrdMap<String, Document>) -> DriverResult<(Reply, Vec<Change>)> {
    let mut reply = Reply::ok();
    let mut changes = Vec::new();

    for (index, statement) in updates.iter().enumerate() {
        let targets = matching_keys(view, &statement.selector, !statement.multi)?;
        for key in &targets {
            if let Some(old) = view.get(key).cloned() {
                let new = apply_update(&old, &statement.update)?;
                reply.n += 1;
                if new != old {
                    reply.n_modified += 1;
                    view.insert(key.clone(), new.clone());
                    changes.push((key.clone(), Some(new)));
                }
            }
        }

        if targets.is_empty() && statement.upsert {
            let seed = upsert_seed(&statement.selector, &statement.update)?;
            let (key, document) = with_id(seed)?;
            check_unique(&key, view)?;
            let id = document.id().cloned().unwrap_or_default();
            view.insert(key.clone(), document.clone());
            changes.push((key, Some(document)));
            reply.n += 1;
            reply.upserted.push(Upserted { index, id });
        }
    }
    Ok((reply, changes))
}

fn delete(deletes: &[DeleteStatement], view: &mut OrdMap<String, Document>) -> DriverResult<(Reply, Vec<Change>)> {
    let mut changes = Vec::new();
    for statement in deletes {
        for key in matching_keys(view, &statement.selector, statement.limit == 1)? {
            view.remove(&key);
            changes.push((key, None));
        }
    }
    Ok((Reply::with_n(changes.len() as u64), changes))
}

fn matching_keys(view: &OrdMap<String, Document>, selector: &Document, first_only: bool) -> DriverResult<Vec<String>> {
    let mut keys = Vec::new();
    for (key, document) in view.iter() {
        if matches(document, selector)? {
            keys.push(key.clone());
            if first_only {
                break;
            }
        }
    }
    Ok(keys)
}

// Assigns a generated `_id` when the document has none.
fn with_id(mut document: Document) -> DriverResult<(String, Document)> {
    let id = match document.id() {
        Some(id) => id.clone(),
        None => {
            let id = Value::from(Uuid::new_v4().to_string());
            document.put(DOC_ID, id.clone())?;
            id
        }
    };
    Ok((id_key(&id), document))
}

fn check_unique(key: &str, view: &OrdMap<String, Document>) -> DriverResult<()> {
    if view.contains_key(key) {
        log::error!("Duplicate key {}", key);
        return Err(DriverError::new(
            &format!("E11000 duplicate key error, _id: {}", key),
            ErrorKind::Server(CODE_DUPLICATE_KEY),
        ));
    }
    Ok(())
}
