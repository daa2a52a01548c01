use crate::collection::Document;
use crate::command::SessionId;
use crate::common::{Value, MAX_TIME_MS_FIELD, WRITE_CONCERN_FIELD};
use crate::doc;
use crate::errors::DriverResult;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// A `database.collection` pair addressed by a data command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: &str, collection: &str) -> Self {
        Namespace {
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Acknowledgement requested for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConcern {
    pub w: i32,
    pub journal: bool,
}

impl WriteConcern {
    pub fn new(w: i32, journal: bool) -> Self {
        WriteConcern { w, journal }
    }

    pub fn majority() -> Self {
        // -1 renders as "majority"
        WriteConcern { w: -1, journal: true }
    }

    pub fn to_document(&self) -> Document {
        let w = if self.w < 0 {
            Value::from("majority")
        } else {
            Value::I32(self.w)
        };
        doc! { "w": w, "j": (self.journal) }
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        WriteConcern { w: 1, journal: false }
    }
}

/// One statement of an `update` command.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub selector: Document,
    pub update: Document,
    pub multi: bool,
    pub upsert: bool,
}

impl UpdateStatement {
    pub fn new(selector: Document, update: Document, multi: bool, upsert: bool) -> Self {
        UpdateStatement {
            selector,
            update,
            multi,
            upsert,
        }
    }
}

/// One statement of a `delete` command. `limit` of 0 removes every match.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub selector: Document,
    pub limit: u32,
}

impl DeleteStatement {
    pub fn new(selector: Document, limit: u32) -> Self {
        DeleteStatement { selector, limit }
    }
}

/// A command accepted by the command-execution layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        ns: Namespace,
    },
    Drop {
        ns: Namespace,
    },
    Insert {
        ns: Namespace,
        documents: Vec<Document>,
        write_concern: Option<WriteConcern>,
    },
    Update {
        ns: Namespace,
        updates: Vec<UpdateStatement>,
        write_concern: Option<WriteConcern>,
    },
    Delete {
        ns: Namespace,
        deletes: Vec<DeleteStatement>,
        write_concern: Option<WriteConcern>,
    },
    Find {
        ns: Namespace,
        filter: Document,
        projection: Option<Document>,
        limit: Option<usize>,
    },
    CommitTransaction {
        write_concern: Option<WriteConcern>,
        max_time: Option<Duration>,
    },
    AbortTransaction {
        write_concern: Option<WriteConcern>,
    },
    EndSessions {
        session_ids: Vec<SessionId>,
    },
}

impl Command {
    /// The wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Drop { .. } => "drop",
            Command::Insert { .. } => "insert",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Find { .. } => "find",
            Command::CommitTransaction { .. } => "commitTransaction",
            Command::AbortTransaction { .. } => "abortTransaction",
            Command::EndSessions { .. } => "endSessions",
        }
    }

    pub fn namespace(&self) -> Option<&Namespace> {
        match self {
            Command::Create { ns }
            | Command::Drop { ns }
            | Command::Insert { ns, .. }
            | Command::Update { ns, .. }
            | Command::Delete { ns, .. }
            | Command::Find { ns, .. } => Some(ns),
            _ => None,
        }
    }

    /// Commit and abort resolve a transaction rather than run inside one.
    pub fn is_transaction_control(&self) -> bool {
        matches!(
            self,
            Command::CommitTransaction { .. } | Command::AbortTransaction { .. }
        )
    }

    /// Whether the tagger may attach an active transaction to this command.
    pub fn is_taggable(&self) -> bool {
        !self.is_transaction_control() && !matches!(self, Command::EndSessions { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Insert { .. } | Command::Update { .. } | Command::Delete { .. }
        )
    }

    /// Drops a per-statement write concern. Statements inside a transaction
    /// inherit the commit's write concern instead.
    pub(crate) fn clear_write_concern(&mut self) {
        match self {
            Command::Insert { write_concern, .. }
            | Command::Update { write_concern, .. }
            | Command::Delete { write_concern, .. } => *write_concern = None,
            _ => {}
        }
    }

    /// Renders the command body in its wire shape, without session fields.
    pub fn to_document(&self) -> DriverResult<Document> {
        let mut body = Document::new();
        match self {
            Command::Create { ns } | Command::Drop { ns } => {
                body.put(self.name(), Value::from(&ns.collection))?;
                body.put("$db", Value::from(&ns.database))?;
            }
            Command::Insert { ns, documents, write_concern } => {
                body.put("insert", Value::from(&ns.collection))?;
                body.put("documents", Value::from(documents.clone()))?;
                body.put("$db", Value::from(&ns.database))?;
                if let Some(wc) = write_concern {
                    body.put::<Value>(WRITE_CONCERN_FIELD, wc.to_document().into())?;
                }
            }
            Command::Update { ns, updates, write_concern } => {
                let statements: Vec<Value> = updates
                    .iter()
                    .map(|u| {
                        Value::from(doc! {
                            "q": (u.selector.clone()),
                            "u": (u.update.clone()),
                            "multi": (u.multi),
                            "upsert": (u.upsert),
                        })
                    })
                    .collect();
                body.put("update", Value::from(&ns.collection))?;
                body.put("updates", Value::Array(statements))?;
                body.put("$db", Value::from(&ns.database))?;
                if let Some(wc) = write_concern {
                    body.put::<Value>(WRITE_CONCERN_FIELD, wc.to_document().into())?;
                }
            }
            Command::Delete { ns, deletes, write_concern } => {
                let statements: Vec<Value> = deletes
                    .iter()
                    .map(|d| Value::from(doc! { "q": (d.selector.clone()), "limit": (d.limit) }))
                    .collect();
                body.put("delete", Value::from(&ns.collection))?;
                body.put("deletes", Value::Array(statements))?;
                body.put("$db", Value::from(&ns.database))?;
                if let Some(wc) = write_concern {
                    body.put::<Value>(WRITE_CONCERN_FIELD, wc.to_document().into())?;
                }
            }
            Command::Find { ns, filter, projection, limit } => {
                body.put("find", Value::from(&ns.collection))?;
                body.put::<Value>("filter", filter.clone().into())?;
                if let Some(projection) = projection {
                    body.put::<Value>("projection", projection.clone().into())?;
                }
                if let Some(limit) = limit {
                    body.put("limit", Value::from(*limit))?;
                }
                body.put("$db", Value::from(&ns.database))?;
            }
            Command::CommitTransaction { write_concern, max_time } => {
                body.put("commitTransaction", Value::I32(1))?;
                body.put("$db", Value::from("admin"))?;
                if let Some(wc) = write_concern {
                    body.put::<Value>(WRITE_CONCERN_FIELD, wc.to_document().into())?;
                }
                if let Some(max_time) = max_time {
                    body.put(MAX_TIME_MS_FIELD, Value::I64(max_time.as_millis() as i64))?;
                }
            }
            Command::AbortTransaction { write_concern } => {
                body.put("abortTransaction", Value::I32(1))?;
                body.put("$db", Value::from("admin"))?;
                if let Some(wc) = write_concern {
                    body.put::<Value>(WRITE_CONCERN_FIELD, wc.to_document().into())?;
                }
            }
            Command::EndSessions { session_ids } => {
                let ids: Vec<Value> = session_ids.iter().map(|id| id.to_document().into()).collect();
                body.put("endSessions", Value::Array(ids))?;
                body.put("$db", Value::from("admin"))?;
            }
        }
        Ok(body)
    }
}
