use crate::collection::Document;
use crate::command::{Command, Executor, Reply};
use crate::common::{
    Value, AUTOCOMMIT_FIELD, SESSION_ID_FIELD, START_TRANSACTION_FIELD, TXN_NUMBER_FIELD,
};
use crate::doc;
use crate::errors::DriverResult;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Server-visible identifier of a logical session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `lsid` sub-document sent with every tagged command.
    pub fn to_document(&self) -> Document {
        doc! { "id": (self.0.as_str()) }
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

/// Transaction metadata attached to a command sent inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionTag {
    pub session_id: SessionId,
    pub txn_number: i64,
    /// Set on the first statement of the transaction only.
    pub start_transaction: bool,
}

impl TransactionTag {
    pub fn new(session_id: SessionId, txn_number: i64, start_transaction: bool) -> Self {
        TransactionTag {
            session_id,
            txn_number,
            start_transaction,
        }
    }
}

/// A command paired with the transaction tag it will be sent with.
///
/// Built per operation by the command tagger and dropped once the reply
/// arrives; nothing in it outlives the call.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    command: Command,
    tag: Option<TransactionTag>,
}

impl CommandEnvelope {
    pub fn new(command: Command, tag: Option<TransactionTag>) -> Self {
        CommandEnvelope { command, tag }
    }

    /// An envelope for a command sent outside of any transaction.
    pub fn untagged(command: Command) -> Self {
        CommandEnvelope { command, tag: None }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn tag(&self) -> Option<&TransactionTag> {
        self.tag.as_ref()
    }

    pub fn is_tagged(&self) -> bool {
        self.tag.is_some()
    }

    /// Hands the envelope to the command-execution layer.
    pub fn send(&self, executor: &Executor) -> DriverResult<Reply> {
        log::debug!(
            "Sending {} (txn {:?})",
            self.command.name(),
            self.tag.as_ref().map(|t| t.txn_number)
        );
        executor.execute(&self.command, self.tag.as_ref())
    }

    /// The full wire document: command body plus session and transaction fields.
    pub fn to_document(&self) -> DriverResult<Document> {
        let mut body = self.command.to_document()?;
        if let Some(tag) = &self.tag {
            body.put(SESSION_ID_FIELD, tag.session_id.to_document())?;
            body.put(TXN_NUMBER_FIELD, Value::I64(tag.txn_number))?;
            if tag.start_transaction {
                body.put(START_TRANSACTION_FIELD, true)?;
            }
            body.put(AUTOCOMMIT_FIELD, false)?;
        }
        Ok(body)
    }
}
