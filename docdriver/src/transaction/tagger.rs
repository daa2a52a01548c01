use crate::command::{Command, CommandEnvelope, SessionId};
use crate::errors::DriverResult;
use crate::transaction::TransactionStateMachine;
use std::sync::Arc;

/// Decides how an outgoing command is annotated.
///
/// Idle session: the command goes out untagged. Open transaction: data
/// commands carry the session id and transaction number, and the first one
/// also carries `startTransaction`. Commit, abort and `endSessions` are never
/// tagged here. A tagged write loses its own write concern, since the commit's
/// write concern applies to the whole transaction. A data command issued while
/// commit or abort is in flight is refused rather than sent untagged.
#[derive(Clone)]
pub struct CommandTagger {
    session_id: SessionId,
    machine: Arc<TransactionStateMachine>,
}

impl CommandTagger {
    pub fn new(session_id: SessionId, machine: Arc<TransactionStateMachine>) -> Self {
        CommandTagger { session_id, machine }
    }

    pub fn tag(&self, mut command: Command) -> DriverResult<CommandEnvelope> {
        if !command.is_taggable() {
            return Ok(CommandEnvelope::untagged(command));
        }

        match self.machine.tag_next(&self.session_id)? {
            Some(tag) => {
                command.clear_write_concern();
                Ok(CommandEnvelope::new(command, Some(tag)))
            }
            None => Ok(CommandEnvelope::untagged(command)),
        }
    }
}
