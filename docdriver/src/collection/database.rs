use crate::collection::Collection;
use crate::command::Namespace;
use crate::transaction::Session;

/// A database seen through a session.
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    session: Session,
}

impl Database {
    pub(crate) fn new(name: &str, session: Session) -> Self {
        Database {
            name: name.to_string(),
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// A collection of this database. Operations on it run in the session,
    /// inside its transaction when one is open.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(Namespace::new(&self.name, name), self.session.clone())
    }
}
