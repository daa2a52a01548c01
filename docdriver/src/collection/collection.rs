use crate::collection::{ChangeInfo, Document};
use crate::command::{Command, DeleteStatement, Namespace, Reply, UpdateStatement, WriteConcern};
use crate::errors::{DriverError, DriverResult, ErrorKind};
use crate::transaction::Session;

/// A collection bound to a session.
///
/// Every operation goes through the session's command tagger, so it joins the
/// session's transaction automatically when one is open. Single-document
/// lookups, updates and removals that match nothing fail with "not found".
///
/// ```ignore
/// let coll = session.db().collection("mycoll");
/// coll.insert(doc! { "a": "a", "b": "b" })?;
/// let doc = coll.find(doc! { "a": "a" }).select(doc! { "_id": 0 }).one()?;
/// ```
#[derive(Debug, Clone)]
pub struct Collection {
    ns: Namespace,
    session: Session,
}

impl Collection {
    pub(crate) fn new(ns: Namespace, session: Session) -> Self {
        Collection { ns, session }
    }

    pub fn name(&self) -> &str {
        &self.ns.collection
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Creates the collection on the server.
    pub fn create(&self) -> DriverResult<()> {
        self.run(Command::Create { ns: self.ns.clone() }).map(|_| ())
    }

    /// Drops the collection and all of its documents.
    pub fn drop(&self) -> DriverResult<()> {
        self.run(Command::Drop { ns: self.ns.clone() }).map(|_| ())
    }

    pub fn insert(&self, document: Document) -> DriverResult<()> {
        self.insert_many(vec![document])
    }

    pub fn insert_many(&self, documents: Vec<Document>) -> DriverResult<()> {
        if documents.is_empty() {
            log::error!("No documents to insert into {}", self.ns);
            return Err(DriverError::new(
                "No documents to insert",
                ErrorKind::InvalidOperation,
            ));
        }
        self.run(Command::Insert {
            ns: self.ns.clone(),
            documents,
            write_concern: self.write_concern(),
        })
        .map(|_| ())
    }

    /// Starts a query. Nothing is sent until `one`, `all` or `count`.
    pub fn find(&self, filter: Document) -> Query {
        Query {
            collection: self.clone(),
            filter,
            projection: None,
            limit: None,
        }
    }

    /// Updates the first document matching `selector`.
    ///
    /// # Errors
    /// "not found" if nothing matched.
    pub fn update(&self, selector: Document, update: Document) -> DriverResult<()> {
        let reply = self.run_update(UpdateStatement::new(selector, update, false, false))?;
        if reply.n == 0 {
            return Err(DriverError::not_found());
        }
        Ok(())
    }

    /// Updates every document matching `selector`. An empty selector matches all.
    pub fn update_all(&self, selector: Document, update: Document) -> DriverResult<ChangeInfo> {
        let reply = self.run_update(UpdateStatement::new(selector, update, true, false))?;
        Ok(ChangeInfo {
            matched: reply.n,
            updated: reply.n_modified,
            ..ChangeInfo::default()
        })
    }

    /// Updates the first document matching `selector`, or inserts one built
    /// from the selector and the update when nothing matches.
    pub fn upsert(&self, selector: Document, update: Document) -> DriverResult<ChangeInfo> {
        let reply = self.run_update(UpdateStatement::new(selector, update, false, true))?;
        let upserted = reply.upserted.len() as u64;
        Ok(ChangeInfo {
            matched: reply.n.saturating_sub(upserted),
            updated: reply.n_modified,
            upserted_id: reply.upserted_id().cloned(),
            ..ChangeInfo::default()
        })
    }

    /// Removes the first document matching `selector`.
    ///
    /// # Errors
    /// "not found" if nothing matched.
    pub fn remove(&self, selector: Document) -> DriverResult<()> {
        let reply = self.run_delete(DeleteStatement::new(selector, 1))?;
        if reply.n == 0 {
            return Err(DriverError::not_found());
        }
        Ok(())
    }

    /// Removes every document matching `selector`.
    pub fn remove_all(&self, selector: Document) -> DriverResult<ChangeInfo> {
        let reply = self.run_delete(DeleteStatement::new(selector, 0))?;
        Ok(ChangeInfo {
            matched: reply.n,
            removed: reply.n,
            ..ChangeInfo::default()
        })
    }

    fn run_update(&self, statement: UpdateStatement) -> DriverResult<Reply> {
        self.run(Command::Update {
            ns: self.ns.clone(),
            updates: vec![statement],
            write_concern: self.write_concern(),
        })
    }

    fn run_delete(&self, statement: DeleteStatement) -> DriverResult<Reply> {
        self.run(Command::Delete {
            ns: self.ns.clone(),
            deletes: vec![statement],
            write_concern: self.write_concern(),
        })
    }

    fn write_concern(&self) -> Option<WriteConcern> {
        self.session.cluster().config().write_concern()
    }

    fn run(&self, command: Command) -> DriverResult<Reply> {
        if self.ns.collection.is_empty() {
            log::error!("Collection name cannot be empty");
            return Err(DriverError::new(
                "Collection name cannot be empty",
                ErrorKind::ValidationError,
            ));
        }
        self.session.run(command)
    }
}

/// A pending `find` on a collection.
#[derive(Debug, Clone)]
pub struct Query {
    collection: Collection,
    filter: Document,
    projection: Option<Document>,
    limit: Option<usize>,
}

impl Query {
    /// Restricts the returned fields, e.g. `doc! { "a": 1, "b": 1, "_id": 0 }`.
    pub fn select(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The first matching document.
    ///
    /// # Errors
    /// "not found" if nothing matched.
    pub fn one(&self) -> DriverResult<Document> {
        let reply = self.run(Some(1))?;
        reply
            .documents
            .into_iter()
            .next()
            .ok_or_else(DriverError::not_found)
    }

    pub fn all(&self) -> DriverResult<Vec<Document>> {
        Ok(self.run(self.limit)?.documents)
    }

    pub fn count(&self) -> DriverResult<u64> {
        Ok(self.all()?.len() as u64)
    }

    fn run(&self, limit: Option<usize>) -> DriverResult<Reply> {
        self.collection.run(Command::Find {
            ns: self.collection.ns.clone(),
            filter: self.filter.clone(),
            projection: self.projection.clone(),
            limit,
        })
    }
}
