use docdriver::cluster::Cluster;
use docdriver::cluster_builder::ClusterBuilder;
use docdriver::collection::{Collection, Document};
use docdriver::command::{Command, CommandEnvelope, CommandExecutor, Reply, TransactionTag};
use docdriver::errors::{DriverError, DriverResult, ErrorKind};
use docdriver::server::memory::{MemoryServer, MemoryServerConfig};
use docdriver::transaction::Session;
use parking_lot::Mutex;
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::Instant;

pub const TEST_DATABASE: &str = "mydb";
pub const TEST_COLLECTION: &str = "mycoll";

/// Runs a test between `before` and `after`, reporting failures and panics
/// with the time taken and a backtrace.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> DriverResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> DriverResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> DriverResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let start_time = Instant::now();

    let result = std::panic::catch_unwind(|| {
        let backtrace = Backtrace::capture();
        match before() {
            Ok(ctx) => match test(ctx.clone()) {
                Ok(_) => match after(ctx) {
                    Ok(_) => Ok(()),
                    Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                },
                Err(e) => {
                    let _ = after(ctx);
                    Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                }
            },
            Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
        }
    });

    let elapsed = start_time.elapsed();
    let (error, backtrace) = match result {
        Ok(Ok(_)) => return,
        Ok(Err((e, bt))) => (e, bt),
        Err(panic_err) => {
            let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            (format!("Panic: {}", err_msg), Backtrace::capture().to_string())
        }
    };

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {:?}", elapsed);
    eprintln!("Error: {}", error);
    if !backtrace.is_empty() && !backtrace.contains("disabled") {
        eprintln!("\nBacktrace:\n{}", backtrace);
    }
    eprintln!("=====================================================\n");

    panic!("Test failed: {}", error);
}

#[derive(Clone)]
pub struct TestContext {
    cluster: Cluster,
    server: MemoryServer,
    recorder: RecordingExecutor,
}

impl TestContext {
    pub fn new(cluster: Cluster, server: MemoryServer, recorder: RecordingExecutor) -> Self {
        Self {
            cluster,
            server,
            recorder,
        }
    }

    pub fn cluster(&self) -> Cluster {
        self.cluster.clone()
    }

    pub fn server(&self) -> &MemoryServer {
        &self.server
    }

    /// Every command the cluster sent, in order.
    pub fn recorder(&self) -> &RecordingExecutor {
        &self.recorder
    }

    pub fn session(&self) -> Session {
        self.cluster.new_session()
    }

    /// Two sessions on the test collection, created outside any transaction.
    /// The second is a copy of the first.
    pub fn two_sessions(&self) -> DriverResult<(Session, Collection, Session, Collection)> {
        let session1 = self.session();
        let coll1 = collection(&session1)?;
        coll1.create()?;
        let session2 = session1.copy()?;
        let coll2 = collection(&session2)?;
        Ok((session1, coll1, session2, coll2))
    }
}

pub fn collection(session: &Session) -> DriverResult<Collection> {
    Ok(session.database(TEST_DATABASE)?.collection(TEST_COLLECTION))
}

pub fn create_test_context() -> DriverResult<TestContext> {
    create_test_context_with(Cluster::builder(), MemoryServerConfig::new())
}

pub fn create_test_context_with(
    builder: ClusterBuilder,
    server_config: MemoryServerConfig,
) -> DriverResult<TestContext> {
    let server = MemoryServer::with_config(server_config);
    let recorder = RecordingExecutor::new(server.clone());
    let cluster = builder.build(recorder.clone())?;
    Ok(TestContext::new(cluster, server, recorder))
}

/// Fails when a server-side transaction outlived the test's sessions.
pub fn cleanup(ctx: TestContext) -> DriverResult<()> {
    let open = ctx.server().open_transactions();
    if open > 0 {
        return Err(DriverError::new(
            &format!("{} transaction(s) left open on the server", open),
            ErrorKind::InternalError,
        ));
    }
    Ok(())
}

/// Projection used by most assertions: the two test fields without `_id`.
pub fn ab() -> Document {
    docdriver::doc! { "a": 1, "b": 1, "_id": 0 }
}

/// A failure to inject instead of forwarding a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The command never reaches the server.
    Network,
    /// The server rejects the command with the given code.
    Server(i32),
}

/// Command executor that records every envelope and forwards it to a
/// [`MemoryServer`], optionally failing selected commands.
#[derive(Clone)]
pub struct RecordingExecutor {
    inner: Arc<RecorderInner>,
}

struct RecorderInner {
    target: MemoryServer,
    envelopes: Mutex<Vec<CommandEnvelope>>,
    faults: Mutex<Vec<(&'static str, Fault)>>,
}

impl RecordingExecutor {
    pub fn new(target: MemoryServer) -> Self {
        RecordingExecutor {
            inner: Arc::new(RecorderInner {
                target,
                envelopes: Mutex::new(Vec::new()),
                faults: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fails the next command named `command`, e.g. `"commitTransaction"`.
    pub fn fail_next(&self, command: &'static str, fault: Fault) {
        self.inner.faults.lock().push((command, fault));
    }

    pub fn envelopes(&self) -> Vec<CommandEnvelope> {
        self.inner.envelopes.lock().clone()
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.inner
            .envelopes
            .lock()
            .iter()
            .map(|e| e.command().name())
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.command_names().iter().filter(|name| **name == command).count()
    }

    pub fn clear(&self) {
        self.inner.envelopes.lock().clear();
    }

    fn take_fault(&self, command: &Command) -> Option<Fault> {
        let mut faults = self.inner.faults.lock();
        let index = faults.iter().position(|(name, _)| *name == command.name())?;
        Some(faults.remove(index).1)
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: &Command, tag: Option<&TransactionTag>) -> DriverResult<Reply> {
        self.inner
            .envelopes
            .lock()
            .push(CommandEnvelope::new(command.clone(), tag.cloned()));

        match self.take_fault(command) {
            Some(Fault::Network) => {
                log::debug!("Injected network failure for {}", command.name());
                Err(DriverError::new("connection reset by peer", ErrorKind::Network))
            }
            Some(Fault::Server(code)) => {
                log::debug!("Injected server error {} for {}", code, command.name());
                Err(DriverError::new(
                    &format!("injected failure for {}", command.name()),
                    ErrorKind::Server(code),
                ))
            }
            None => self.inner.target.execute(command, tag),
        }
    }
}
