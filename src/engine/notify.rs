//! Change notification for book engines.
//!
//! A notification only says "this engine changed"; listeners re-read the
//! visible lists. Delivery runs on an [`Executor`] and is serialized per
//! engine: while one delivery is in flight, further notifications are
//! folded into one more delivery once it finishes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{BookError, Result};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    pub(crate) fn next() -> Self {
        EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Payload of a notification: the engine that changed, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookChange {
    source: EngineId,
}

impl BookChange {
    pub fn source(&self) -> EngineId {
        self.source
    }
}

/// Receives change notifications.
pub trait BookListener: Send + Sync {
    fn book_changed(&self, change: &BookChange);
}

impl<F> BookListener for F
where
    F: Fn(&BookChange) + Send + Sync,
{
    fn book_changed(&self, change: &BookChange) {
        self(change)
    }
}

/// Unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs notification deliveries.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs every task on the calling thread, right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task()
    }
}

impl<F> Executor for F
where
    F: Fn(Task) + Send + Sync,
{
    fn execute(&self, task: Task) {
        self(task)
    }
}

struct Shared {
    change: BookChange,
    listeners: RwLock<Vec<Arc<dyn BookListener>>>,
    closed: AtomicBool,

    /// Notification raised and not yet picked up by a delivery
    pending: AtomicBool,

    /// A delivery task is scheduled or running
    in_flight: AtomicBool,

    delivered: AtomicU64,
}

impl Shared {
    fn deliver(&self) {
        loop {
            self.pending.store(false, Ordering::SeqCst);
            let listeners = self.listeners.read().clone();
            for listener in &listeners {
                listener.book_changed(&self.change);
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            self.in_flight.store(false, Ordering::SeqCst);

            // Pick up notifications raised during delivery, unless another
            // task already did.
            if !self.pending.load(Ordering::SeqCst)
                || self
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                break;
            }
        }
    }
}

/// Listener registry and serialized delivery for one engine.
pub struct Notifier {
    shared: Arc<Shared>,
    executor: Arc<dyn Executor>,
}

impl Notifier {
    pub fn new(source: EngineId) -> Self {
        Self {
            shared: Arc::new(Shared {
                change: BookChange { source },
                listeners: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                delivered: AtomicU64::new(0),
            }),
            executor: Arc::new(InlineExecutor),
        }
    }

    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    /// Register a listener. Ignored once closed; registering the same
    /// listener twice is an error.
    pub fn add_listener(&self, listener: Arc<dyn BookListener>) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut listeners = self.shared.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return Err(BookError::invalid("listener is already registered"));
        }
        listeners.push(listener);
        Ok(())
    }

    /// Unregister a listener; returns whether it was registered.
    pub fn remove_listener(&self, listener: &Arc<dyn BookListener>) -> bool {
        let mut listeners = self.shared.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.read().len()
    }

    /// Schedule a delivery unless one is already in flight.
    pub fn notify(&self) {
        self.shared.pending.store(true, Ordering::SeqCst);
        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let shared = Arc::clone(&self.shared);
            self.executor.execute(Box::new(move || shared.deliver()));
        } else {
            trace!(engine = %self.shared.change.source, "notification folded into delivery in flight");
        }
    }

    /// Number of completed deliveries.
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    /// Drop all listeners and refuse new ones.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.listeners.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

fn same_listener(a: &Arc<dyn BookListener>, b: &Arc<dyn BookListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ============================================================================
// Unit Tests
// ============================================================================
