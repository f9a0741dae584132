//! Known threads and their summaries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ched_model::ThreadSummary;
use chrono::{NaiveDateTime, Utc};

use crate::Error;
use crate::backend::BackendObject;

/// The thread that always exists and cannot be deleted.
pub const DEFAULT_THREAD_ID: &str = "default";

const LOCAL_ID_PREFIX: &str = "local-";

static NEXT_LOCAL_SEQ: AtomicU64 = AtomicU64::new(1);

/// A conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Thread {
    /// Server-assigned or locally minted identifier.
    pub id: String,
    /// How many messages the backend has persisted for the thread.
    pub message_count: u64,
    /// A human readable name.
    pub label: String,
    /// When the last message was written, if the backend told us.
    pub last_message_time: Option<NaiveDateTime>,
}

impl Thread {
    /// Mints a new thread with a client-local identifier.
    ///
    /// The identifier is unique within the process lifetime. The thread
    /// becomes durable once a first query is sent against it.
    pub fn create_local() -> Self {
        let seq = NEXT_LOCAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        let id = format!("{LOCAL_ID_PREFIX}{millis}-{seq}");
        trace!("minted local thread {id}");
        Self {
            label: label_for(&id),
            id,
            message_count: 0,
            last_message_time: None,
        }
    }

    /// Returns whether the identifier was minted by [`Thread::create_local`].
    #[inline]
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }

    fn default_thread() -> Self {
        Self {
            id: DEFAULT_THREAD_ID.to_owned(),
            message_count: 0,
            label: label_for(DEFAULT_THREAD_ID),
            last_message_time: None,
        }
    }
}

impl From<ThreadSummary> for Thread {
    fn from(summary: ThreadSummary) -> Self {
        Self {
            label: label_for(&summary.thread_id),
            id: summary.thread_id,
            message_count: summary.message_count,
            last_message_time: summary.last_message_time,
        }
    }
}

fn label_for(thread_id: &str) -> String {
    if thread_id == DEFAULT_THREAD_ID {
        "General".to_owned()
    } else if thread_id.starts_with(LOCAL_ID_PREFIX) {
        "New chat".to_owned()
    } else {
        format!("Chat {thread_id}")
    }
}

/// Proof that the user confirmed a deletion.
#[derive(Debug)]
pub(crate) struct Confirmed(());

impl Confirmed {
    #[inline]
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// The client-side cache of known threads.
pub(crate) struct ThreadRegistry {
    backend: Arc<dyn BackendObject>,
    threads: Vec<Thread>,
}

impl ThreadRegistry {
    pub(crate) fn new(backend: Arc<dyn BackendObject>) -> Self {
        Self {
            backend,
            threads: vec![Thread::default_thread()],
        }
    }

    /// Returns the cached threads.
    #[inline]
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    /// Fetches the thread summaries from the backend.
    ///
    /// The cache is untouched, apply the result with
    /// [`ThreadRegistry::replace`].
    pub(crate) fn list(
        &self,
    ) -> impl Future<Output = Result<Vec<ThreadSummary>, Error>> + Send + 'static
    {
        let fut = self.backend.list_threads();
        async move {
            fut.await.map_err(|err| {
                warn!("failed to list threads: {err}");
                Error::connectivity(&*err)
            })
        }
    }

    /// Replaces the cache with the given summaries.
    ///
    /// The default thread is added in front if the backend doesn't know
    /// about it yet.
    pub(crate) fn replace(&mut self, summaries: Vec<ThreadSummary>) {
        self.threads = summaries.into_iter().map(Thread::from).collect();
        if !self.threads.iter().any(|t| t.id == DEFAULT_THREAD_ID) {
            self.threads.insert(0, Thread::default_thread());
        }
        debug!("{} threads known", self.threads.len());
    }

    /// Adds a thread minted by [`Thread::create_local`].
    pub(crate) fn add_local(&mut self, thread: Thread) {
        if self.threads.iter().any(|t| t.id == thread.id) {
            return;
        }
        self.threads.push(thread);
    }

    /// Deletes a thread on the backend.
    ///
    /// Fails right away if the thread is the default one. Once the returned
    /// future succeeds, drop the thread from the cache with
    /// [`ThreadRegistry::remove`].
    pub(crate) fn delete(
        &self,
        thread_id: &str,
        _confirmed: Confirmed,
    ) -> Result<
        impl Future<Output = Result<(), Error>> + Send + 'static,
        Error,
    > {
        if thread_id == DEFAULT_THREAD_ID {
            warn!("refusing to delete the default thread");
            return Err(Error::rejected("the default thread cannot be deleted"));
        }
        let fut = self.backend.delete_thread(thread_id);
        let thread_id = thread_id.to_owned();
        Ok(async move {
            fut.await.map_err(|err| {
                warn!("failed to delete {thread_id}: {err}");
                Error::connectivity(&*err)
            })?;
            debug!("deleted {thread_id}");
            Ok(())
        })
    }

    /// Drops a deleted thread from the cache.
    #[inline]
    pub(crate) fn remove(&mut self, thread_id: &str) {
        self.threads.retain(|t| t.id != thread_id);
    }
}
