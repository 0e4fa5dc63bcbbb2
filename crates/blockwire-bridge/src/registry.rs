//! Registry of live bridge instances.
//!
//! Bridges register on construction and deregister when dropped. The
//! registry answers "is this the last live instance" and can run a teardown
//! hook once the last one is gone, which is where shared infrastructure
//! (message threads, GUI runtimes) gets shut down.
//!
//! There is no global registry. Create one per process at startup, share it
//! through an `Arc`, and keep it alive until every bridge has been dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Identifier of one registered bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type TeardownHook = Box<dyn Fn() + Send + Sync>;

/// Process-wide bookkeeping of live bridges.
pub struct InstanceRegistry {
    live: Mutex<Vec<InstanceId>>,
    next_id: AtomicU64,
    teardown: Option<TeardownHook>,
}

impl InstanceRegistry {
    /// Create an empty registry without a teardown hook.
    pub fn new() -> Self {
        Self {
            live: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            teardown: None,
        }
    }

    /// Create an empty registry that calls `hook` whenever the last live
    /// instance deregisters.
    pub fn with_teardown(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            teardown: Some(Box::new(hook)),
            ..Self::new()
        }
    }

    /// Add a new instance and return its id.
    pub fn register(&self) -> InstanceId {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.lock().push(id);
        id
    }

    /// Remove an instance.
    ///
    /// Returns true if it was the last live instance, in which case the
    /// teardown hook has run. Unknown ids are ignored.
    pub fn deregister(&self, id: InstanceId) -> bool {
        let was_last = {
            let mut live = self.live.lock();
            match live.iter().position(|&other| other == id) {
                Some(index) => {
                    live.remove(index);
                    live.is_empty()
                }
                None => false,
            }
        };

        if was_last {
            log::debug!("Last live instance {} removed", id);
            if let Some(hook) = &self.teardown {
                hook();
            }
        }
        was_last
    }

    /// True if `id` is registered and no other instance is.
    pub fn is_last_instance(&self, id: InstanceId) -> bool {
        let live = self.live.lock();
        live.len() == 1 && live[0] == id
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: InstanceId) -> bool {
        self.live.lock().contains(&id)
    }

    /// Number of live instances.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InstanceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("live", &*self.live.lock())
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}
