use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A one-shot notification handle.
///
/// Every node and leaf of the tree owns a `Watch`. When a transaction
/// supersedes or removes the owning entity it closes the handle at commit,
/// which wakes all blocked waiters and makes [`is_closed`](Watch::is_closed)
/// return `true` forever after. A handle obtained through
/// [`Node::get_watch`](crate::Node::get_watch) or one of the prefix seeks
/// therefore answers the question "has anything relevant to this lookup
/// changed since".
///
/// Cloning is cheap and clones observe the same close event.
pub struct Watch {
    inner: Arc<Inner>,
}

struct Inner {
    closed: AtomicBool,
    lock: Mutex<bool>,
    cond: Condvar,
}

impl Watch {
    pub(crate) fn new() -> Self {
        Watch {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                lock: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Returns `true` once the watched entity has been superseded or removed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the handle is closed.
    pub fn wait(&self) {
        let mut closed = self.inner.lock.lock();
        while !*closed {
            self.inner.cond.wait(&mut closed);
        }
    }

    /// Blocks until the handle is closed or `timeout` elapses.
    /// Returns whether the handle is closed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut closed = self.inner.lock.lock();
        let _ = self
            .inner
            .cond
            .wait_while_for(&mut closed, |closed| !*closed, timeout);
        *closed
    }

    /// Closes the handle, waking all waiters.
    ///
    /// The transaction that retires a node is the sole closer of its handle
    /// and closes it at most once.
    pub(crate) fn close(&self) {
        let mut closed = self.inner.lock.lock();
        debug_assert!(!*closed, "watch handle closed twice");
        *closed = true;
        self.inner.closed.store(true, Ordering::Release);
        self.inner.cond.notify_all();
    }
}

impl Clone for Watch {
    fn clone(&self) -> Self {
        Watch {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handles compare by identity: two `Watch` values are equal when they
/// observe the same close event.
impl PartialEq for Watch {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Watch {}

impl Hash for Watch {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(Arc::as_ptr(&self.inner) as usize);
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Watch")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn starts_open() {
        let watch = Watch::new();
        assert!(!watch.is_closed());
        assert!(!watch.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn close_is_observed_by_clones() {
        let watch = Watch::new();
        let clone = watch.clone();
        watch.close();
        assert!(watch.is_closed());
        assert!(clone.is_closed());
        assert!(clone.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn close_wakes_blocked_waiter() {
        let watch = Watch::new();
        let waiter = watch.clone();
        let handle = thread::spawn(move || {
            waiter.wait();
            true
        });
        thread::sleep(Duration::from_millis(20));
        watch.close();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn identity_comparison() {
        let a = Watch::new();
        let b = Watch::new();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
