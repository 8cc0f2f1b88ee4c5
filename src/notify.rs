//! Change notification hook.
//!
//! A runtime holds one callback slot, a no-op until the scheduler installs its
//! own. Every tracked write invokes it with no arguments: it only signals that
//! something changed. What changed is carried by tags.

use std::sync::Arc;

use parking_lot::RwLock;

/// Callback invoked after every tracked write.
pub type ChangeNotifier = Arc<dyn Fn() + Send + Sync>;

fn noop() -> ChangeNotifier {
    Arc::new(|| {})
}

/// Replaceable notifier slot.
pub(crate) struct NotifierSlot {
    callback: RwLock<ChangeNotifier>,
}

impl Default for NotifierSlot {
    fn default() -> Self {
        Self::new(None)
    }
}

impl NotifierSlot {
    pub fn new(callback: Option<ChangeNotifier>) -> Self {
        Self {
            callback: RwLock::new(callback.unwrap_or_else(noop)),
        }
    }

    /// Install `callback`, returning the previous one.
    pub fn replace(&self, callback: ChangeNotifier) -> ChangeNotifier {
        std::mem::replace(&mut *self.callback.write(), callback)
    }

    /// Invoke the current callback.
    ///
    /// The slot lock is released before the call, so the callback may install
    /// a different notifier.
    pub fn notify(&self) {
        let callback = self.callback.read().clone();
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_is_noop() {
        let slot = NotifierSlot::default();
        slot.notify();
    }

    #[test]
    fn test_replace_and_notify() {
        let count = Arc::new(AtomicUsize::new(0));
        let slot = NotifierSlot::default();

        let counter = count.clone();
        slot.replace(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        slot.notify();
        slot.notify();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_notifier_may_replace_itself() {
        let slot = Arc::new(NotifierSlot::default());
        let inner = slot.clone();
        slot.replace(Arc::new(move || {
            inner.replace(noop());
        }));
        slot.notify();
        slot.notify();
    }
}
