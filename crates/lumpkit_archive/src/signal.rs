//! Change notification for archive observers.
//!
//! Every mutation made through [`crate::Archive`] emits an [`ArchiveEvent`]. While a
//! [`SignalBlocker`] is alive events are swallowed instead, and when the last blocker goes
//! away a single [`ArchiveEvent::Refreshed`] is delivered if anything was swallowed.

use std::{
    cell::{Cell, RefCell},
    fmt::{self, Debug},
    rc::Rc,
};

use tracing::trace;

use crate::{dir::ArchiveDir, entry::ArchiveEntry};

/// Something observable happened to an archive
#[derive(Debug, Clone)]
pub enum ArchiveEvent {
    /// An entry was inserted
    EntryAdded(ArchiveEntry),

    /// An entry was detached, the handle reports [`crate::EntryState::Deleted`]
    EntryRemoved(ArchiveEntry),

    /// An entry changed name
    EntryRenamed {
        /// The renamed entry
        entry: ArchiveEntry,
        /// Name before the change
        old_name: String,
    },

    /// Entry data or position changed
    EntryModified(ArchiveEntry),

    /// A directory was created
    DirAdded(ArchiveDir),

    /// A directory was detached
    DirRemoved(ArchiveDir),

    /// The archive level modified flag flipped
    ModifiedChanged(bool),

    /// Catch-up notification for everything suppressed by a [`SignalBlocker`]
    Refreshed,
}

type Listener = Box<dyn FnMut(&ArchiveEvent)>;

/// Listener list plus suppression bookkeeping, shared between an archive and its blockers
#[derive(Default)]
pub struct Signals {
    listeners: RefCell<Vec<Listener>>,
    blocked: Cell<usize>,
    pending: Cell<bool>,
}

impl Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Signals")
            .field("listeners", &self.listeners.borrow().len())
            .field("blocked", &self.blocked.get())
            .field("pending", &self.pending.get())
            .finish()
    }
}

impl Signals {
    /// Register a listener
    pub fn subscribe(&self, listener: impl FnMut(&ArchiveEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Whether at least one blocker is alive
    pub fn is_blocked(&self) -> bool {
        self.blocked.get() > 0
    }

    /// Deliver `event`, or remember that something happened if blocked
    pub fn emit(&self, event: ArchiveEvent) {
        if self.is_blocked() {
            self.pending.set(true);
            return;
        }
        self.deliver(&event);
    }

    fn deliver(&self, event: &ArchiveEvent) {
        trace!(?event, "archive event");
        // A listener may not subscribe from inside a callback
        let Ok(mut listeners) = self.listeners.try_borrow_mut() else {
            return;
        };
        for listener in listeners.iter_mut() {
            listener(event);
        }
    }

    /// Suppress events until the returned guard is dropped
    pub fn block(self: &Rc<Self>) -> SignalBlocker {
        self.blocked.set(self.blocked.get() + 1);
        SignalBlocker {
            signals: Rc::clone(self),
        }
    }
}

/// Scoped suppression of archive events
///
/// Dropping the guard restores the previous suppression depth on every exit path. Dropping
/// the outermost guard fires one [`ArchiveEvent::Refreshed`] if any event was swallowed.
#[must_use = "events are only suppressed while the blocker is alive"]
pub struct SignalBlocker {
    signals: Rc<Signals>,
}

impl Debug for SignalBlocker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("SignalBlocker").field(&self.signals).finish()
    }
}

impl Drop for SignalBlocker {
    fn drop(&mut self) {
        let depth = self.signals.blocked.get().saturating_sub(1);
        self.signals.blocked.set(depth);

        if depth == 0 && self.signals.pending.replace(false) {
            self.signals.deliver(&ArchiveEvent::Refreshed);
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn recorder(signals: &Signals) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        signals.subscribe(move |event| {
            let name = match event {
                ArchiveEvent::Refreshed => "refreshed".to_owned(),
                ArchiveEvent::ModifiedChanged(m) => format!("modified {m}"),
                other => format!("{other:?}").split('(').next().unwrap_or_default().to_owned(),
            };
            sink.borrow_mut().push(name);
        });
        seen
    }

    #[test]
    fn events_pass_through_when_unblocked() {
        let signals = Rc::new(Signals::default());
        let seen = recorder(&signals);

        signals.emit(ArchiveEvent::ModifiedChanged(true));

        assert_eq!(*seen.borrow(), vec!["modified true"]);
    }

    #[test]
    fn blocked_events_collapse_into_one() {
        let signals = Rc::new(Signals::default());
        let seen = recorder(&signals);

        {
            let _outer = signals.block();
            signals.emit(ArchiveEvent::ModifiedChanged(true));
            {
                let _inner = signals.block();
                signals.emit(ArchiveEvent::Refreshed);
            }
            assert!(seen.borrow().is_empty());
            signals.emit(ArchiveEvent::ModifiedChanged(false));
        }

        assert_eq!(*seen.borrow(), vec!["refreshed"]);
        assert!(!signals.is_blocked());
    }

    #[test]
    fn quiet_block_fires_nothing() {
        let signals = Rc::new(Signals::default());
        let seen = recorder(&signals);

        drop(signals.block());

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn blocker_restores_on_early_return() {
        fn fails(signals: &Rc<Signals>) -> Result<(), ()> {
            let _blocker = signals.block();
            signals.emit(ArchiveEvent::Refreshed);
            Err(())?;
            Ok(())
        }

        let signals = Rc::new(Signals::default());
        let seen = recorder(&signals);

        assert!(fails(&signals).is_err());

        assert!(!signals.is_blocked());
        assert_eq!(*seen.borrow(), vec!["refreshed"]);
    }
}
